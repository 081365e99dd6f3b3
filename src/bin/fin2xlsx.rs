//! CLI binary for fin2xlsx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use fin2xlsx::{
    CacheIdentity, ConversionOutput, ConversionProgressCallback, ConvertOptions, Converter,
    ExtractionMode, PipelineConfig, PipelineState, ProgressCallback, DEFAULT_MODEL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner whose message follows the pipeline state.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source_name: &str) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {source_name}"))
        ));
    }

    fn on_state(&self, state: &PipelineState) {
        match state {
            PipelineState::Extracting { statement } => {
                self.bar.println(format!("  {} {}", dim("→"), statement));
            }
            PipelineState::ExtractingPage { page, total } => {
                self.bar
                    .println(format!("  {} page {:>3}/{:<3}", dim("→"), page, total));
            }
            PipelineState::Failed { reason } => {
                self.bar.println(format!("  {} {}", red("✗"), red(reason)));
            }
            _ => {}
        }
        self.bar.set_message(state.to_string());
    }

    fn on_conversion_complete(&self, success: bool, cache_hit: bool) {
        self.bar.finish_and_clear();
        if !success {
            eprintln!("{} conversion failed", red("✘"));
        } else if cache_hit {
            eprintln!("{} reused cached workbook", green("✔"));
        } else {
            eprintln!("{} workbook written", green("✔"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a report (writes output/annual_report.xlsx)
  fin2xlsx annual_report.pdf

  # Reprocess even if the cached workbook matches
  fin2xlsx --force annual_report.pdf

  # One call per rendered page instead of one upload
  fin2xlsx --mode pages scanned_report.pdf

  # JSON summary for scripting
  fin2xlsx --json annual_report.pdf > result.json

  # Browser upload page (requires the `server` feature)
  fin2xlsx --serve 127.0.0.1:8080

CACHE:
  A workbook is reused when output/<name>.xlsx and its .size marker exist
  and the marker matches the source size (plus a SHA-256 digest with
  --content-hash). Every processed run is appended to the log file.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (required)
  FIN2XLSX_MODEL          Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium for --mode pages
  RUST_LOG                Override the log filter
"#;

/// Convert financial-report PDFs and images to Excel workbooks.
#[derive(Parser, Debug)]
#[command(
    name = "fin2xlsx",
    version,
    about = "Convert financial-report PDFs and images to Excel workbooks using Gemini",
    long_about = "Extract the income statement, balance sheet and cash flow statement from a \
financial report (PDF, PNG, JPEG or WebP) with Google Gemini and write them as one Excel \
worksheet per statement.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to convert (PDF, PNG, JPEG or WebP).
    input: Option<PathBuf>,

    /// Reprocess even when a cached workbook matches.
    #[arg(long, env = "FIN2XLSX_FORCE")]
    force: bool,

    /// Extraction mode.
    #[arg(long, env = "FIN2XLSX_MODE", value_enum, default_value = "document")]
    mode: ModeArg,

    /// Gemini model ID.
    #[arg(long, env = "FIN2XLSX_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Directory uploads are stored in.
    #[arg(long, env = "FIN2XLSX_UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Directory workbooks and cache markers are written to.
    #[arg(long, env = "FIN2XLSX_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Operation log file.
    #[arg(long, env = "FIN2XLSX_LOG_FILE", default_value = "convert_pdf_log.txt")]
    log_file: PathBuf,

    /// Delay between remote-processing status checks.
    #[arg(long, env = "FIN2XLSX_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Status checks before giving up on remote processing.
    #[arg(long, env = "FIN2XLSX_MAX_POLL_ATTEMPTS", default_value_t = 60,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_poll_attempts: u32,

    /// Per-request LLM timeout in seconds.
    #[arg(long, env = "FIN2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Identify cached sources by SHA-256 digest as well as size.
    #[arg(long, env = "FIN2XLSX_CONTENT_HASH")]
    content_hash: bool,

    /// Print the ConversionOutput as JSON.
    #[arg(long, env = "FIN2XLSX_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "FIN2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FIN2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FIN2XLSX_QUIET")]
    quiet: bool,

    /// Serve the upload page on this address instead of converting a file.
    #[cfg(feature = "server")]
    #[arg(long, env = "FIN2XLSX_SERVE", value_name = "ADDR")]
    serve: Option<std::net::SocketAddr>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModeArg {
    /// Upload the whole document, one call per statement.
    Document,
    /// Render pages and send each as an image.
    Pages,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Document => ExtractionMode::WholeDocument,
            ModeArg::Pages => ExtractionMode::PageImages,
        }
    }
}

impl Cli {
    #[cfg(feature = "server")]
    fn serving(&self) -> bool {
        self.serve.is_some()
    }

    #[cfg(not(feature = "server"))]
    fn serving(&self) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO output while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.serving();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::from_env(config).context("Cannot start")?;

    #[cfg(feature = "server")]
    if let Some(addr) = cli.serve {
        return fin2xlsx::server::serve(addr, Arc::new(converter))
            .await
            .with_context(|| format!("Failed to serve on {addr}"));
    }

    let input = cli
        .input
        .clone()
        .context("An input document is required")?;
    let options = ConvertOptions {
        force: cli.force,
        cancel: None,
    };
    let output = converter
        .convert(&input, &options)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .uploads_dir(&cli.uploads_dir)
        .output_dir(&cli.output_dir)
        .log_path(&cli.log_file)
        .model(cli.model.clone())
        .mode(cli.mode.clone().into())
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts(cli.max_poll_attempts)
        .api_timeout_secs(cli.api_timeout)
        .cache_identity(if cli.content_hash {
            CacheIdentity::ContentHash
        } else {
            CacheIdentity::ByteSize
        });

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput) {
    let path = output.output_path.display().to_string();
    if output.cache_hit {
        println!("{}  {}  {}", green("✔"), bold(&path), dim("(cached)"));
        return;
    }

    let ok = output.sheet_errors.is_empty();
    println!(
        "{}  {} sheets  {} records  {}ms  →  {}",
        if ok { green("✔") } else { cyan("⚠") },
        output.sheets.len(),
        output.stats.total_records,
        output.stats.total_duration_ms,
        bold(&path),
    );
    for sheet in &output.sheets {
        println!("   {} {}", dim("·"), sheet);
    }
    for err in &output.sheet_errors {
        println!("   {} {}", red("✗"), err);
    }
    for warning in &output.warnings {
        println!("   {} {}", cyan("⚠"), warning);
    }
    for missing in &output.schema_report.missing_statements {
        println!("   {} no {} found", cyan("⚠"), missing);
    }
    println!(
        "   {} LLM calls  /  {} bytes in  /  {} bytes out",
        dim(&output.stats.llm_calls.to_string()),
        dim(&output.stats.source_size.to_string()),
        dim(&output.stats.output_size.to_string()),
    );
}
