//! Extraction prompts sent alongside the document.
//!
//! Every prompt asks for a top-level JSON object keyed by the statement
//! title (see [`StatementKind::title`]) whose value is a list of row
//! objects: a `"Metric"` label plus one key per fiscal year, newest first.
//! The numbers are requested fully scaled, and a sibling `"unit"` string
//! carries the unit of measure. The parser and workbook builder rely on that
//! shape.

use crate::statement::StatementKind;

const INCOME_STATEMENT_PROMPT: &str = r#"You are a professional financial analyst.

Please extract the full Income Statement from the document.

Instructions:
1. Detect the unit of measurement (e.g. "USD", "USD in thousands", "USD in millions") and return it in a top-level string field called "unit". It is informational only.
2. Whatever the unit, return fully scaled numeric values (e.g. 249625000).
3. If the report says something like "(amounts in millions, except per share data)", append "(not in millions)" to the per-share metric names.
4. Return the Income Statement as a list of objects, one row per metric, under the key "Income Statement".
5. Use one key per fiscal year, years in descending order (e.g. "2024", "2023", "2022").
6. Show hierarchy by indenting sub-items with two spaces in "Metric" (e.g. "Revenue", then "  Net sales" and "  Membership fees", then "Total revenue").
7. Insert line items that are not in the example at their logical position.
8. Output strictly valid JSON. No markdown, no explanation.

Example format:
{
  "unit": "USD in millions",
  "Income Statement": [
    { "Metric": "Revenue", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Cost of Goods Sold (COGS)", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Gross Profit", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Operating Expenses", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Selling, General & Admin (SG&A)", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Research & Development (R&D)", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Operating Income", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Interest Income", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Interest Expense", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Other Income (Expense), net", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Income Before Tax", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Income Tax Expense", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Net Income", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Income Attributable to Non-Controlling Interest", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Income Attributable to Parent", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Earnings Per Share (EPS) - Basic", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Earnings Per Share (EPS) - Diluted", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Weighted Average Shares Outstanding - Basic", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Weighted Average Shares Outstanding - Diluted", "2024": "", "2023": "", "2022": "" }
  ]
}

Return only valid JSON."#;

const BALANCE_SHEET_PROMPT: &str = r#"You are a professional financial analyst.

Please extract the full Balance Sheet from the document.

Instructions:
1. Detect the unit of measurement (e.g. "USD", "USD in thousands", "USD in millions") and return it in a top-level string field called "unit". It is informational only.
2. Whatever the unit, return fully scaled numeric values (e.g. 249625000).
3. Present the Balance Sheet as a hierarchy: Assets, Liabilities and Equity contain sub-groups such as Current Assets and Non-Current Assets, shown by indenting "Metric" with two spaces per level.
4. Return the Balance Sheet as a list of objects, one row per line item, under the key "Balance Sheet".
5. Use one key per fiscal year, years in descending order (e.g. "2024", "2023", "2022").
6. Insert line items that are not in the example at their logical position.
7. Output strictly valid JSON. No markdown, no explanation.

Example format:
{
  "unit": "USD in millions",
  "Balance Sheet": [
    { "Metric": "Assets", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Current Assets", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Cash and Cash Equivalents", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Accounts Receivable", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Inventories", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Non-Current Assets", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Property, Plant & Equipment", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Liabilities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Current Liabilities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Accounts Payable", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Short-Term Debt", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Non-Current Liabilities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "    Long-Term Debt", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Equity", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Common Stock", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Retained Earnings", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Treasury Stock", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Total Equity", "2024": "", "2023": "", "2022": "" }
  ]
}

Return only valid JSON."#;

const CASH_FLOW_PROMPT: &str = r#"You are a professional financial analyst.

Please extract the full Cash Flow Statement from the document.

Instructions:
1. Detect the unit of measurement (e.g. "USD", "USD in thousands", "USD in millions") and return it in a top-level string field called "unit". It is informational only.
2. Whatever the unit, return fully scaled numeric values (e.g. 249625000). Outflows are negative numbers.
3. Group line items under Operating, Investing and Financing Activities, indenting sub-items in "Metric" with two spaces per level.
4. Return the Cash Flow Statement as a list of objects, one row per line item, under the key "Cash Flow Statement".
5. Use one key per fiscal year, years in descending order (e.g. "2024", "2023", "2022").
6. Insert line items that are not in the example at their logical position.
7. Output strictly valid JSON. No markdown, no explanation.

Example format:
{
  "unit": "USD in millions",
  "Cash Flow Statement": [
    { "Metric": "Operating Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Income", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Depreciation and Amortization", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Changes in Working Capital", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Cash from Operating Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Investing Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Capital Expenditures", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Acquisitions, net of cash acquired", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Cash used in Investing Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Financing Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Repayments of Debt", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Dividends Paid", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Repurchases of Common Stock", "2024": "", "2023": "", "2022": "" },
    { "Metric": "  Net Cash used in Financing Activities", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Net Change in Cash", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Cash at Beginning of Period", "2024": "", "2023": "", "2022": "" },
    { "Metric": "Cash at End of Period", "2024": "", "2023": "", "2022": "" }
  ]
}

Return only valid JSON."#;

/// Prompt for one rendered page in page-image mode.
pub const PAGE_PROMPT: &str = r#"You are a professional financial analyst reading one page of a financial report.

Extract every financial statement that appears on this page: "Income Statement", "Balance Sheet" or "Cash Flow Statement".

Instructions:
1. Return ONE JSON object on a single line. Use the statement title as the key and a list of row objects as the value.
2. Each row is { "Metric": "<line item>", "<year>": <value>, ... } with years in descending order.
3. Return fully scaled numeric values and the unit of measurement in a top-level string field called "unit".
4. If the page contains no financial statement, return {}.
5. Output strictly valid JSON. No markdown, no explanation."#;

/// The extraction prompt for `kind`.
pub fn statement_prompt(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::IncomeStatement => INCOME_STATEMENT_PROMPT,
        StatementKind::BalanceSheet => BALANCE_SHEET_PROMPT,
        StatementKind::CashFlow => CASH_FLOW_PROMPT,
    }
}
