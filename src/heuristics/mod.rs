// src/heuristics/mod.rs

mod hauler;

use serde::Deserialize;
use serde::Serialize;

/// Billing period reported when the text carries no `YYYY-MM` token.
pub const DEFAULT_PERIOD: &str = "2025-09";

/// Vendor reported when no `Invoice` / `Vendor` label is found.
pub const DEFAULT_VENDOR: &str = "Unknown Hauler";

/// Billed waste category on a hauler invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Recycling,
    Compost,
    Landfill,
}

impl LineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineType::Recycling => "recycling",
            LineType::Compost => "compost",
            LineType::Landfill => "landfill",
        }
    }
}

/// One billed category on a hauler invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_type: LineType,
    pub weight_kg: f64,
    pub cost_usd: f64,
}

/// Everything the heuristic pulls out of one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    pub period: String,
    pub vendor: String,
    pub lines: Vec<InvoiceLine>,
}

impl ParsedInvoice {
    pub fn total_weight_kg(&self) -> f64 {
        self.lines.iter().map(|l| l.weight_kg).sum()
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.lines.iter().map(|l| l.cost_usd).sum()
    }
}

/// Extract period, vendor and per-category lines from OCR text.
///
/// Never fails: anything that does not match falls back to
/// [`DEFAULT_PERIOD`], [`DEFAULT_VENDOR`] or a zero amount. A category
/// whose weight comes out as zero is dropped even when a cost was found.
/// Weight and cost are matched independently, so a stray number on the
/// category line can land in either field; treat the output as a best
/// guess, not a reconciliation.
pub fn parse_invoice_text(text: &str) -> ParsedInvoice {
    hauler::extract(text)
}
