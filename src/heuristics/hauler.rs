use super::{DEFAULT_PERIOD, DEFAULT_VENDOR, InvoiceLine, LineType, ParsedInvoice};
use regex::Regex;

/// Billed categories and the keyword that anchors each one, in output order.
const CATEGORIES: [(LineType, &str); 3] = [
    (LineType::Recycling, r"recycl\w*"),
    (LineType::Compost, r"compost\w*"),
    (LineType::Landfill, r"landfill\w*"),
];

const PERIOD_PATTERN: &str = r"(20\d{2}[-/.]\d{1,2})";

/// Keyword-anchored regex extraction over the whole text.
pub fn extract(text: &str) -> ParsedInvoice {
    // Output order is fixed regardless of where each category appears.
    let lines = CATEGORIES
        .iter()
        .filter_map(|&(line_type, keyword)| {
            // Zero weight drops the line, cost or not.
            let weight_kg = extract_weight(text, keyword).filter(|w| *w != 0.0)?;
            Some(InvoiceLine {
                line_type,
                weight_kg,
                cost_usd: extract_cost(text, keyword).unwrap_or(0.0),
            })
        })
        .collect();

    ParsedInvoice {
        period: extract_period(text).unwrap_or_else(|| DEFAULT_PERIOD.to_string()),
        vendor: extract_vendor(text).unwrap_or_else(|| DEFAULT_VENDOR.to_string()),
        lines,
    }
}

// ---------------------------------------------------------------------------
// Scalar field extractors
// ---------------------------------------------------------------------------

fn extract_period(text: &str) -> Option<String> {
    let re = Regex::new(PERIOD_PATTERN).ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

fn extract_vendor(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)(?:Invoice|Vendor)[:\s]+([A-Za-z ]+)").ok()?;
    let cap = re.captures(text)?;
    let vendor = cap[1].trim();
    (!vendor.is_empty()).then(|| vendor.to_string())
}

// ---------------------------------------------------------------------------
// Category lines
// ---------------------------------------------------------------------------

/// Keyword, then lazily the first `<n> kg|ton|tons` on the same line.
/// Tons are not converted.
fn extract_weight(text: &str, keyword: &str) -> Option<f64> {
    let re = Regex::new(&format!(r"(?i){keyword}.*?(\d+(?:\.\d+)?)\s?(?:kg|tons?)")).ok()?;
    re.captures(text)?[1].parse().ok()
}

/// Prefer the first `$` amount after the keyword; otherwise the first number
/// on the keyword's line that is neither a weight nor a billing period.
fn extract_cost(text: &str, keyword: &str) -> Option<f64> {
    let dollar = Regex::new(&format!(r"(?i){keyword}.*?\$\s?(\d+(?:\.\d+)?)")).ok()?;
    if let Some(v) = dollar.captures(text).and_then(|c| c[1].parse().ok()) {
        return Some(v);
    }

    let tail_re = Regex::new(&format!(r"(?i){keyword}(.*)")).ok()?;
    let period = Regex::new(PERIOD_PATTERN).ok()?;
    // number, optionally followed by a weight unit
    let number = Regex::new(r"(?i)(\d+(?:\.\d+)?)(\s?(?:kg|tons?))?").ok()?;

    tail_re.captures_iter(text).find_map(|tail| {
        let tail = period.replace_all(tail.get(1)?.as_str(), " ");
        number
            .captures_iter(&tail)
            .filter(|c| c.get(2).is_none())
            .find_map(|c| c[1].parse().ok())
    })
}
