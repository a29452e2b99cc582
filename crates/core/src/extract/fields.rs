//! Field extractors over raw document text.
//!
//! Each extractor is an independent best-effort pure function so heuristics
//! can be tuned without touching the surrounding workflow. A field that fails
//! to parse is dropped, never defaulted, to avoid fabricating financial data.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::{ExtractedDocumentData, ExtractedLineItem};

pub fn extract(text: &str) -> ExtractedDocumentData {
    let items = extract_line_items(text);
    let total = extract_total(text);
    let vendor = extract_vendor(text);
    let currency = extract_currency(text);
    let invoice_number = extract_invoice_number(text);
    // Nothing financially usable came out: flag the result as degraded so the
    // caller can fall back to manually entered data.
    let degraded = items.is_empty() && total.is_none();

    ExtractedDocumentData { vendor, items, total, currency, invoice_number, degraded }
}

fn labelled_vendor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(?:from|vendor|supplier|sold\s+by)\s*[:\-]\s*(\S[^\r\n]*)$")
            .expect("labelled vendor pattern")
    })
}

fn company_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:ltd|llc|inc|corp|company|gmbh|plc|pte|s\.a\.)\b\.?")
            .expect("company suffix pattern")
    })
}

/// First plausible company-name-shaped line near the top of the document.
pub fn extract_vendor(text: &str) -> Option<String> {
    if let Some(captures) = labelled_vendor_re().captures(text) {
        return Some(captures[1].trim().to_string());
    }

    let top_lines = text.lines().map(str::trim).filter(|line| !line.is_empty()).take(12);
    let mut first_plausible = None;
    for line in top_lines {
        if is_document_keyword_line(line) || line.len() < 3 || line.len() > 80 {
            continue;
        }
        if company_suffix_re().is_match(line) {
            return Some(line.to_string());
        }
        let alpha = line.chars().filter(|c| c.is_alphabetic()).count();
        if first_plausible.is_none()
            && line.chars().next().is_some_and(|c| c.is_uppercase())
            && alpha * 2 > line.len()
        {
            first_plausible = Some(line.to_string());
        }
    }
    first_plausible
}

fn is_document_keyword_line(line: &str) -> bool {
    let upper = line.to_uppercase();
    ["INVOICE", "PROFORMA", "RECEIPT", "QUOTATION", "TOTAL", "DATE", "BILL TO", "SHIP TO"]
        .iter()
        .any(|keyword| upper.starts_with(keyword))
}

fn line_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // quantity, description, unit price; tolerates an "x" after the
        // quantity and currency symbols on the price
        Regex::new(r"(?m)^\s*(\d{1,5})\s*(?:x|X)?\s+(.{3,80}?)\s+((?:[$€£]\s*)?\d[\d.,]*)\s*$")
            .expect("line item pattern")
    })
}

/// Rows matching a quantity-description-unit-price shape.
pub fn extract_line_items(text: &str) -> Vec<ExtractedLineItem> {
    let mut items = Vec::new();
    for captures in line_item_re().captures_iter(text) {
        let Ok(quantity) = captures[1].parse::<u32>() else { continue };
        if quantity == 0 {
            continue;
        }
        let description = captures[2].trim().trim_end_matches('@').trim().to_string();
        if !description.chars().any(|c| c.is_alphabetic()) {
            continue;
        }
        let Some(unit_price) = parse_money(&captures[3]) else { continue };
        items.push(ExtractedLineItem { description, quantity, unit_price });
    }
    items
}

fn keyword_total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)\b(?:grand\s+total|total\s+due|amount\s+due|total)\b[^0-9$€£\r\n]*((?:[$€£]\s*)?\d[\d.,]*)",
        )
        .expect("total pattern")
    })
}

/// Largest currency-shaped amount anchored to a total/amount-due keyword.
///
/// Deliberately keyword-anchored only: picking the largest number anywhere in
/// the document invents totals out of unit prices. Callers that need a total
/// when none is printed sum line items instead.
pub fn extract_total(text: &str) -> Option<Decimal> {
    keyword_total_re().captures_iter(text).filter_map(|captures| parse_money(&captures[1])).max()
}

fn invoice_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)\b(?:invoice|inv)\s*(?:no|number|num|#)?\s*[:#]\s*([A-Z0-9][A-Z0-9/-]{1,30})")
            .expect("invoice number pattern")
    })
}

/// Labelled invoice reference, e.g. `Invoice No: INV-2024-0042`. Only
/// explicit labels count; a bare token is never promoted to a reference.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    invoice_number_re().captures(text).map(|captures| captures[1].to_uppercase())
}

const ISO_CURRENCIES: &[&str] =
    &["USD", "EUR", "GBP", "RWF", "KES", "UGX", "JPY", "CHF", "NGN", "ZAR"];

pub fn extract_currency(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    for code in ISO_CURRENCIES {
        let found = upper
            .match_indices(code)
            .any(|(index, _)| is_word_boundary(&upper, index, code.len()));
        if found {
            return Some((*code).to_string());
        }
    }

    if text.contains('$') {
        Some("USD".to_string())
    } else if text.contains('€') {
        Some("EUR".to_string())
    } else if text.contains('£') {
        Some("GBP".to_string())
    } else {
        None
    }
}

fn is_word_boundary(text: &str, index: usize, len: usize) -> bool {
    let before = text[..index].chars().next_back();
    let after = text[index + len..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}

/// Parse a currency-shaped token into a non-negative fixed-point value.
///
/// Normalizes both `1,234.56` and `1.234,56` separator conventions. Returns
/// `None` for anything that does not parse cleanly; callers drop the field
/// rather than defaulting it to zero.
pub fn parse_money(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£'))
        .collect();
    let cleaned = cleaned
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if cleaned.is_empty() || cleaned.contains('-') {
        return None;
    }

    let normalized = normalize_separators(cleaned);
    let value = Decimal::from_str(&normalized).ok()?;
    (value >= Decimal::ZERO).then_some(value)
}

fn normalize_separators(token: &str) -> String {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // The rightmost separator is the decimal point; the other kind
            // groups thousands.
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            token.replace(thousands, "").replace(decimal, ".")
        }
        (None, Some(_)) => normalize_single_separator(token, ','),
        (Some(_), None) => normalize_single_separator(token, '.'),
        (None, None) => token.to_string(),
    }
}

fn normalize_single_separator(token: &str, separator: char) -> String {
    let groups: Vec<&str> = token.split(separator).collect();
    // A single trailing group of anything but 3 digits reads as a decimal
    // part; repeated 3-digit groups read as thousands grouping.
    let is_thousands = groups.len() > 2 || groups.last().is_some_and(|group| group.len() == 3);
    if is_thousands {
        token.replace(separator, "")
    } else {
        token.replace(separator, ".")
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        extract, extract_currency, extract_invoice_number, extract_line_items, extract_total,
        extract_vendor, parse_money,
    };

    const SAMPLE_PROFORMA: &str = "\
Acme Supplies Ltd
123 Industrial Road

PROFORMA INVOICE

2 Laptop $500.00
5 Mouse $20.00

TOTAL: $1,100.00 USD
";

    #[test]
    fn parses_plain_and_grouped_amounts() {
        assert_eq!(parse_money("1,234.56"), Some(Decimal::new(123_456, 2)));
        assert_eq!(parse_money("1.234,56"), Some(Decimal::new(123_456, 2)));
        assert_eq!(parse_money("$ 1,100.00"), Some(Decimal::new(110_000, 2)));
        assert_eq!(parse_money("12,5"), Some(Decimal::new(125, 1)));
        assert_eq!(parse_money("1,234"), Some(Decimal::from(1_234)));
        assert_eq!(parse_money("1.234.567"), Some(Decimal::from(1_234_567)));
    }

    #[test]
    fn rejects_negative_and_garbage_amounts() {
        assert_eq!(parse_money("-5.00"), None);
        assert_eq!(parse_money("n/a"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn extracts_vendor_from_top_of_document() {
        assert_eq!(extract_vendor(SAMPLE_PROFORMA), Some("Acme Supplies Ltd".to_string()));
    }

    #[test]
    fn extracts_labelled_vendor_over_shape_heuristic() {
        let text = "PROFORMA\nVendor: Globex Corporation\nSome Line Ltd\n";
        assert_eq!(extract_vendor(text), Some("Globex Corporation".to_string()));
    }

    #[test]
    fn extracts_line_items_with_currency_symbols() {
        let items = extract_line_items(SAMPLE_PROFORMA);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Laptop");
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].unit_price, Decimal::new(50_000, 2));
        assert_eq!(items[1].description, "Mouse");
        assert_eq!(items[1].quantity, 5);
    }

    #[test]
    fn total_prefers_keyword_anchored_amount() {
        assert_eq!(extract_total(SAMPLE_PROFORMA), Some(Decimal::new(110_000, 2)));
    }

    #[test]
    fn total_requires_a_keyword_anchor() {
        let text = "2 Widget 40.00\n3 Gadget 80.00\n";
        assert_eq!(extract_total(text), None);

        let text = "amount due 80.00\ngrand total: 120.00\n";
        assert_eq!(extract_total(text), Some(Decimal::new(12_000, 2)));
    }

    #[test]
    fn extracts_labelled_invoice_numbers() {
        assert_eq!(
            extract_invoice_number("Invoice No: INV-2024-0042\nTOTAL: 10.00"),
            Some("INV-2024-0042".to_string())
        );
        assert_eq!(extract_invoice_number("inv #7731-a\n"), Some("7731-A".to_string()));
        assert_eq!(
            extract_invoice_number("Invoice Number: RW/2025/118"),
            Some("RW/2025/118".to_string())
        );
    }

    #[test]
    fn invoice_number_requires_an_explicit_label() {
        assert_eq!(extract_invoice_number(SAMPLE_PROFORMA), None);
        assert_eq!(extract_invoice_number("reference 12345"), None);
    }

    #[test]
    fn currency_detection_handles_codes_and_symbols() {
        assert_eq!(extract_currency(SAMPLE_PROFORMA), Some("USD".to_string()));
        assert_eq!(extract_currency("Betrag: 12,50 €"), Some("EUR".to_string()));
        assert_eq!(extract_currency("amount 12.50"), None);
    }

    #[test]
    fn full_extraction_is_not_degraded_for_structured_text() {
        let data = extract(SAMPLE_PROFORMA);
        assert!(!data.degraded);
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.total, Some(Decimal::new(110_000, 2)));
        assert_eq!(data.currency, Some("USD".to_string()));
    }

    #[test]
    fn unstructured_text_degrades_without_fabricating_values() {
        let data = extract("lorem ipsum dolor sit amet");
        assert!(data.degraded);
        assert!(data.items.is_empty());
        assert_eq!(data.total, None);
    }
}
