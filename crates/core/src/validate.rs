use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::purchase_order::PurchaseOrder;
use crate::domain::report::{LineMatch, ReportLine, ValidationReport, Verdict};
use crate::extract::ExtractedDocumentData;

/// Tolerance for amount comparison: the larger of a relative share of the
/// expected amount and a fixed minor-unit epsilon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub relative_pct: Decimal,
    pub minor_unit_epsilon: Decimal,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { relative_pct: Decimal::ONE, minor_unit_epsilon: Decimal::new(1, 2) }
    }
}

impl Tolerance {
    pub fn from_units(tolerance_bps: u32, epsilon_minor_units: u32) -> Self {
        Self {
            relative_pct: Decimal::from(tolerance_bps) / Decimal::from(100),
            minor_unit_epsilon: Decimal::new(i64::from(epsilon_minor_units), 2),
        }
    }

    fn allowance(&self, expected: Decimal) -> Decimal {
        let relative = expected.abs() * self.relative_pct / Decimal::from(100);
        relative.max(self.minor_unit_epsilon)
    }

    fn within(&self, expected: Decimal, observed: Decimal) -> bool {
        (observed - expected).abs() <= self.allowance(expected)
    }
}

/// Compares an extracted receipt against a purchase order.
///
/// Diagnostic only: the report surfaces discrepancies, it never drives
/// request status.
pub fn validate_receipt(
    receipt: &ExtractedDocumentData,
    po: &PurchaseOrder,
    tolerance: &Tolerance,
) -> ValidationReport {
    let mut lines = Vec::with_capacity(po.lines.len() + receipt.items.len());
    let mut receipt_used = vec![false; receipt.items.len()];

    for po_line in &po.lines {
        let expected = po_line.line_total();
        let key = normalize_description(&po_line.description);
        let matched_index = receipt
            .items
            .iter()
            .enumerate()
            .find(|(index, item)| {
                !receipt_used[*index] && normalize_description(&item.description) == key
            })
            .map(|(index, _)| index);

        match matched_index {
            Some(index) => {
                receipt_used[index] = true;
                let observed = receipt.items[index].line_total();
                let status = if tolerance.within(expected, observed) {
                    LineMatch::Matched
                } else {
                    LineMatch::AmountMismatch
                };
                lines.push(ReportLine {
                    description: po_line.description.clone(),
                    status,
                    expected_total: Some(expected),
                    observed_total: Some(observed),
                });
            }
            None => {
                lines.push(ReportLine {
                    description: po_line.description.clone(),
                    status: LineMatch::MissingInReceipt,
                    expected_total: Some(expected),
                    observed_total: None,
                });
            }
        }
    }

    for (index, item) in receipt.items.iter().enumerate() {
        if !receipt_used[index] {
            lines.push(ReportLine {
                description: item.description.clone(),
                status: LineMatch::ExtraInReceipt,
                expected_total: None,
                observed_total: Some(item.line_total()),
            });
        }
    }

    let receipt_total = receipt.total.unwrap_or_else(|| receipt.items_total());
    let total_delta = receipt_total - po.total;

    let any_unmatched = lines.iter().any(|line| line.status != LineMatch::Matched);
    let verdict = if any_unmatched || !tolerance.within(po.total, receipt_total) {
        Verdict::Discrepant
    } else {
        Verdict::Clean
    };

    ValidationReport { lines, total_delta, verdict, validated_at: Utc::now() }
}

/// Case-insensitive, whitespace-collapsed matching key.
fn normalize_description(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{validate_receipt, Tolerance};
    use crate::domain::purchase_order::{PurchaseOrder, PurchaseOrderLine};
    use crate::domain::report::{LineMatch, Verdict};
    use crate::extract::{ExtractedDocumentData, ExtractedLineItem};

    fn po() -> PurchaseOrder {
        PurchaseOrder {
            po_number: "PO-AB12CD34EF56".to_string(),
            vendor: Some("Acme Supplies Ltd".to_string()),
            lines: vec![
                PurchaseOrderLine {
                    description: "Laptop".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(50_000, 2),
                },
                PurchaseOrderLine {
                    description: "Mouse".to_string(),
                    quantity: 5,
                    unit_price: Decimal::new(2_000, 2),
                },
            ],
            total: Decimal::new(110_000, 2),
            currency: Some("USD".to_string()),
            terms: String::new(),
            generated_at: Utc::now(),
        }
    }

    fn receipt(items: Vec<ExtractedLineItem>, total: Option<Decimal>) -> ExtractedDocumentData {
        ExtractedDocumentData {
            vendor: Some("Acme Supplies Ltd".to_string()),
            items,
            total,
            currency: Some("USD".to_string()),
            invoice_number: None,
            degraded: false,
        }
    }

    fn item(description: &str, quantity: u32, unit_price: Decimal) -> ExtractedLineItem {
        ExtractedLineItem { description: description.to_string(), quantity, unit_price }
    }

    #[test]
    fn identical_receipt_is_clean() {
        let receipt = receipt(
            vec![
                item("Laptop", 2, Decimal::new(50_000, 2)),
                item("Mouse", 5, Decimal::new(2_000, 2)),
            ],
            Some(Decimal::new(110_000, 2)),
        );

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.lines.iter().all(|line| line.status == LineMatch::Matched));
        assert_eq!(report.total_delta, Decimal::ZERO);
    }

    #[test]
    fn matching_ignores_case_and_whitespace() {
        let receipt = receipt(
            vec![
                item("  LAPTOP ", 2, Decimal::new(50_000, 2)),
                item("mouse", 5, Decimal::new(2_000, 2)),
            ],
            None,
        );

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        assert_eq!(report.verdict, Verdict::Clean);
    }

    #[test]
    fn missing_line_is_flagged_with_signed_delta() {
        let receipt = receipt(vec![item("Laptop", 2, Decimal::new(50_000, 2))], None);

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        assert_eq!(report.verdict, Verdict::Discrepant);
        assert_eq!(report.total_delta, Decimal::new(-10_000, 2));

        let missing: Vec<_> = report
            .lines
            .iter()
            .filter(|line| line.status == LineMatch::MissingInReceipt)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].description, "Mouse");
    }

    #[test]
    fn amount_outside_tolerance_is_a_mismatch() {
        let receipt = receipt(
            vec![
                item("Laptop", 2, Decimal::new(53_000, 2)),
                item("Mouse", 5, Decimal::new(2_000, 2)),
            ],
            None,
        );

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        let laptop = report.lines.iter().find(|line| line.description == "Laptop").expect("line");
        assert_eq!(laptop.status, LineMatch::AmountMismatch);
        assert_eq!(report.verdict, Verdict::Discrepant);
    }

    #[test]
    fn small_rounding_noise_stays_within_tolerance() {
        // 1% of the laptop line is 10.00; a 4.00 drift is acceptable.
        let receipt = receipt(
            vec![
                item("Laptop", 2, Decimal::new(50_200, 2)),
                item("Mouse", 5, Decimal::new(2_000, 2)),
            ],
            Some(Decimal::new(110_400, 2)),
        );

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        assert_eq!(report.verdict, Verdict::Clean);
    }

    #[test]
    fn extra_receipt_line_is_flagged() {
        let receipt = receipt(
            vec![
                item("Laptop", 2, Decimal::new(50_000, 2)),
                item("Mouse", 5, Decimal::new(2_000, 2)),
                item("Cable", 3, Decimal::new(500, 2)),
            ],
            None,
        );

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        let extra: Vec<_> =
            report.lines.iter().filter(|line| line.status == LineMatch::ExtraInReceipt).collect();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].description, "Cable");
        assert_eq!(report.verdict, Verdict::Discrepant);
    }

    #[test]
    fn empty_receipt_marks_everything_missing() {
        let receipt = receipt(Vec::new(), None);

        let report = validate_receipt(&receipt, &po(), &Tolerance::default());
        assert_eq!(report.verdict, Verdict::Discrepant);
        assert!(report.lines.iter().all(|line| line.status == LineMatch::MissingInReceipt));
        assert_eq!(report.total_delta, Decimal::new(-110_000, 2));
    }
}
