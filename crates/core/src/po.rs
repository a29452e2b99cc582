use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::purchase_order::{PurchaseOrder, PurchaseOrderLine};
use crate::domain::request::PurchaseRequest;
use crate::errors::DomainError;

const DEFAULT_TERMS: &str = "Payment terms: net 30 days. Delivery: standard shipping. \
Returns: 30-day return policy. Warranty: per manufacturer specifications.";

/// Derives a purchase order from an approved request.
///
/// Pure function of the request's item list, vendor, and extracted total.
/// Sequencing preconditions (status, no existing payload) are the lifecycle
/// manager's job; this only refuses when there is nothing to derive a total
/// from.
pub fn generate_purchase_order(
    request: &PurchaseRequest,
    approved_at: DateTime<Utc>,
) -> Result<PurchaseOrder, DomainError> {
    if request.items.is_empty() && request.extracted_total.is_none() {
        return Err(DomainError::InsufficientData);
    }

    let lines: Vec<PurchaseOrderLine> = request
        .items
        .iter()
        .map(|item| PurchaseOrderLine {
            description: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();

    let total = request.extracted_total.unwrap_or_else(|| request.items_total());

    Ok(PurchaseOrder {
        po_number: po_number(&request.id.0, approved_at),
        vendor: request.vendor.clone(),
        lines,
        total,
        currency: request.currency.clone(),
        terms: DEFAULT_TERMS.to_string(),
        generated_at: Utc::now(),
    })
}

/// Deterministic PO number: hashing the request identity and the final
/// approval timestamp makes retries yield the same number instead of
/// minting duplicates.
pub fn po_number(request_id: &str, approved_at: DateTime<Utc>) -> String {
    let digest = Sha256::digest(format!("{request_id}|{}", approved_at.to_rfc3339()).as_bytes());
    let mut suffix = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        suffix.push_str(&format!("{byte:02X}"));
    }
    format!("PO-{suffix}")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{generate_purchase_order, po_number};
    use crate::domain::request::{PurchaseRequest, RequestId, RequestItem, RequestStatus};
    use crate::errors::DomainError;

    fn approved_request() -> PurchaseRequest {
        PurchaseRequest {
            id: RequestId("PR-77".to_string()),
            title: "Peripherals".to_string(),
            description: String::new(),
            amount: Decimal::new(110_000, 2),
            status: RequestStatus::Approved,
            created_by: "u-staff".to_string(),
            items: vec![
                RequestItem {
                    name: "Laptop".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(50_000, 2),
                },
                RequestItem {
                    name: "Mouse".to_string(),
                    quantity: 5,
                    unit_price: Decimal::new(2_000, 2),
                },
            ],
            vendor: Some("Acme Supplies Ltd".to_string()),
            currency: Some("USD".to_string()),
            extracted_total: None,
            degraded_extraction: false,
            purchase_order: None,
            validation_report: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn total_falls_back_to_summing_line_totals() {
        let po = generate_purchase_order(&approved_request(), Utc::now()).expect("generate");
        assert_eq!(po.total, Decimal::new(110_000, 2));
        assert_eq!(po.lines.len(), 2);
        assert_eq!(po.vendor.as_deref(), Some("Acme Supplies Ltd"));
    }

    #[test]
    fn extracted_total_wins_over_line_sum() {
        let mut request = approved_request();
        request.extracted_total = Some(Decimal::new(120_000, 2));

        let po = generate_purchase_order(&request, Utc::now()).expect("generate");
        assert_eq!(po.total, Decimal::new(120_000, 2));
    }

    #[test]
    fn refuses_when_no_items_and_no_total() {
        let mut request = approved_request();
        request.items.clear();

        let error = generate_purchase_order(&request, Utc::now()).expect_err("must refuse");
        assert_eq!(error, DomainError::InsufficientData);
    }

    #[test]
    fn po_number_is_deterministic_per_request_and_approval() {
        let approved_at = Utc::now();
        assert_eq!(po_number("PR-77", approved_at), po_number("PR-77", approved_at));
        assert_ne!(po_number("PR-77", approved_at), po_number("PR-78", approved_at));
    }
}
