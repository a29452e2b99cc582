use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl PurchaseOrderLine {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// The authoritative record of what was approved to buy.
///
/// Immutable once attached to a request; regeneration is disallowed by the
/// lifecycle manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_number: String,
    pub vendor: Option<String>,
    pub lines: Vec<PurchaseOrderLine>,
    pub total: Decimal,
    pub currency: Option<String>,
    pub terms: String,
    pub generated_at: DateTime<Utc>,
}
