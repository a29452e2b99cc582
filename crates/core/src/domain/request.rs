use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::purchase_order::PurchaseOrder;
use crate::domain::report::ValidationReport;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl RequestItem {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// A purchase request owned by the lifecycle manager once created.
///
/// The item collection is replaced wholesale by extraction output before any
/// approval occurs and is immutable afterwards. Requests are never physically
/// deleted; the status enum is the only lifecycle surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub status: RequestStatus,
    pub created_by: String,
    pub items: Vec<RequestItem>,
    pub vendor: Option<String>,
    pub currency: Option<String>,
    /// Total carried over from proforma extraction, when one was found.
    pub extracted_total: Option<Decimal>,
    /// Set when proforma extraction degraded and the caller-supplied items
    /// were kept instead.
    pub degraded_extraction: bool,
    pub purchase_order: Option<PurchaseOrder>,
    pub validation_report: Option<ValidationReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self.status, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: RequestStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidTransition { request_id: self.id.0.clone(), status: self.status })
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(RequestItem::line_total).sum()
    }
}
