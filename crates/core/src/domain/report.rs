use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMatch {
    Matched,
    AmountMismatch,
    MissingInReceipt,
    ExtraInReceipt,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    pub description: String,
    pub status: LineMatch,
    /// Line total on the purchase order, absent for extra receipt lines.
    pub expected_total: Option<Decimal>,
    /// Line total observed on the receipt, absent for missing lines.
    pub observed_total: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Discrepant,
}

/// Diagnostic comparison of a receipt against its purchase order.
///
/// Recomputed on every receipt submission; never feeds back into request
/// status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub lines: Vec<ReportLine>,
    /// Signed receipt total minus purchase-order total.
    pub total_delta: Decimal,
    pub verdict: Verdict,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.verdict == Verdict::Clean
    }
}
