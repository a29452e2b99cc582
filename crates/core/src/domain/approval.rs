use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

/// The two sequential approval levels a request must clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalLevel {
    First,
    Second,
}

impl ApprovalLevel {
    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub request_id: RequestId,
    pub level: ApprovalLevel,
    pub decision: Decision,
    pub approver: String,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ApprovalLevel;

    #[test]
    fn level_numbers_round_trip() {
        assert_eq!(ApprovalLevel::from_number(1), Some(ApprovalLevel::First));
        assert_eq!(ApprovalLevel::from_number(2), Some(ApprovalLevel::Second));
        assert_eq!(ApprovalLevel::from_number(3), None);
        assert_eq!(ApprovalLevel::Second.number(), 2);
    }
}
