use std::collections::HashMap;

use crate::domain::approval::{Approval, ApprovalLevel};
use crate::domain::request::RequestId;
use crate::errors::DomainError;

/// Append-only record of per-level approval decisions.
///
/// The only rule enforced here is uniqueness: at most one active decision per
/// (request, level). Level sequencing belongs to the lifecycle manager, which
/// keeps this store reusable and testable in isolation.
#[derive(Clone, Debug, Default)]
pub struct ApprovalLedger {
    entries_by_request: HashMap<String, Vec<Approval>>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, approval: Approval) -> Result<(), DomainError> {
        let chain = self.entries_by_request.entry(approval.request_id.0.clone()).or_default();

        if chain.iter().any(|entry| entry.level == approval.level) {
            return Err(DomainError::DuplicateDecision {
                request_id: approval.request_id.0.clone(),
                level: approval.level,
            });
        }

        chain.push(approval);
        Ok(())
    }

    /// Most recent decision recorded at the given level, if any.
    pub fn active_decision_at(
        &self,
        request_id: &RequestId,
        level: ApprovalLevel,
    ) -> Option<&Approval> {
        self.entries_by_request
            .get(&request_id.0)
            .and_then(|chain| chain.iter().rev().find(|entry| entry.level == level))
    }

    /// Full decision sequence for audit display, in insertion order.
    pub fn history(&self, request_id: &RequestId) -> &[Approval] {
        self.entries_by_request.get(&request_id.0).map(Vec::as_slice).unwrap_or(&[])
    }
}
