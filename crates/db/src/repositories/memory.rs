use std::collections::HashMap;

use tokio::sync::RwLock;

use procura_core::domain::approval::{Approval, ApprovalLevel};
use procura_core::domain::request::{PurchaseRequest, RequestId};

use super::{ApprovalRepository, RepositoryError, RequestRepository};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, PurchaseRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<PurchaseRequest> = requests.values().cloned().collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryApprovalRepository {
    approvals: RwLock<HashMap<String, Vec<Approval>>>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn append(&self, approval: Approval) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        let entries = approvals.entry(approval.request_id.0.clone()).or_default();
        if entries.iter().any(|entry| entry.level == approval.level) {
            return Err(RepositoryError::DuplicateDecision {
                request_id: approval.request_id.0.clone(),
                level: approval.level.number(),
            });
        }
        entries.push(approval);
        Ok(())
    }

    async fn history(&self, request_id: &RequestId) -> Result<Vec<Approval>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let mut history = approvals.get(&request_id.0).cloned().unwrap_or_default();
        history.sort_by_key(|approval| approval.level.number());
        Ok(history)
    }

    async fn active_at_level(
        &self,
        request_id: &RequestId,
        level: ApprovalLevel,
    ) -> Result<Option<Approval>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals
            .get(&request_id.0)
            .and_then(|entries| entries.iter().find(|entry| entry.level == level).cloned()))
    }
}
