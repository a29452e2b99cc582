use async_trait::async_trait;
use thiserror::Error;

use procura_core::domain::approval::{Approval, ApprovalLevel};
use procura_core::domain::request::{PurchaseRequest, RequestId};

pub mod approval;
pub mod memory;
pub mod request;

pub use approval::SqlApprovalRepository;
pub use memory::{InMemoryApprovalRepository, InMemoryRequestRepository};
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("a decision already exists for request `{request_id}` at level {level}")]
    DuplicateDecision { request_id: String, level: u8 },
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RepositoryError>;
    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Appends a decision. The uniqueness of (request, level) is enforced by
    /// storage; a violation surfaces as `DuplicateDecision`.
    async fn append(&self, approval: Approval) -> Result<(), RepositoryError>;

    async fn history(&self, request_id: &RequestId) -> Result<Vec<Approval>, RepositoryError>;

    async fn active_at_level(
        &self,
        request_id: &RequestId,
        level: ApprovalLevel,
    ) -> Result<Option<Approval>, RepositoryError>;
}
