pub use chrono;
pub use rust_decimal;

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod ledger;
pub mod lifecycle;
pub mod po;
pub mod validate;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::approval::{Approval, ApprovalLevel, Decision};
pub use domain::purchase_order::{PurchaseOrder, PurchaseOrderLine};
pub use domain::report::{LineMatch, ReportLine, ValidationReport, Verdict};
pub use domain::request::{PurchaseRequest, RequestId, RequestItem, RequestStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extract::{
    DocumentExtractor, ExtractedDocumentData, ExtractedLineItem, NoopOcr, OcrEngine, OcrError,
};
pub use ledger::ApprovalLedger;
pub use lifecycle::{DocumentUpload, LifecycleSummary, RequestLifecycleManager, SubmitInput};
pub use po::generate_purchase_order;
pub use validate::{validate_receipt, Tolerance};
