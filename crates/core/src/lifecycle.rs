use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
use crate::domain::approval::{Approval, ApprovalLevel, Decision};
use crate::domain::purchase_order::PurchaseOrder;
use crate::domain::report::ValidationReport;
use crate::domain::request::{PurchaseRequest, RequestId, RequestItem, RequestStatus};
use crate::errors::DomainError;
use crate::extract::DocumentExtractor;
use crate::ledger::ApprovalLedger;
use crate::po;
use crate::validate::{validate_receipt, Tolerance};

/// Raw document bytes plus the caller-supplied content-type hint. Storage
/// location and retention are the document store's concern.
#[derive(Clone, Debug)]
pub struct DocumentUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Clone, Debug)]
pub struct SubmitInput {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub created_by: String,
    pub items: Vec<RequestItem>,
    pub proforma: Option<DocumentUpload>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifecycleSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Drives a request's status from submission through the two-level approval
/// chain to purchase-order generation and receipt reconciliation.
///
/// Level ordering and one-decision-per-level are enforced here, centrally:
/// a double-counted or out-of-order final approval is a financially
/// meaningful integrity bug, so it is not left to callers.
pub struct RequestLifecycleManager {
    requests: RwLock<HashMap<String, PurchaseRequest>>,
    ledger: RwLock<ApprovalLedger>,
    // Per-request serialization boundary for decide/generate/receipt.
    request_guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    extractor: DocumentExtractor,
    tolerance: Tolerance,
    sink: Arc<dyn AuditSink>,
}

impl Default for RequestLifecycleManager {
    fn default() -> Self {
        Self::new(
            DocumentExtractor::default(),
            Tolerance::default(),
            Arc::new(InMemoryAuditSink::default()),
        )
    }
}

impl RequestLifecycleManager {
    pub fn new(
        extractor: DocumentExtractor,
        tolerance: Tolerance,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            ledger: RwLock::new(ApprovalLedger::new()),
            request_guards: Mutex::new(HashMap::new()),
            extractor,
            tolerance,
            sink,
        }
    }

    /// Creates a request in `Pending`. A degraded proforma extraction never
    /// blocks submission: the caller-supplied items stand and the request is
    /// flagged for later display.
    pub fn submit(&self, input: SubmitInput) -> Result<PurchaseRequest, DomainError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::Validation("title must not be empty".to_string()));
        }
        if input.amount <= Decimal::ZERO {
            return Err(DomainError::Validation("amount must be positive".to_string()));
        }
        for item in &input.items {
            if item.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "item `{}` must have a positive quantity",
                    item.name
                )));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(DomainError::Validation(format!(
                    "item `{}` must have a non-negative unit price",
                    item.name
                )));
            }
        }

        let now = Utc::now();
        let mut request = PurchaseRequest {
            id: RequestId(format!("PR-{}", Uuid::new_v4())),
            title,
            description: input.description,
            amount: input.amount,
            status: RequestStatus::Pending,
            created_by: input.created_by.clone(),
            items: input.items,
            vendor: None,
            currency: None,
            extracted_total: None,
            degraded_extraction: false,
            purchase_order: None,
            validation_report: None,
            created_at: now,
            updated_at: now,
        };

        if let Some(proforma) = &input.proforma {
            self.fold_proforma(&mut request, proforma);
        }

        let snapshot = request.clone();
        self.requests_mut().insert(request.id.0.clone(), request);

        self.sink.emit(
            AuditEvent::new(
                Some(snapshot.id.clone()),
                "lifecycle.request_submitted",
                AuditCategory::Submission,
                &input.created_by,
                AuditOutcome::Success,
            )
            .with_metadata("amount", snapshot.amount.to_string())
            .with_metadata("degraded_extraction", snapshot.degraded_extraction.to_string()),
        );
        info!(request_id = %snapshot.id.0, amount = %snapshot.amount, "request submitted");

        Ok(snapshot)
    }

    fn fold_proforma(&self, request: &mut PurchaseRequest, proforma: &DocumentUpload) {
        let data = self.extractor.extract(&proforma.bytes, &proforma.content_type);
        if data.degraded {
            request.degraded_extraction = true;
            warn!(request_id = %request.id.0, "proforma extraction degraded, keeping caller items");
            self.sink.emit(AuditEvent::new(
                Some(request.id.clone()),
                "document.extraction_degraded",
                AuditCategory::Document,
                &request.created_by,
                AuditOutcome::Rejected,
            ));
            return;
        }

        if !data.items.is_empty() {
            request.items = data
                .items
                .iter()
                .map(|item| RequestItem {
                    name: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect();
        }
        if data.vendor.is_some() {
            request.vendor = data.vendor.clone();
        }
        if data.currency.is_some() {
            request.currency = data.currency.clone();
        }
        request.extracted_total = data.total;

        self.sink.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                "document.proforma_extracted",
                AuditCategory::Document,
                &request.created_by,
                AuditOutcome::Success,
            )
            .with_metadata("items", data.items.len().to_string()),
        );
    }

    /// Records an approval decision. Exactly one of two racing calls for the
    /// same (request, level) succeeds; the loser observes
    /// `DuplicateDecision` or `WrongLevel`, never a lost update.
    pub fn decide(
        &self,
        request_id: &RequestId,
        approver: &str,
        level: ApprovalLevel,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<PurchaseRequest, DomainError> {
        let guard = self.request_guard(request_id);
        let _held = lock_plain(&guard);

        let result = self.decide_locked(request_id, approver, level, decision, comment);
        match &result {
            Ok(request) => {
                self.sink.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "lifecycle.decision_recorded",
                        AuditCategory::Approval,
                        approver,
                        AuditOutcome::Success,
                    )
                    .with_metadata("level", level.number().to_string())
                    .with_metadata("decision", format!("{decision:?}"))
                    .with_metadata("status", format!("{:?}", request.status)),
                );
                info!(
                    request_id = %request_id.0,
                    level = level.number(),
                    ?decision,
                    status = ?request.status,
                    "decision recorded"
                );
            }
            Err(error) => {
                self.sink.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "lifecycle.decision_refused",
                        AuditCategory::Approval,
                        approver,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    fn decide_locked(
        &self,
        request_id: &RequestId,
        approver: &str,
        level: ApprovalLevel,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<PurchaseRequest, DomainError> {
        {
            let requests = self.requests_read();
            let request = requests
                .get(&request_id.0)
                .ok_or_else(|| DomainError::UnknownRequest(request_id.0.clone()))?;
            if request.status != RequestStatus::Pending {
                return Err(DomainError::InvalidTransition {
                    request_id: request_id.0.clone(),
                    status: request.status,
                });
            }
        }

        let expected = self.next_expected_level(request_id);
        if level != expected {
            return Err(DomainError::WrongLevel {
                request_id: request_id.0.clone(),
                expected,
                got: level,
            });
        }

        let approval = Approval {
            request_id: request_id.clone(),
            level,
            decision,
            approver: approver.to_string(),
            comment,
            decided_at: Utc::now(),
        };
        self.ledger_mut().record(approval.clone())?;

        let mut requests = self.requests_mut();
        let request = requests
            .get_mut(&request_id.0)
            .ok_or_else(|| DomainError::UnknownRequest(request_id.0.clone()))?;

        match decision {
            Decision::Rejected => {
                request.transition_to(RequestStatus::Rejected)?;
            }
            Decision::Approved if level == ApprovalLevel::Second => {
                request.transition_to(RequestStatus::Approved)?;
                match po::generate_purchase_order(request, approval.decided_at) {
                    Ok(order) => request.purchase_order = Some(order),
                    Err(error) => {
                        // Approval stands; the explicit generation entry
                        // point can be retried once data is corrected.
                        warn!(request_id = %request_id.0, %error, "auto-generation skipped");
                        self.sink.emit(
                            AuditEvent::new(
                                Some(request_id.clone()),
                                "purchase_order.generation_skipped",
                                AuditCategory::Generation,
                                approver,
                                AuditOutcome::Rejected,
                            )
                            .with_metadata("error", error.to_string()),
                        );
                    }
                }
            }
            Decision::Approved => {
                // Level-1 approval: remains pending awaiting final approval.
            }
        }

        Ok(request.clone())
    }

    fn next_expected_level(&self, request_id: &RequestId) -> ApprovalLevel {
        let ledger = self.ledger_read();
        match ledger.active_decision_at(request_id, ApprovalLevel::First) {
            Some(approval) if approval.decision == Decision::Approved => ApprovalLevel::Second,
            // No level-1 decision yet; a level-1 rejection would already
            // have made the request terminal.
            _ => ApprovalLevel::First,
        }
    }

    /// Explicit, idempotent-by-number re-entry point for purchase-order
    /// generation when the automatic path was skipped.
    pub fn generate_purchase_order(
        &self,
        request_id: &RequestId,
    ) -> Result<PurchaseOrder, DomainError> {
        let guard = self.request_guard(request_id);
        let _held = lock_plain(&guard);

        let approved_at = {
            let ledger = self.ledger_read();
            ledger
                .active_decision_at(request_id, ApprovalLevel::Second)
                .filter(|approval| approval.decision == Decision::Approved)
                .map(|approval| approval.decided_at)
        };

        let mut requests = self.requests_mut();
        let request = requests
            .get_mut(&request_id.0)
            .ok_or_else(|| DomainError::UnknownRequest(request_id.0.clone()))?;

        if request.status != RequestStatus::Approved {
            return Err(DomainError::Precondition {
                request_id: request_id.0.clone(),
                requirement: "request must be approved".to_string(),
            });
        }
        if request.purchase_order.is_some() {
            return Err(DomainError::AlreadyGenerated { request_id: request_id.0.clone() });
        }
        let approved_at = approved_at.ok_or_else(|| DomainError::Precondition {
            request_id: request_id.0.clone(),
            requirement: "an approved level 2 decision".to_string(),
        })?;

        let order = po::generate_purchase_order(request, approved_at)?;
        request.purchase_order = Some(order.clone());

        self.sink.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                "purchase_order.generated",
                AuditCategory::Generation,
                "lifecycle",
                AuditOutcome::Success,
            )
            .with_metadata("po_number", order.po_number.clone()),
        );
        info!(request_id = %request_id.0, po_number = %order.po_number, "purchase order generated");

        Ok(order)
    }

    /// Extracts the receipt, validates it against the stored purchase order,
    /// and attaches the report. Discrepancies are surfaced, not enforced:
    /// the request keeps its terminal status.
    pub fn submit_receipt(
        &self,
        request_id: &RequestId,
        receipt: DocumentUpload,
    ) -> Result<ValidationReport, DomainError> {
        let guard = self.request_guard(request_id);
        let _held = lock_plain(&guard);

        let order = {
            let requests = self.requests_read();
            let request = requests
                .get(&request_id.0)
                .ok_or_else(|| DomainError::UnknownRequest(request_id.0.clone()))?;
            if request.status != RequestStatus::Approved {
                return Err(DomainError::Precondition {
                    request_id: request_id.0.clone(),
                    requirement: "request must be approved".to_string(),
                });
            }
            request.purchase_order.clone().ok_or_else(|| DomainError::Precondition {
                request_id: request_id.0.clone(),
                requirement: "a generated purchase order".to_string(),
            })?
        };

        // The per-request guard is held, so the snapshot cannot drift while
        // extraction runs outside the map locks.
        let data = self.extractor.extract(&receipt.bytes, &receipt.content_type);
        let report = validate_receipt(&data, &order, &self.tolerance);

        let mut requests = self.requests_mut();
        let request = requests
            .get_mut(&request_id.0)
            .ok_or_else(|| DomainError::UnknownRequest(request_id.0.clone()))?;
        request.validation_report = Some(report.clone());
        request.updated_at = Utc::now();

        let mut event = AuditEvent::new(
            Some(request_id.clone()),
            "receipt.validated",
            AuditCategory::Reconciliation,
            &request.created_by,
            AuditOutcome::Success,
        )
        .with_metadata("verdict", format!("{:?}", report.verdict))
        .with_metadata("total_delta", report.total_delta.to_string());
        if let Some(reference) = &data.invoice_number {
            event = event.with_metadata("receipt_reference", reference.clone());
        }
        self.sink.emit(event);
        info!(request_id = %request_id.0, verdict = ?report.verdict, "receipt validated");

        Ok(report)
    }

    pub fn request(&self, request_id: &RequestId) -> Option<PurchaseRequest> {
        self.requests_read().get(&request_id.0).cloned()
    }

    pub fn history(&self, request_id: &RequestId) -> Vec<Approval> {
        self.ledger_read().history(request_id).to_vec()
    }

    pub fn summary(&self) -> LifecycleSummary {
        let requests = self.requests_read();
        let mut summary = LifecycleSummary { total: requests.len(), ..Default::default() };
        for request in requests.values() {
            match request.status {
                RequestStatus::Pending => summary.pending += 1,
                RequestStatus::Approved => summary.approved += 1,
                RequestStatus::Rejected => summary.rejected += 1,
            }
        }
        summary
    }

    fn request_guard(&self, request_id: &RequestId) -> Arc<Mutex<()>> {
        let mut guards = lock_map(&self.request_guards);
        Arc::clone(guards.entry(request_id.0.clone()).or_default())
    }

    fn requests_read(&self) -> RwLockReadGuard<'_, HashMap<String, PurchaseRequest>> {
        self.requests.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn requests_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, PurchaseRequest>> {
        self.requests.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ledger_read(&self) -> RwLockReadGuard<'_, ApprovalLedger> {
        self.ledger.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ledger_mut(&self) -> RwLockWriteGuard<'_, ApprovalLedger> {
        self.ledger.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_plain(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_map<'a>(
    mutex: &'a Mutex<HashMap<String, Arc<Mutex<()>>>>,
) -> MutexGuard<'a, HashMap<String, Arc<Mutex<()>>>> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
