use std::sync::Arc;
use std::time::Duration;

use procura_core::audit::InMemoryAuditSink;
use procura_core::config::{AppConfig, LoadOptions};
use procura_core::domain::approval::{ApprovalLevel, Decision};
use procura_core::extract::{DocumentExtractor, OcrEngine, OcrError};
use procura_core::lifecycle::{DocumentUpload, RequestLifecycleManager, SubmitInput};
use procura_core::rust_decimal::Decimal;
use procura_core::validate::Tolerance;

use crate::commands::CommandResult;

const PROFORMA: &str = "Acme Supplies Ltd\n2 Laptop $500.00\n5 Mouse $20.00\nTOTAL: $1,100.00 USD";
const RECEIPT: &str = "Acme Supplies Ltd\n2 Laptop $500.00\n5 Mouse $20.00\nTOTAL: $1,100.00 USD";

/// Stand-in OCR engine for the demo: documents are plain UTF-8 text.
struct PlainTextOcr;

impl OcrEngine for PlainTextOcr {
    fn recognize(&self, bytes: &[u8], _content_type: &str) -> Result<String, OcrError> {
        String::from_utf8(bytes.to_vec()).map_err(|error| OcrError::Engine(error.to_string()))
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "demo",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let sink = Arc::new(InMemoryAuditSink::default());
    let extractor = DocumentExtractor::new(Arc::new(PlainTextOcr))
        .with_timeout(Duration::from_secs(config.extraction.timeout_secs))
        .with_max_document_bytes(config.extraction.max_document_bytes);
    let tolerance = Tolerance::from_units(
        config.validation.tolerance_bps,
        config.validation.epsilon_minor_units,
    );
    let manager = RequestLifecycleManager::new(
        extractor,
        tolerance,
        Arc::clone(&sink) as Arc<dyn procura_core::audit::AuditSink>,
    );

    let outcome = (|| {
        let request = manager.submit(SubmitInput {
            title: "Office hardware refresh".to_string(),
            description: "Replacement laptops and mice for the field team".to_string(),
            amount: Decimal::new(110_000, 2),
            created_by: "u-demo-staff".to_string(),
            items: Vec::new(),
            proforma: Some(DocumentUpload {
                bytes: PROFORMA.as_bytes().to_vec(),
                content_type: "image/png".to_string(),
            }),
        })?;

        manager.decide(
            &request.id,
            "u-demo-supervisor",
            ApprovalLevel::First,
            Decision::Approved,
            Some("within department budget".to_string()),
        )?;
        let approved = manager.decide(
            &request.id,
            "u-demo-finance",
            ApprovalLevel::Second,
            Decision::Approved,
            None,
        )?;

        let report = manager.submit_receipt(
            &request.id,
            DocumentUpload {
                bytes: RECEIPT.as_bytes().to_vec(),
                content_type: "image/png".to_string(),
            },
        )?;

        Ok::<_, procura_core::errors::DomainError>((approved, report))
    })();

    match outcome {
        Ok((request, report)) => {
            let po_number = request
                .purchase_order
                .as_ref()
                .map(|po| po.po_number.clone())
                .unwrap_or_else(|| "<missing>".to_string());
            CommandResult::success(
                "demo",
                format!(
                    "request {} is {:?}; purchase order {po_number} totals {}; receipt verdict {:?} (delta {}); {} audit events recorded",
                    request.id.0,
                    request.status,
                    request.purchase_order.as_ref().map(|po| po.total).unwrap_or_default(),
                    report.verdict,
                    report.total_delta,
                    sink.events().len(),
                ),
            )
        }
        Err(error) => CommandResult::failure("demo", "lifecycle", error.to_string(), 2),
    }
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn demo_walks_the_full_lifecycle_cleanly() {
        let result = run();
        assert_eq!(result.exit_code, 0, "demo output: {}", result.output);
        assert!(result.output.contains("\"status\":\"ok\""));
        assert!(result.output.contains("Approved"));
        assert!(result.output.contains("Clean"));
    }
}
