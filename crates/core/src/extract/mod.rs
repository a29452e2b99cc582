pub mod fields;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl ExtractedLineItem {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Structured candidate fields pulled out of an uploaded document.
///
/// Transient value object: it is folded into the request or the
/// purchase-order payload, never persisted on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocumentData {
    pub vendor: Option<String>,
    pub items: Vec<ExtractedLineItem>,
    pub total: Option<Decimal>,
    pub currency: Option<String>,
    /// Labelled invoice reference, when the document prints one.
    pub invoice_number: Option<String>,
    /// Extraction produced no usable financial fields; callers fall back to
    /// manually entered data.
    pub degraded: bool,
}

impl ExtractedDocumentData {
    pub fn degraded() -> Self {
        Self {
            vendor: None,
            items: Vec::new(),
            total: None,
            currency: None,
            invoice_number: None,
            degraded: true,
        }
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(ExtractedLineItem::line_total).sum()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OcrError {
    #[error("no OCR engine is configured")]
    NotConfigured,
    #[error("unsupported content type `{0}`")]
    UnsupportedContentType(String),
    #[error("OCR engine failure: {0}")]
    Engine(String),
}

/// Seam for an external OCR backend. The engine itself is an external
/// collaborator; the core only consumes recognized text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, bytes: &[u8], content_type: &str) -> Result<String, OcrError>;
}

/// Default engine for deployments without OCR: every call degrades.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOcr;

impl OcrEngine for NoopOcr {
    fn recognize(&self, _bytes: &[u8], _content_type: &str) -> Result<String, OcrError> {
        Err(OcrError::NotConfigured)
    }
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Turns an uploaded document into structured candidate fields.
///
/// Never fails hard: corrupt files, missing text layers, OCR errors, and
/// timeouts all degrade to a flagged empty result so the surrounding
/// workflow never stalls on a malformed document.
#[derive(Clone)]
pub struct DocumentExtractor {
    ocr: Arc<dyn OcrEngine>,
    timeout: Duration,
    max_document_bytes: usize,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(Arc::new(NoopOcr))
    }
}

impl DocumentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            ocr,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_document_bytes(mut self, max_document_bytes: usize) -> Self {
        self.max_document_bytes = max_document_bytes;
        self
    }

    pub fn extract(&self, bytes: &[u8], content_type: &str) -> ExtractedDocumentData {
        if bytes.is_empty() || bytes.len() > self.max_document_bytes {
            warn!(
                size = bytes.len(),
                limit = self.max_document_bytes,
                "document size out of bounds, degrading extraction"
            );
            return ExtractedDocumentData::degraded();
        }

        match self.raw_text_bounded(bytes, content_type) {
            Some(text) if !text.trim().is_empty() => fields::extract(&text),
            _ => ExtractedDocumentData::degraded(),
        }
    }

    /// Runs text acquisition on a worker thread so a wedged parser cannot
    /// hang the submitting call. A panicking parser drops the sender, which
    /// reads as a degraded result.
    fn raw_text_bounded(&self, bytes: &[u8], content_type: &str) -> Option<String> {
        let (sender, receiver) = mpsc::channel();
        let owned_bytes = bytes.to_vec();
        let owned_content_type = content_type.to_string();
        let ocr = Arc::clone(&self.ocr);

        thread::spawn(move || {
            let text = raw_text(&owned_bytes, &owned_content_type, ocr.as_ref());
            let _ = sender.send(text);
        });

        match receiver.recv_timeout(self.timeout) {
            Ok(text) => text,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(content_type, "text acquisition timed out, degrading extraction");
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!(content_type, "text acquisition worker failed, degrading extraction");
                None
            }
        }
    }
}

fn raw_text(bytes: &[u8], content_type: &str, ocr: &dyn OcrEngine) -> Option<String> {
    if content_type.eq_ignore_ascii_case("application/pdf") {
        // Text layer first; image-only PDFs fall through to OCR.
        if let Some(text) = pdf_text_layer(bytes) {
            return Some(text);
        }
        return ocr_text(bytes, content_type, ocr);
    }

    if content_type.to_ascii_lowercase().starts_with("image/") {
        return ocr_text(bytes, content_type, ocr);
    }

    // Unknown content type: try both acquisition paths before giving up.
    pdf_text_layer(bytes).or_else(|| ocr_text(bytes, content_type, ocr))
}

fn pdf_text_layer(bytes: &[u8]) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(error) => {
            warn!(%error, "pdf text layer extraction failed");
            None
        }
    }
}

fn ocr_text(bytes: &[u8], content_type: &str, ocr: &dyn OcrEngine) -> Option<String> {
    match ocr.recognize(bytes, content_type) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(error) => {
            warn!(%error, content_type, "ocr recognition failed");
            None
        }
    }
}
