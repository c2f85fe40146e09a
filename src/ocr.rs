// src/ocr.rs

use crate::config::{OcrBackend, OcrSection, secret_from_env};
use crate::error::DependencyError;
use async_trait::async_trait;
use lopdf::{Dictionary, Document};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Turns an uploaded document into ordered text lines.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect_text(&self, document: &[u8]) -> Result<Vec<String>, DependencyError>;
}

pub fn from_config(cfg: &OcrSection) -> Box<dyn TextDetector> {
    match cfg.backend {
        OcrBackend::Pdf => {
            info!("Using local PDF text layer for invoices");
            Box::new(PdfTextDetector)
        }
        OcrBackend::Remote => {
            info!(url = %cfg.url, "Using remote OCR service for invoices");
            Box::new(RemoteTextDetector::new(cfg))
        }
    }
}

// ---------------------------------------------------------------------------
// Local PDF text layer
// ---------------------------------------------------------------------------

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// Too little text to trust; the page is probably an image.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

/// Reads invoices that already carry a text layer. Scanned uploads are
/// reported as [`DependencyError::NoText`].
pub struct PdfTextDetector;

#[async_trait]
impl TextDetector for PdfTextDetector {
    async fn detect_text(&self, document: &[u8]) -> Result<Vec<String>, DependencyError> {
        let bytes = document.to_vec();
        let content = tokio::task::spawn_blocking(move || extract_text_from_pdf(&bytes))
            .await
            .map_err(|e| DependencyError::Task(e.to_string()))?;

        match content {
            PdfContent::Text(text) => Ok(split_lines(&text)),
            PdfContent::ScannedImage => Err(DependencyError::NoText),
            PdfContent::Error(e) => Err(DependencyError::malformed("pdf", e)),
        }
    }
}

/// Non-empty, trimmed lines in reading order.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // --- Phase 2: text extraction ---
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short — treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Err(e) => PdfContent::Error(format!("Text extraction failed: {e}")),
    }
}

/// A page with image XObjects but no fonts is a scan. If at least 80% of
/// pages look like that, the whole document is treated as scanned.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let image_only_pages = pages
        .values()
        .filter_map(|id| doc.get_object(*id).ok())
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|page| {
            has_resource(doc, page, b"XObject") && !has_resource(doc, page, b"Font")
        })
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );
    ratio >= 0.8
}

/// True when the page's `Resources` carries a non-empty `name` dictionary.
fn has_resource(doc: &Document, page: &Dictionary, name: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(name).ok())
        .and_then(|x| doc.dereference(x).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}

// ---------------------------------------------------------------------------
// Remote OCR
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DetectTextResponse {
    lines: Vec<String>,
}

/// POSTs the raw document and expects `{"lines": [...]}` back.
pub struct RemoteTextDetector {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteTextDetector {
    pub fn new(cfg: &OcrSection) -> Self {
        Self {
            client: Client::new(),
            url: cfg.url.clone(),
            api_key: secret_from_env(&cfg.api_key_env),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

#[async_trait]
impl TextDetector for RemoteTextDetector {
    async fn detect_text(&self, document: &[u8]) -> Result<Vec<String>, DependencyError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .timeout(self.timeout)
            .body(document.to_vec());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(DependencyError::transport("ocr"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::Status {
                service: "ocr",
                status,
                body,
            });
        }

        let parsed: DetectTextResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::malformed("ocr", e.to_string()))?;
        info!(lines = parsed.lines.len(), "Remote OCR complete");
        Ok(parsed.lines)
    }
}
