// src/intake.rs
//
// The four service operations. Every collaborator failure is logged and
// replaced by a fallback here, so callers always get `ok: true`. That is a
// demo robustness policy: a production deployment would want at least the
// warehouse failures surfaced.

use crate::heuristics::{self, ParsedInvoice};
use crate::kpi::KpiState;
use crate::models::WasteItem;
use crate::ocr::TextDetector;
use crate::storage::object_key;
use crate::writer::{template_summary, template_tip};
use crate::AppState;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{Instrument, info, info_span, warn};

/// OCR text used when the real document cannot be read.
pub const FALLBACK_INVOICE_TEXT: &str =
    "Recycling 520 kg $180\nLandfill 260 kg $210\nCompost 140 kg $90\nPeriod 2025-09 Vendor GreenCity";

/// Source tag on items that came from a photo upload.
pub const IMAGE_SOURCE: &str = "image";

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            filename: safe_filename(filename),
            content_type: content_type
                .filter(|c| !c.is_empty())
                .unwrap_or("application/octet-stream")
                .to_string(),
            bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageSubmission {
    pub ok: bool,
    pub items: Vec<WasteItem>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceSubmission {
    pub ok: bool,
    pub parsed: ParsedInvoice,
}

#[derive(Debug, Serialize)]
pub struct KpiReport {
    #[serde(flatten)]
    pub kpis: KpiState,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct ResetAck {
    pub ok: bool,
    pub message: String,
}

/// Last path segment of a client-supplied name, never empty or `..`.
fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match base {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}

async fn store_upload(state: &AppState, prefix: &str, upload: &Upload) -> String {
    let key = object_key(prefix, OffsetDateTime::now_utc().unix_timestamp(), &upload.filename);
    if let Err(e) = state
        .store
        .put(&key, &upload.bytes, &upload.content_type)
        .await
    {
        warn!(key = %key, error = %e, "Object store write failed — continuing");
    }
    key
}

/// Classify a photo, attach tips, count the items and persist them.
pub async fn submit_image(state: &AppState, upload: Upload) -> ImageSubmission {
    let span = info_span!("upload_image", filename = %upload.filename, bytes = upload.bytes.len());
    async move {
        let key = store_upload(state, "waste", &upload).await;

        let mut items = match state.vision.classify(&upload.bytes).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Vision classification failed — using fallback item");
                vec![WasteItem::fallback()]
            }
        };

        for item in &mut items {
            let tip = match state.writer.tip(item.label, item.route).await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, label = item.label.as_str(), "Tip generation failed");
                    template_tip(item.label, item.route)
                }
            };
            item.source = IMAGE_SOURCE.to_string();
            item.object_key = Some(key.clone());
            item.tip = Some(tip);
        }

        let counted = state
            .kpis
            .apply_all(items.iter().map(|i| (i.route.as_str(), i.est_weight_kg)));
        info!(items = items.len(), counted, "Image classified");

        if let Err(e) = state.warehouse.insert_waste_events(&items).await {
            warn!(error = %e, "Warehouse write failed — waste events not persisted");
        }

        ImageSubmission { ok: true, items }
    }
    .instrument(span)
    .await
}

/// OCR the document, falling back to [`FALLBACK_INVOICE_TEXT`] when nothing
/// usable comes back.
pub async fn invoice_text(ocr: &dyn TextDetector, document: &[u8]) -> String {
    match ocr.detect_text(document).await {
        Ok(lines) if !lines.is_empty() => lines.join("\n"),
        Ok(_) => {
            warn!("OCR returned no lines — using sample invoice text");
            FALLBACK_INVOICE_TEXT.to_string()
        }
        Err(e) => {
            warn!(error = %e, "OCR failed — using sample invoice text");
            FALLBACK_INVOICE_TEXT.to_string()
        }
    }
}

/// Read a hauler invoice, count its lines and persist them.
pub async fn submit_invoice(state: &AppState, upload: Upload) -> InvoiceSubmission {
    let span =
        info_span!("upload_invoice", filename = %upload.filename, bytes = upload.bytes.len());
    async move {
        store_upload(state, "invoices", &upload).await;

        let text = invoice_text(state.ocr.as_ref(), &upload.bytes).await;
        let parsed = heuristics::parse_invoice_text(&text);

        let counted = state.kpis.apply_all(
            parsed
                .lines
                .iter()
                .map(|l| (l.line_type.as_str(), l.weight_kg)),
        );
        info!(
            period = %parsed.period,
            vendor = %parsed.vendor,
            lines = parsed.lines.len(),
            counted,
            total_cost_usd = parsed.total_cost_usd(),
            "Invoice parsed"
        );

        if let Err(e) = state.warehouse.insert_invoice_lines(&parsed).await {
            warn!(error = %e, "Warehouse write failed — invoice lines not persisted");
        }

        InvoiceSubmission { ok: true, parsed }
    }
    .instrument(span)
    .await
}

/// Current totals plus a one-paragraph summary.
pub async fn kpi_report(state: &AppState) -> KpiReport {
    let kpis = state.kpis.snapshot();
    let summary = match state.writer.kpi_summary(&kpis).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "KPI summary generation failed");
            template_summary(&kpis)
        }
    };
    KpiReport { kpis, summary }
}

pub fn reset_kpis(state: &AppState) -> ResetAck {
    state.kpis.reset();
    info!("KPI totals reset");
    ResetAck {
        ok: true,
        message: "KPIs reset".to_string(),
    }
}
