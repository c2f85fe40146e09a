//! Integration tests for the HTTP surface, with fake collaborators.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt; // for `oneshot` method
use waste_ledger::config::WriterSection;
use waste_ledger::error::DependencyError;
use waste_ledger::heuristics::ParsedInvoice;
use waste_ledger::kpi::{KpiAggregator, KpiState};
use waste_ledger::models::{Route, WasteItem, WasteLabel};
use waste_ledger::ocr::TextDetector;
use waste_ledger::storage::ObjectStore;
use waste_ledger::vision::VisionClassifier;
use waste_ledger::warehouse::{SqliteWarehouse, Warehouse, WarehouseCounts};
use waste_ledger::writer::{TextGenerator, WriterClient};
use waste_ledger::{AppState, build_router};

const SAMPLE_INVOICE: &str =
    "Recycling 15.2 kg $45\nLandfill 8.7 kg $32\nCompost 12.1 kg $28\nPeriod 2025-01 Vendor GreenCity";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct RecordingStore {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(&self, key: &str, _bytes: &[u8], _ct: &str) -> Result<(), DependencyError> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

struct DownStore;

#[async_trait]
impl ObjectStore for DownStore {
    async fn put(&self, _key: &str, _bytes: &[u8], _ct: &str) -> Result<(), DependencyError> {
        Err(DependencyError::NotConfigured("object store"))
    }
}

/// Returns the given lines, or fails when there are none.
struct FixedOcr(Option<Vec<String>>);

#[async_trait]
impl TextDetector for FixedOcr {
    async fn detect_text(&self, _document: &[u8]) -> Result<Vec<String>, DependencyError> {
        self.0.clone().ok_or(DependencyError::NoText)
    }
}

/// Returns the given items, or a malformed-reply error when there are none.
struct FixedVision(Option<Vec<WasteItem>>);

#[async_trait]
impl VisionClassifier for FixedVision {
    async fn classify(&self, _image: &[u8]) -> Result<Vec<WasteItem>, DependencyError> {
        self.0.clone().ok_or_else(|| DependencyError::Malformed {
            service: "vision",
            detail: "no array".to_string(),
        })
    }
}

/// Keyed text generation whose endpoint is always down.
struct DownWriter;

#[async_trait]
impl TextGenerator for DownWriter {
    async fn tip(&self, _label: WasteLabel, _route: Route) -> Result<String, DependencyError> {
        Err(DependencyError::Status {
            service: "writer",
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn kpi_summary(&self, _kpis: &KpiState) -> Result<String, DependencyError> {
        Err(DependencyError::Malformed {
            service: "writer",
            detail: "empty completion".to_string(),
        })
    }
}

struct DownWarehouse;

#[async_trait]
impl Warehouse for DownWarehouse {
    async fn insert_waste_events(&self, _items: &[WasteItem]) -> Result<usize, DependencyError> {
        Err(DependencyError::NotConfigured("warehouse"))
    }

    async fn insert_invoice_lines(&self, _: &ParsedInvoice) -> Result<String, DependencyError> {
        Err(DependencyError::NotConfigured("warehouse"))
    }

    async fn kpi_totals(&self) -> Result<KpiState, DependencyError> {
        Err(DependencyError::NotConfigured("warehouse"))
    }

    async fn counts(&self) -> Result<WarehouseCounts, DependencyError> {
        Err(DependencyError::NotConfigured("warehouse"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    app: axum::Router,
    store: Arc<RecordingStore>,
    warehouse: SqliteWarehouse,
}

fn setup(ocr: FixedOcr, vision: FixedVision) -> Harness {
    let store = Arc::new(RecordingStore::default());
    let warehouse = SqliteWarehouse::in_memory().expect("in-memory warehouse");
    let state = AppState {
        kpis: Arc::new(KpiAggregator::new()),
        store: store.clone(),
        ocr: Arc::new(ocr),
        vision: Arc::new(vision),
        // No key: templates only, never the network.
        writer: Arc::new(WriterClient::with_key(&WriterSection::default(), None)),
        warehouse: Arc::new(warehouse.clone()),
    };
    Harness {
        app: build_router(state, 1024 * 1024),
        store,
        warehouse,
    }
}

fn sample_ocr() -> FixedOcr {
    FixedOcr(Some(SAMPLE_INVOICE.lines().map(str::to_string).collect()))
}

fn two_items() -> FixedVision {
    FixedVision(Some(vec![
        WasteItem::new(WasteLabel::AluminumCan, Route::Recycle, 0.92, 0.015),
        WasteItem::new(WasteLabel::PizzaBoxGreasy, Route::Landfill, 0.71, 0.25),
    ]))
}

const BOUNDARY: &str = "waste-ledger-test-boundary";

fn multipart_request(uri: &str, field: &str, filename: Option<&str>, bytes: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(f) => format!("form-data; name=\"{field}\"; filename=\"{f}\""),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
}

// =============================================================================
// Invoice upload
// =============================================================================

#[tokio::test]
async fn test_invoice_upload_end_to_end() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-invoice", "file", Some("jan.pdf"), b"%PDF-1.4"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["parsed"]["period"], "2025-01");
    assert_eq!(body["parsed"]["vendor"], "GreenCity");

    let lines = body["parsed"]["lines"].as_array().unwrap();
    let got: Vec<(String, f64, f64)> = lines
        .iter()
        .map(|l| {
            (
                l["line_type"].as_str().unwrap().to_string(),
                l["weight_kg"].as_f64().unwrap(),
                l["cost_usd"].as_f64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        got,
        vec![
            ("recycling".to_string(), 15.2, 45.0),
            ("compost".to_string(), 12.1, 28.0),
            ("landfill".to_string(), 8.7, 32.0),
        ]
    );

    let (_, kpis) = send(&h.app, empty_request("GET", "/kpis")).await;
    assert_eq!(kpis["recycle_kg"].as_f64().unwrap(), 15.2);
    assert_eq!(kpis["compost_kg"].as_f64().unwrap(), 12.1);
    assert_eq!(kpis["landfill_kg"].as_f64().unwrap(), 8.7);
    let expected = (15.2 + 12.1) / (15.2 + 12.1 + 8.7);
    assert!((kpis["diversion_rate"].as_f64().unwrap() - expected).abs() < 1e-12);

    let keys = h.store.keys.lock().unwrap().clone();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("invoices/") && keys[0].ends_with("_jan.pdf"));

    let counts = h.warehouse.counts().await.unwrap();
    assert_eq!(counts.invoices, 1);
    assert_eq!(counts.invoice_lines, 3);
}

#[tokio::test]
async fn test_invoice_ocr_failure_uses_sample_text() {
    let h = setup(FixedOcr(None), two_items());

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-invoice", "file", Some("scan.pdf"), b"not a pdf"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["parsed"]["period"], "2025-09");
    assert_eq!(body["parsed"]["vendor"], "GreenCity");
    assert_eq!(body["parsed"]["lines"][0]["weight_kg"].as_f64().unwrap(), 520.0);
    assert_eq!(body["parsed"]["lines"][0]["cost_usd"].as_f64().unwrap(), 180.0);
    assert_eq!(body["parsed"]["lines"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_invoice_without_categories_leaves_kpis_alone() {
    let h = setup(
        FixedOcr(Some(vec!["Service fee $40".to_string()])),
        two_items(),
    );

    let (_, body) = send(
        &h.app,
        multipart_request("/upload-invoice", "file", Some("fee.pdf"), b"x"),
    )
    .await;
    assert_eq!(body["parsed"]["period"], "2025-09");
    assert_eq!(body["parsed"]["vendor"], "Unknown Hauler");
    assert!(body["parsed"]["lines"].as_array().unwrap().is_empty());

    let (_, kpis) = send(&h.app, empty_request("GET", "/kpis")).await;
    assert_eq!(kpis["diversion_rate"].as_f64().unwrap(), 0.0);
}

// =============================================================================
// Image upload
// =============================================================================

#[tokio::test]
async fn test_image_upload_attaches_tips_and_counts() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-image", "file", Some("bin.jpg"), &[0xFF, 0xD8, 0xFF]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["label"], "aluminum_can");
    assert_eq!(items[0]["route"], "recycle");
    assert_eq!(items[0]["source"], "image");
    assert_eq!(items[0]["tip"], "Place aluminum can in the recycle bin.");
    assert_eq!(items[1]["tip"], "Place pizza box greasy in the landfill bin.");
    let key = items[0]["object_key"].as_str().unwrap();
    assert!(key.starts_with("waste/") && key.ends_with("_bin.jpg"));

    let (_, kpis) = send(&h.app, empty_request("GET", "/kpis")).await;
    assert_eq!(kpis["recycle_kg"].as_f64().unwrap(), 0.015);
    assert_eq!(kpis["landfill_kg"].as_f64().unwrap(), 0.25);
    assert_eq!(kpis["compost_kg"].as_f64().unwrap(), 0.0);

    assert_eq!(h.warehouse.counts().await.unwrap().waste_events, 2);
}

#[tokio::test]
async fn test_image_vision_failure_uses_fallback_item() {
    let h = setup(sample_ocr(), FixedVision(None));

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-image", "file", Some("blurry.jpg"), b"..."),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["label"], "plastic_bottle");
    assert_eq!(items[0]["route"], "recycle");
    assert_eq!(items[0]["confidence"].as_f64().unwrap(), 0.9);
    assert_eq!(items[0]["est_weight_kg"].as_f64().unwrap(), 0.03);
}

#[tokio::test]
async fn test_file_field_without_filename_is_accepted() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-image", "file", None, b"raw"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"][0]["object_key"]
        .as_str()
        .unwrap()
        .ends_with("_upload"));
}

#[tokio::test]
async fn test_upload_without_file_is_bad_request() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-image", "note", None, b"hello"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no file field"));
}

#[tokio::test]
async fn test_oversize_upload_is_payload_too_large() {
    let h = setup(sample_ocr(), two_items());
    let big = vec![0u8; 2 * 1024 * 1024];

    let (status, body) = send(
        &h.app,
        multipart_request("/upload-image", "file", Some("huge.jpg"), &big),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().starts_with("invalid multipart body"));
    assert!(h.store.keys.lock().unwrap().is_empty());
    assert_eq!(h.warehouse.counts().await.unwrap().waste_events, 0);
}

#[tokio::test]
async fn test_truncated_multipart_is_bad_request() {
    let h = setup(sample_ocr(), two_items());
    let request = Request::builder()
        .method("POST")
        .uri("/upload-invoice")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.pdf\"\r\n\r\nno closing boundary"
        )))
        .unwrap();

    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_text_generation_failure_uses_templates() {
    let warehouse = SqliteWarehouse::in_memory().expect("in-memory warehouse");
    let state = AppState {
        kpis: Arc::new(KpiAggregator::new()),
        store: Arc::new(RecordingStore::default()),
        ocr: Arc::new(sample_ocr()),
        vision: Arc::new(FixedVision(Some(vec![WasteItem::new(
            WasteLabel::FoodWaste,
            Route::Compost,
            0.88,
            0.4,
        )]))),
        writer: Arc::new(DownWriter),
        warehouse: Arc::new(warehouse),
    };
    let app = build_router(state, 1024 * 1024);

    let (status, body) = send(
        &app,
        multipart_request("/upload-image", "file", Some("scraps.jpg"), b"jpeg"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["items"][0]["tip"], "Place food waste in the compost bin.");

    let (status, kpis) = send(&app, empty_request("GET", "/kpis")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kpis["compost_kg"].as_f64().unwrap(), 0.4);
    assert_eq!(
        kpis["summary"],
        "Diversion 100.0%. Reduce landfill by targeting top contaminants next week."
    );
}

#[tokio::test]
async fn test_collaborator_outages_do_not_fail_requests() {
    let state = AppState {
        kpis: Arc::new(KpiAggregator::new()),
        store: Arc::new(DownStore),
        ocr: Arc::new(FixedOcr(None)),
        vision: Arc::new(FixedVision(None)),
        writer: Arc::new(WriterClient::with_key(&WriterSection::default(), None)),
        warehouse: Arc::new(DownWarehouse),
    };
    let app = build_router(state, 1024 * 1024);

    let (status, body) = send(
        &app,
        multipart_request("/upload-invoice", "file", Some("a.pdf"), b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = send(
        &app,
        multipart_request("/upload-image", "file", Some("a.jpg"), b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, kpis) = send(&app, empty_request("GET", "/kpis")).await;
    // sample invoice recycling plus the fallback bottle
    assert!((kpis["recycle_kg"].as_f64().unwrap() - 520.03).abs() < 1e-9);
    assert_eq!(kpis["compost_kg"].as_f64().unwrap(), 140.0);
}

// =============================================================================
// KPIs and reset
// =============================================================================

#[tokio::test]
async fn test_kpis_start_at_zero_with_template_summary() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(&h.app, empty_request("GET", "/kpis")).await;

    assert_eq!(status, StatusCode::OK);
    for field in ["recycle_kg", "compost_kg", "landfill_kg", "diversion_rate"] {
        assert_eq!(body[field].as_f64().unwrap(), 0.0, "{field}");
    }
    assert_eq!(
        body["summary"],
        "Diversion 0.0%. Reduce landfill by targeting top contaminants next week."
    );
}

#[tokio::test]
async fn test_reset_zeroes_kpis() {
    let h = setup(sample_ocr(), two_items());

    send(
        &h.app,
        multipart_request("/upload-invoice", "file", Some("jan.pdf"), b"x"),
    )
    .await;
    let (_, before) = send(&h.app, empty_request("GET", "/kpis")).await;
    assert!(before["diversion_rate"].as_f64().unwrap() > 0.0);

    let (status, ack) = send(&h.app, empty_request("POST", "/reset-kpis")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["message"], "KPIs reset");

    let (_, after) = send(&h.app, empty_request("GET", "/kpis")).await;
    for field in ["recycle_kg", "compost_kg", "landfill_kg", "diversion_rate"] {
        assert_eq!(after[field].as_f64().unwrap(), 0.0, "{field}");
    }

    // The warehouse keeps its history.
    assert_eq!(h.warehouse.counts().await.unwrap().invoice_lines, 3);
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = setup(sample_ocr(), two_items());

    let (status, body) = send(&h.app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "waste_ledger");
    assert!(body["version"].is_string());
}
