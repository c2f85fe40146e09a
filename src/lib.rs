//! waste_ledger: photo and hauler-invoice intake with running diversion KPIs.
//!
//! Uploads are handed to external collaborators (object store, OCR, vision
//! model, text generation, warehouse). Collaborator failures never reach the
//! HTTP caller; see [`intake`] for the fallback rules.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod intake;
pub mod kpi;
pub mod models;
pub mod ocr;
pub mod storage;
pub mod vision;
pub mod warehouse;
pub mod writer;

pub use api::build_router;

use config::Config;
use kpi::KpiAggregator;
use ocr::TextDetector;
use storage::ObjectStore;
use vision::{ChatVisionClassifier, VisionClassifier};
use warehouse::Warehouse;
use writer::{TextGenerator, WriterClient};

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub kpis: Arc<KpiAggregator>,
    pub store: Arc<dyn ObjectStore>,
    pub ocr: Arc<dyn TextDetector>,
    pub vision: Arc<dyn VisionClassifier>,
    pub writer: Arc<dyn TextGenerator>,
    pub warehouse: Arc<dyn Warehouse>,
}

impl AppState {
    /// Wire up the configured collaborators around a fresh aggregator.
    pub fn from_config(cfg: &Config, warehouse: Arc<dyn Warehouse>) -> Self {
        let writer = WriterClient::new(&cfg.writer);
        if !writer.is_configured() {
            tracing::info!(
                env = %cfg.writer.api_key_env,
                "No text-generation key — tips and summaries use local templates"
            );
        }
        Self {
            kpis: Arc::new(KpiAggregator::new()),
            store: Arc::from(storage::from_config(&cfg.storage)),
            ocr: Arc::from(ocr::from_config(&cfg.ocr)),
            vision: Arc::new(ChatVisionClassifier::new(&cfg.vision)),
            writer: Arc::new(writer),
            warehouse,
        }
    }
}
