//! HTTP surface

pub mod health;
pub mod kpis;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use health::health_routes;
pub use kpis::{get_kpis, reset_kpis};
pub use upload::{upload_image, upload_invoice};

/// Build application router
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload-image", post(upload_image))
        .route("/upload-invoice", post(upload_invoice))
        .route("/kpis", get(get_kpis))
        .route("/reset-kpis", post(reset_kpis))
        .merge(health_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        // The demo frontend is served from anywhere.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request errors. Collaborator failures never end up here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("multipart body has no file field")]
    MissingFile,

    /// Unreadable body; the status comes from axum (413 past the upload
    /// limit, 400 for a malformed body).
    #[error("invalid multipart body: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
