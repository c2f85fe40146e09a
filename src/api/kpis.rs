//! GET /kpis and POST /reset-kpis

use axum::extract::State;
use axum::Json;

use crate::intake::{self, KpiReport, ResetAck};
use crate::AppState;

/// GET /kpis
pub async fn get_kpis(State(state): State<AppState>) -> Json<KpiReport> {
    Json(intake::kpi_report(&state).await)
}

/// POST /reset-kpis
pub async fn reset_kpis(State(state): State<AppState>) -> Json<ResetAck> {
    Json(intake::reset_kpis(&state))
}
