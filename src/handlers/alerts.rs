//! Alert handlers

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::aggregator::{self, StatsReport};
use crate::models::Alert;
use crate::{AppResult, AppState};

#[derive(Debug, Deserialize, Default)]
pub struct AlertFilter {
    /// When true, only alerts from the last 24 hours.
    #[serde(default)]
    pub recent: bool,
}

#[derive(Debug, Serialize)]
pub struct AlertList {
    pub alerts: Vec<Alert>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

/// GET /api/v1/alerts
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<AlertList>> {
    let alerts = if filter.recent {
        Alert::recent(&state.pool, chrono::Utc::now() - chrono::Duration::hours(24)).await?
    } else {
        Alert::list_all(&state.pool).await?
    };

    tracing::info!("retrieved {} alerts (recent={})", alerts.len(), filter.recent);

    let count = alerts.len();
    Ok(Json(AlertList { alerts, count }))
}

/// GET /api/v1/alerts/stats
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<StatsReport>> {
    let report = aggregator::compute_recent(&state.pool, chrono::Utc::now()).await?;
    Ok(Json(report))
}

/// DELETE /api/v1/alerts
pub async fn clear(State(state): State<AppState>) -> AppResult<Json<ClearResponse>> {
    let deleted = Alert::delete_all(&state.pool).await?;
    tracing::info!("cleared {} alerts", deleted);
    Ok(Json(ClearResponse { deleted }))
}
