//! Log analysis handlers
//!
//! Accepts a CSV log upload, runs the detection pipeline, and reports the
//! per-run counts back to the uploader.

use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::engine::{self, record::RawBatch, rules::RuleSet, AnalysisReport};
use crate::{AppError, AppResult, AppState};

/// Bundled sample log for trying the analyzer without real data.
const SAMPLE_LOG: &str = include_str!("../../data/sample_network_logs.csv");

/// POST /api/v1/analyze
///
/// Multipart upload with a `file` field holding a CSV log. Responds with
/// `{ alerts_generated, alerts_stored, rows_skipped, summary }`.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<AnalysisReport>> {
    let mut payload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read upload: {}", e)))?;
            payload = Some((filename, bytes.to_vec()));
            break;
        }
    }

    let (filename, bytes) = payload
        .ok_or_else(|| AppError::BadRequest("no file uploaded".to_string()))?;

    if !filename.to_ascii_lowercase().ends_with(".csv") {
        return Err(AppError::BadRequest("file must be a CSV file".to_string()));
    }

    tracing::info!("starting analysis of uploaded file: {}", filename);

    let batch = RawBatch::from_csv(bytes.as_slice())?;
    let report = engine::analyze_batch(&state.pool, &batch, &RuleSet::default()).await?;

    Ok(Json(report))
}

/// GET /api/v1/sample-log
pub async fn sample_log() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"sample_network_logs.csv\"",
            ),
        ],
        SAMPLE_LOG,
    )
}
