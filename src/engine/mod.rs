//! Detection engine
//!
//! One strictly sequential pipeline per uploaded batch:
//!
//! ```text
//! raw rows -> validator -> records -> four rule evaluators -> candidates
//!          -> assembler -> persisted alerts -> aggregator -> stats
//! ```
//!
//! The evaluators are mutually independent and side-effect free over the
//! shared record slice; the only I/O in the pipeline is the per-alert
//! insert at the end. Records are dropped when the batch completes.

pub mod record;
pub mod validator;
pub mod frequency;
pub mod rules;
pub mod assembler;
pub mod aggregator;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::EngineError;
use assembler::RunSummary;
use record::RawBatch;
use rules::RuleSet;

/// What one analysis run reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub alerts_generated: usize,
    pub alerts_stored: usize,
    pub rows_skipped: usize,
    pub summary: RunSummary,
}

/// Run the full pipeline over one uploaded batch.
///
/// Fails hard only on a schema mismatch; malformed rows and rejected
/// inserts are recovered locally and show up in the report's tallies.
pub async fn analyze_batch(
    pool: &SqlitePool,
    batch: &RawBatch,
    rules: &RuleSet,
) -> Result<AnalysisReport, EngineError> {
    let validated = validator::validate_batch(batch)?;
    let candidates = rules::evaluate(&validated.records, rules);
    let outcome = assembler::assemble_and_store(pool, &validated.records, &candidates).await;

    tracing::info!(
        "analysis complete: {} generated, {} stored, {} rows skipped",
        outcome.alerts_generated,
        outcome.alerts_stored,
        validated.rows_skipped
    );

    Ok(AnalysisReport {
        alerts_generated: outcome.alerts_generated,
        alerts_stored: outcome.alerts_stored,
        rows_skipped: validated.rows_skipped,
        summary: outcome.summary,
    })
}

// ============================================================================
// END-TO-END TESTS
// ============================================================================
