//! Hourly aggregation for trend reporting
//!
//! Buckets persisted alerts into hours over a rolling 24-hour window and
//! breaks them down by threat type. `compute` is pure over the queried
//! alert set, so two calls with the same `now` and no intervening writes
//! give identical output.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::Alert;

/// Reporting window length in hours.
const WINDOW_HOURS: i64 = 24;

/// One hour bucket. The hour is truncated to the top of the hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyStat {
    pub hour: DateTime<Utc>,
    pub count: u64,
}

/// The stats triple served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    /// One bucket per hour in `[now - 24h, now]`, empty hours included,
    /// chronological order.
    pub hourly_counts: Vec<HourlyStat>,
    /// Threat type -> count over the same window; zero counts omitted.
    pub threat_breakdown: BTreeMap<String, u64>,
    pub total_recent_alerts: u64,
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Pure aggregation over an already-queried alert set.
pub fn compute(now: DateTime<Utc>, alerts: &[Alert]) -> StatsReport {
    let window_start = truncate_to_hour(now - Duration::hours(WINDOW_HOURS));
    let window_end = truncate_to_hour(now);

    let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    let mut hour = window_start;
    while hour <= window_end {
        buckets.insert(hour, 0);
        hour += Duration::hours(1);
    }

    let mut threat_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    for alert in alerts {
        if let Some(count) = buckets.get_mut(&truncate_to_hour(alert.timestamp)) {
            *count += 1;
        }
        *threat_breakdown.entry(alert.threat_type.clone()).or_insert(0) += 1;
    }

    StatsReport {
        hourly_counts: buckets
            .into_iter()
            .map(|(hour, count)| HourlyStat { hour, count })
            .collect(),
        threat_breakdown,
        total_recent_alerts: alerts.len() as u64,
    }
}

/// Query the store for the last 24 hours of alerts and aggregate them.
/// A store failure fails only this stats request.
pub async fn compute_recent(pool: &SqlitePool, now: DateTime<Utc>) -> AppResult<StatsReport> {
    let alerts = Alert::recent(pool, now - Duration::hours(WINDOW_HOURS)).await?;
    Ok(compute(now, &alerts))
}

// ============================================================================
// TESTS
// ============================================================================
