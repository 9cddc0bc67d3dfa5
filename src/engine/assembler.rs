//! Alert assembler
//!
//! Turns rule candidates into `Alert` rows and hands them to the store.
//! Inserts are best-effort: a rejected insert is logged and skipped, and
//! the gap shows up as `alerts_generated - alerts_stored`. There is no
//! content dedup across uploads; the same CSV twice yields two alert sets.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::{Alert, NewAlert, ThreatType};
use super::record::ConnectionRecord;
use super::rules::Candidate;

/// Per-run summary returned to the uploader alongside the stored counts.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_alerts: usize,
    pub unique_source_ips: usize,
    pub threat_breakdown: BTreeMap<String, usize>,
}

/// Outcome of assembling and persisting one batch's candidates.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyOutcome {
    pub alerts_generated: usize,
    pub alerts_stored: usize,
    pub summary: RunSummary,
}

/// Build the final alert for one candidate. Severity comes strictly from
/// the threat type; `port` is populated only for the port-centric rule.
fn build_alert(record: &ConnectionRecord, candidate: &Candidate) -> NewAlert {
    let port = match candidate.threat_type {
        ThreatType::SuspiciousPort => Some(record.destination_port),
        _ => None,
    };

    NewAlert {
        timestamp: record.timestamp,
        source_ip: record.source_ip.clone(),
        port,
        threat_type: candidate.threat_type,
        description: candidate.description.clone(),
    }
}

/// Persist all candidates, one insert each. Never aborts on a failed
/// insert; atomicity is per alert, not per batch.
pub async fn assemble_and_store(
    pool: &SqlitePool,
    records: &[ConnectionRecord],
    candidates: &[Candidate],
) -> AssemblyOutcome {
    let mut stored = 0usize;

    for candidate in candidates {
        let alert = build_alert(&records[candidate.record_index], candidate);
        match Alert::create(pool, alert).await {
            Ok(_) => stored += 1,
            Err(err) => {
                tracing::warn!(
                    "failed to store {} alert for {}: {}",
                    candidate.threat_type,
                    records[candidate.record_index].source_ip,
                    err
                );
            }
        }
    }

    AssemblyOutcome {
        alerts_generated: candidates.len(),
        alerts_stored: stored,
        summary: summarize(records, candidates),
    }
}

/// Per-run breakdown of what the rules found.
pub fn summarize(records: &[ConnectionRecord], candidates: &[Candidate]) -> RunSummary {
    let mut threat_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    let mut source_ips: HashSet<&str> = HashSet::new();

    for candidate in candidates {
        *threat_breakdown
            .entry(candidate.threat_type.as_str().to_string())
            .or_insert(0) += 1;
        source_ips.insert(records[candidate.record_index].source_ip.as_str());
    }

    RunSummary {
        total_alerts: candidates.len(),
        unique_source_ips: source_ips.len(),
        threat_breakdown,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{TimeZone, Utc};

    fn record(source_ip: &str, port: u16) -> ConnectionRecord {
        ConnectionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            source_ip: source_ip.to_string(),
            destination_ip: "10.0.0.2".to_string(),
            source_port: None,
            destination_port: port,
            protocol: "TCP".to_string(),
            packet_size: 500,
        }
    }

    fn candidate(index: usize, threat: ThreatType) -> Candidate {
        Candidate {
            record_index: index,
            threat_type: threat,
            description: format!("{} candidate", threat),
        }
    }

    #[test]
    fn port_is_null_for_non_port_rules() {
        let rec = record("10.0.0.5", 4444);

        let port_alert = build_alert(&rec, &candidate(0, ThreatType::SuspiciousPort));
        assert_eq!(port_alert.port, Some(4444));

        let size_alert = build_alert(&rec, &candidate(0, ThreatType::LargePacket));
        assert_eq!(size_alert.port, None);
    }

    #[tokio::test]
    async fn stores_every_candidate() {
        let pool = db::test_pool().await;
        let records = vec![record("10.0.0.5", 4444), record("10.0.0.6", 443)];
        let candidates = vec![
            candidate(0, ThreatType::SuspiciousPort),
            candidate(1, ThreatType::LargePacket),
        ];

        let outcome = assemble_and_store(&pool, &records, &candidates).await;
        assert_eq!(outcome.alerts_generated, 2);
        assert_eq!(outcome.alerts_stored, 2);
        assert_eq!(outcome.summary.unique_source_ips, 2);

        let stored = Alert::list_all(&pool).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn repeated_runs_do_not_deduplicate() {
        let pool = db::test_pool().await;
        let records = vec![record("10.0.0.5", 4444)];
        let candidates = vec![candidate(0, ThreatType::SuspiciousPort)];

        assemble_and_store(&pool, &records, &candidates).await;
        assemble_and_store(&pool, &records, &candidates).await;

        assert_eq!(Alert::list_all(&pool).await.unwrap().len(), 2);
    }

    #[test]
    fn summary_counts_by_threat_type() {
        let records = vec![record("10.0.0.5", 4444), record("10.0.0.5", 9999)];
        let candidates = vec![
            candidate(0, ThreatType::SuspiciousPort),
            candidate(1, ThreatType::SuspiciousPort),
            candidate(1, ThreatType::LargePacket),
        ];

        let summary = summarize(&records, &candidates);
        assert_eq!(summary.total_alerts, 3);
        assert_eq!(summary.unique_source_ips, 1);
        assert_eq!(summary.threat_breakdown["Suspicious Port"], 2);
        assert_eq!(summary.threat_breakdown["Large Packet"], 1);
    }
}
