//! Rule evaluators
//!
//! Four independent detectors run against the full validated batch. Three
//! are stateless filters; the high-frequency rule leans on the
//! `FrequencyTracker`. Allow-lists and thresholds live in `RuleSet` so
//! tests can override them instead of chasing literals through the rules.

use std::collections::{HashSet, HashMap};

use crate::models::ThreatType;
use super::frequency::{FrequencyTracker, DEFAULT_BURST_THRESHOLD, WINDOW_SECONDS};
use super::record::ConnectionRecord;

// ============================================================================
// RULE CONFIGURATION
// ============================================================================

/// Destination ports that never raise a Suspicious Port alert (SSH, HTTP, HTTPS).
const ALLOWED_PORTS: &[u16] = &[22, 80, 443];

/// Protocol tokens considered ordinary, compared case-insensitively.
const ALLOWED_PROTOCOLS: &[&str] = &["TCP", "UDP", "HTTP", "HTTPS", "SSH"];

/// Packets above this many bytes raise a Large Packet alert.
const LARGE_PACKET_BYTES: u64 = 65536;

/// Thresholds and allow-lists for one evaluation run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub allowed_ports: HashSet<u16>,
    /// Stored upper-cased; membership checks upper-case the input.
    pub allowed_protocols: HashSet<String>,
    pub burst_threshold: usize,
    pub burst_window_seconds: i64,
    pub large_packet_bytes: u64,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            allowed_ports: ALLOWED_PORTS.iter().copied().collect(),
            allowed_protocols: ALLOWED_PROTOCOLS.iter().map(|p| p.to_string()).collect(),
            burst_threshold: DEFAULT_BURST_THRESHOLD,
            burst_window_seconds: WINDOW_SECONDS,
            large_packet_bytes: LARGE_PACKET_BYTES,
        }
    }
}

// ============================================================================
// CANDIDATES
// ============================================================================

/// A provisional detection: a record index plus what was detected. Severity
/// assignment and persistence happen later in the assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record_index: usize,
    pub threat_type: ThreatType,
    pub description: String,
}

/// Run all four rules over the batch. Candidates from each rule come out in
/// input order of the triggering record; a record may appear once per rule
/// it trips.
pub fn evaluate(records: &[ConnectionRecord], rules: &RuleSet) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    candidates.extend(suspicious_ports(records, rules));
    candidates.extend(high_frequency_connections(records, rules));
    candidates.extend(unusual_protocols(records, rules));
    candidates.extend(large_packets(records, rules));

    tracing::info!("rule evaluation produced {} candidates", candidates.len());
    candidates
}

// ============================================================================
// RULE 1: SUSPICIOUS PORT
// ============================================================================

/// Connections to destination ports outside the allow-set.
fn suspicious_ports(records: &[ConnectionRecord], rules: &RuleSet) -> Vec<Candidate> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| !rules.allowed_ports.contains(&r.destination_port))
        .map(|(index, r)| Candidate {
            record_index: index,
            threat_type: ThreatType::SuspiciousPort,
            description: format!(
                "Connection to non-standard port {} detected from {}",
                r.destination_port, r.source_ip
            ),
        })
        .collect()
}

// ============================================================================
// RULE 2: HIGH FREQUENCY CONNECTION
// ============================================================================

/// More than `burst_threshold` connections from one source inside any
/// sliding window. One candidate per qualifying window that still contains
/// an unflagged record, so a single burst reports once however many
/// overlapping windows it qualifies.
fn high_frequency_connections(records: &[ConnectionRecord], rules: &RuleSet) -> Vec<Candidate> {
    let mut tracker = FrequencyTracker::new(rules.burst_window_seconds, rules.burst_threshold);
    for (index, record) in records.iter().enumerate() {
        tracker.register(&record.source_ip, record.timestamp, index);
    }

    let mut candidates = Vec::new();
    let mut flagged: HashMap<&str, HashSet<usize>> = HashMap::new();

    for source_ip in tracker.source_ips() {
        let seen = flagged.entry(source_ip).or_default();
        for window in tracker.burst_windows(source_ip) {
            if window.members.iter().all(|m| seen.contains(m)) {
                continue;
            }
            let anchor = window.members[0];
            candidates.push(Candidate {
                record_index: anchor,
                threat_type: ThreatType::HighFrequencyConnection,
                description: format!(
                    "IP {} made {} connections in {} seconds (threshold: {})",
                    source_ip,
                    window.members.len(),
                    rules.burst_window_seconds,
                    rules.burst_threshold
                ),
            });
            seen.extend(window.members.iter().copied());
        }
    }

    candidates.sort_by_key(|c| c.record_index);
    candidates
}

// ============================================================================
// RULE 3: UNUSUAL PROTOCOL
// ============================================================================

/// Protocol tokens outside the allow-set, case-insensitively.
fn unusual_protocols(records: &[ConnectionRecord], rules: &RuleSet) -> Vec<Candidate> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| !rules.allowed_protocols.contains(&r.protocol.to_ascii_uppercase()))
        .map(|(index, r)| Candidate {
            record_index: index,
            threat_type: ThreatType::UnusualProtocol,
            description: format!(
                "Unusual protocol '{}' detected from {}",
                r.protocol, r.source_ip
            ),
        })
        .collect()
}

// ============================================================================
// RULE 4: LARGE PACKET
// ============================================================================

/// Packets larger than the configured byte threshold.
fn large_packets(records: &[ConnectionRecord], rules: &RuleSet) -> Vec<Candidate> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.packet_size > rules.large_packet_bytes)
        .map(|(index, r)| Candidate {
            record_index: index,
            threat_type: ThreatType::LargePacket,
            description: format!(
                "Large packet ({} bytes) detected from {} (threshold: {})",
                r.packet_size, r.source_ip, rules.large_packet_bytes
            ),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
