//! Record validator
//!
//! Turns a `RawBatch` into typed `ConnectionRecord`s. The column layout is
//! checked once for the whole batch (wrong shape rejects the upload before
//! any row is parsed); individual rows that fail to parse are skipped and
//! tallied, since log sources are commonly noisy and partial results beat
//! total failure.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{EngineError, MalformedRecord};
use super::record::{ConnectionRecord, RawBatch};

/// Timestamp format used by the log sources ("2024-01-15 10:23:45", UTC).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The validated half of a batch plus the tally of rows that were not.
#[derive(Debug)]
pub struct ValidatedBatch {
    pub records: Vec<ConnectionRecord>,
    pub rows_skipped: usize,
}

/// Column indexes resolved against the batch header, case-insensitively.
#[derive(Debug)]
struct ColumnLayout {
    timestamp: usize,
    source_ip: usize,
    destination_ip: usize,
    source_port: Option<usize>,
    destination_port: usize,
    protocol: usize,
    packet_size: usize,
}

impl ColumnLayout {
    /// Resolve required columns. The destination port column may be named
    /// either `destination_port` or plain `port`; `source_port` is optional.
    fn resolve(headers: &[String]) -> Result<Self, EngineError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_ascii_lowercase(), i))
            .collect();

        let mut missing = Vec::new();
        let mut require = |name: &str| -> usize {
            match index.get(name) {
                Some(&i) => i,
                None => {
                    missing.push(name.to_string());
                    usize::MAX
                }
            }
        };

        let timestamp = require("timestamp");
        let source_ip = require("source_ip");
        let destination_ip = require("destination_ip");
        let protocol = require("protocol");
        let packet_size = require("packet_size");

        let destination_port = match index
            .get("destination_port")
            .or_else(|| index.get("port"))
        {
            Some(&i) => i,
            None => {
                missing.push("port".to_string());
                usize::MAX
            }
        };

        if !missing.is_empty() {
            return Err(EngineError::Schema { missing });
        }

        Ok(Self {
            timestamp,
            source_ip,
            destination_ip,
            source_port: index.get("source_port").copied(),
            destination_port,
            protocol,
            packet_size,
        })
    }
}

/// Validate a whole batch. Fails only on a schema mismatch; per-row parse
/// failures are skipped and counted.
///
/// Invariant: `rows_skipped + records.len()` equals the input row count.
pub fn validate_batch(batch: &RawBatch) -> Result<ValidatedBatch, EngineError> {
    let layout = ColumnLayout::resolve(&batch.headers)?;

    let mut records = Vec::with_capacity(batch.rows.len());
    let mut rows_skipped = 0usize;

    for (row_index, row) in batch.rows.iter().enumerate() {
        match parse_row(&layout, row_index, row) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::debug!("skipping malformed row: {}", err);
                rows_skipped += 1;
            }
        }
    }

    tracing::info!(
        "validated {} of {} rows ({} skipped)",
        records.len(),
        batch.rows.len(),
        rows_skipped
    );

    Ok(ValidatedBatch { records, rows_skipped })
}

fn parse_row(
    layout: &ColumnLayout,
    row_index: usize,
    row: &[String],
) -> Result<ConnectionRecord, MalformedRecord> {
    let cell = |index: usize, field: &'static str| -> Result<&str, MalformedRecord> {
        row.get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| MalformedRecord::new(row_index, field, "missing value"))
    };

    let timestamp = parse_timestamp(cell(layout.timestamp, "timestamp")?)
        .map_err(|reason| MalformedRecord::new(row_index, "timestamp", reason))?;

    let source_ip = parse_ipv4(cell(layout.source_ip, "source_ip")?)
        .map_err(|reason| MalformedRecord::new(row_index, "source_ip", reason))?;

    let destination_ip = parse_ipv4(cell(layout.destination_ip, "destination_ip")?)
        .map_err(|reason| MalformedRecord::new(row_index, "destination_ip", reason))?;

    let destination_port = parse_port(cell(layout.destination_port, "port")?)
        .map_err(|reason| MalformedRecord::new(row_index, "port", reason))?;

    let source_port = match layout.source_port {
        Some(index) => Some(
            parse_port(cell(index, "source_port")?)
                .map_err(|reason| MalformedRecord::new(row_index, "source_port", reason))?,
        ),
        None => None,
    };

    let protocol = cell(layout.protocol, "protocol")?.to_string();

    let packet_size = cell(layout.packet_size, "packet_size")?
        .parse::<u64>()
        .map_err(|_| {
            MalformedRecord::new(row_index, "packet_size", "not a non-negative integer")
        })?;

    Ok(ConnectionRecord {
        timestamp,
        source_ip,
        destination_ip,
        source_port,
        destination_port,
        protocol,
        packet_size,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    Err(format!("unparseable timestamp '{}'", value))
}

/// Dotted-quad only; the record keeps the original string form.
fn parse_ipv4(value: &str) -> Result<String, String> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| value.to_string())
        .map_err(|_| format!("'{}' is not a dotted-quad IPv4 address", value))
}

fn parse_port(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| format!("'{}' is not a port in 0-65535", value))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(headers: &[&str], rows: &[&[&str]]) -> RawBatch {
        RawBatch {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    const HEADERS: &[&str] = &[
        "timestamp", "source_ip", "destination_ip", "port", "protocol", "packet_size",
    ];

    #[test]
    fn missing_columns_reject_the_whole_batch() {
        let batch = batch(
            &["timestamp", "source_ip"],
            &[&["2024-01-15 10:00:00", "10.0.0.1"]],
        );

        match validate_batch(&batch) {
            Err(EngineError::Schema { missing }) => {
                assert!(missing.contains(&"destination_ip".to_string()));
                assert!(missing.contains(&"protocol".to_string()));
                assert!(missing.contains(&"packet_size".to_string()));
                assert!(missing.contains(&"port".to_string()));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn headers_match_case_insensitively() {
        let batch = batch(
            &["Timestamp", "Source_IP", "Destination_IP", "Port", "Protocol", "Packet_Size"],
            &[&["2024-01-15 10:00:00", "10.0.0.1", "10.0.0.2", "443", "TCP", "512"]],
        );

        let validated = validate_batch(&batch).unwrap();
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.rows_skipped, 0);
    }

    #[test]
    fn valid_row_round_trips() {
        let batch = batch(
            HEADERS,
            &[&["2024-01-15 10:00:00", "192.168.1.5", "8.8.8.8", "4444", "TCP", "1500"]],
        );

        let validated = validate_batch(&batch).unwrap();
        let record = &validated.records[0];
        assert_eq!(record.source_ip, "192.168.1.5");
        assert_eq!(record.destination_ip, "8.8.8.8");
        assert_eq!(record.destination_port, 4444);
        assert_eq!(record.source_port, None);
        assert_eq!(record.protocol, "TCP");
        assert_eq!(record.packet_size, 1500);
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn destination_port_column_name_is_accepted() {
        let batch = batch(
            &["timestamp", "source_ip", "destination_ip", "source_port", "destination_port", "protocol", "packet_size"],
            &[&["2024-01-15 10:00:00", "10.0.0.1", "10.0.0.2", "51234", "22", "SSH", "128"]],
        );

        let validated = validate_batch(&batch).unwrap();
        assert_eq!(validated.records[0].source_port, Some(51234));
        assert_eq!(validated.records[0].destination_port, 22);
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let batch = batch(
            HEADERS,
            &[
                &["2024-01-15 10:00:00", "10.0.0.1", "10.0.0.2", "443", "TCP", "512"],
                &["not-a-date", "10.0.0.1", "10.0.0.2", "443", "TCP", "512"],
                &["2024-01-15 10:00:02", "300.0.0.1", "10.0.0.2", "443", "TCP", "512"],
                &["2024-01-15 10:00:03", "10.0.0.1", "10.0.0.2", "70000", "TCP", "512"],
                &["2024-01-15 10:00:04", "10.0.0.1", "10.0.0.2", "443", "TCP", "-5"],
                &["2024-01-15 10:00:05", "10.0.0.1"],
            ],
        );

        let validated = validate_batch(&batch).unwrap();
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.rows_skipped, 5);
        // No row is both skipped and counted.
        assert_eq!(validated.records.len() + validated.rows_skipped, 6);
    }

    #[test]
    fn rfc3339_timestamps_parse() {
        let batch = batch(
            HEADERS,
            &[&["2024-01-15T10:00:00+02:00", "10.0.0.1", "10.0.0.2", "80", "HTTP", "256"]],
        );

        let validated = validate_batch(&batch).unwrap();
        assert_eq!(
            validated.records[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
        );
    }
}
