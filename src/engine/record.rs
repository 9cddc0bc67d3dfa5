//! Connection log records
//!
//! `RawBatch` is the untyped in-memory table handed over by the upload
//! boundary; `ConnectionRecord` is a row that survived validation. Raw
//! rows never travel past the validator.

use std::io::Read;

use chrono::{DateTime, Utc};

/// One uploaded log file, parsed into headers and raw string cells.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    /// Parse CSV bytes into a raw table. Ragged rows are tolerated here;
    /// the validator decides what to do with short rows.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }
}

/// One validated network connection event.
///
/// Immutable once built; owned by the batch that produced it and dropped
/// when the batch's evaluation completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub destination_ip: String,
    /// Present only when the upload carries a `source_port` column.
    pub source_port: Option<u16>,
    pub destination_port: u16,
    pub protocol: String,
    pub packet_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_with_headers() {
        let data = "timestamp,source_ip,destination_ip,port,protocol,packet_size\n\
                    2024-01-15 10:00:00,10.0.0.1,10.0.0.2,443,TCP,512\n";
        let batch = RawBatch::from_csv(data.as_bytes()).unwrap();

        assert_eq!(batch.headers[0], "timestamp");
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0][3], "443");
    }

    #[test]
    fn tolerates_ragged_rows() {
        let data = "timestamp,source_ip,destination_ip,port,protocol,packet_size\n\
                    2024-01-15 10:00:00,10.0.0.1\n";
        let batch = RawBatch::from_csv(data.as_bytes()).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].len(), 2);
    }
}
