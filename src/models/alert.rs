//! Alert model and persistence gateway
//!
//! The engine only touches the store through the operations here:
//! insert one alert, query recent alerts, list everything, bulk clear.
//! Atomicity is per-insert; there is no batch transaction.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use chrono::{DateTime, Utc};

// ============================================================================
// THREAT TAXONOMY
// ============================================================================

/// The fixed set of detections the rule engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatType {
    SuspiciousPort,
    HighFrequencyConnection,
    UnusualProtocol,
    LargePacket,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::SuspiciousPort => "Suspicious Port",
            ThreatType::HighFrequencyConnection => "High Frequency Connection",
            ThreatType::UnusualProtocol => "Unusual Protocol",
            ThreatType::LargePacket => "Large Packet",
        }
    }

    /// Severity is a fixed property of the threat type, never set per alert.
    pub fn severity(&self) -> Severity {
        match self {
            ThreatType::SuspiciousPort => Severity::High,
            ThreatType::HighFrequencyConnection => Severity::Critical,
            ThreatType::UnusualProtocol => Severity::Low,
            ThreatType::LargePacket => Severity::Medium,
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ALERT ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub port: Option<u16>,
    pub threat_type: String,
    pub severity: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Alert as produced by the assembler, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub port: Option<u16>,
    pub threat_type: ThreatType,
    pub description: String,
}

impl Alert {
    pub async fn create(pool: &SqlitePool, alert: NewAlert) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (timestamp, source_ip, port, threat_type, severity, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(alert.timestamp)
        .bind(&alert.source_ip)
        .bind(alert.port)
        .bind(alert.threat_type.as_str())
        .bind(alert.threat_type.severity().as_str())
        .bind(&alert.description)
        .fetch_one(pool)
        .await
    }

    /// All alerts, newest first
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await
    }

    /// Alerts whose event timestamp falls at or after `since`
    pub async fn recent(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Bulk clear. Returns the number of alerts deleted.
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alerts")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn sample(ts: DateTime<Utc>, threat: ThreatType) -> NewAlert {
        NewAlert {
            timestamp: ts,
            source_ip: "192.168.1.100".to_string(),
            port: Some(4444),
            threat_type: threat,
            description: "test alert".to_string(),
        }
    }

    #[test]
    fn severity_mapping_is_fixed() {
        assert_eq!(ThreatType::SuspiciousPort.severity(), Severity::High);
        assert_eq!(ThreatType::HighFrequencyConnection.severity(), Severity::Critical);
        assert_eq!(ThreatType::UnusualProtocol.severity(), Severity::Low);
        assert_eq!(ThreatType::LargePacket.severity(), Severity::Medium);
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_derived_severity() {
        let pool = db::test_pool().await;
        let now = Utc::now();

        let a = Alert::create(&pool, sample(now, ThreatType::SuspiciousPort)).await.unwrap();
        let b = Alert::create(&pool, sample(now, ThreatType::LargePacket)).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(a.severity, "high");
        assert_eq!(b.severity, "medium");
        assert_eq!(a.threat_type, "Suspicious Port");
    }

    #[tokio::test]
    async fn recent_filters_by_event_timestamp() {
        let pool = db::test_pool().await;
        let now = Utc::now();

        Alert::create(&pool, sample(now - chrono::Duration::hours(30), ThreatType::UnusualProtocol))
            .await
            .unwrap();
        Alert::create(&pool, sample(now - chrono::Duration::hours(1), ThreatType::UnusualProtocol))
            .await
            .unwrap();

        let recent = Alert::recent(&pool, now - chrono::Duration::hours(24)).await.unwrap();
        assert_eq!(recent.len(), 1);

        let all = Alert::list_all(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn delete_all_reports_count() {
        let pool = db::test_pool().await;
        let now = Utc::now();

        for _ in 0..3 {
            Alert::create(&pool, sample(now, ThreatType::LargePacket)).await.unwrap();
        }

        assert_eq!(Alert::delete_all(&pool).await.unwrap(), 3);
        assert!(Alert::list_all(&pool).await.unwrap().is_empty());
    }
}
