//! Shared types for awslogcheck
//!
//! This crate contains data structures used across multiple awslogcheck crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 60 * 60 * 1000;

// ============================================================================
// Provider Types
// ============================================================================

/// One log record as delivered by CloudWatch Logs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Event time in epoch milliseconds
    pub timestamp: i64,

    /// Owning log stream
    pub stream_name: String,

    /// JSON-encoded [`LogEnvelope`]
    pub message: String,
}

impl RawEvent {
    pub fn new(timestamp: i64, stream_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            stream_name: stream_name.into(),
            message: message.into(),
        }
    }

    /// Decode the payload into the fluent-bit/kubernetes envelope
    pub fn decode(&self) -> Result<LogEnvelope, serde_json::Error> {
        serde_json::from_str(&self.message)
    }
}

/// One page of a log group listing
#[derive(Clone, Debug, Default)]
pub struct LogGroupPage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}

/// One page of a filtered event query
#[derive(Clone, Debug, Default)]
pub struct EventPage {
    pub events: Vec<RawEvent>,
    pub next_token: Option<String>,
}

// ============================================================================
// Log Envelope
// ============================================================================

/// Log line as shipped by fluent-bit from a kubernetes node
///
/// Unknown fields are ignored. A missing `kubernetes` object yields an
/// empty identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEnvelope {
    #[serde(default)]
    pub log: String,

    #[serde(default)]
    pub kubernetes: KubernetesMeta,
}

/// Kubernetes metadata attached by the log shipper
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesMeta {
    #[serde(default)]
    pub pod_name: String,

    #[serde(default)]
    pub container_image: String,

    #[serde(default)]
    pub container_name: String,

    #[serde(default)]
    pub namespace_name: String,
}

impl KubernetesMeta {
    /// The identity shown in a stream's report header
    pub fn identity(&self) -> ContainerIdentity {
        ContainerIdentity {
            pod_name: self.pod_name.clone(),
            container_image: self.container_image.clone(),
            container_name: self.container_name.clone(),
        }
    }
}

/// Container that produced a stream's first reported line
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContainerIdentity {
    pub pod_name: String,
    pub container_image: String,
    pub container_name: String,
}

// ============================================================================
// Report Types
// ============================================================================

/// A log line accepted for the report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// Event time in epoch milliseconds
    pub timestamp: i64,

    /// The `log` field of the envelope
    pub message: String,
}

impl LogLine {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Event time as a UTC datetime, if representable
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Half-open scan window `[start_ms, end_ms)` in epoch milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// The full clock hour before the one containing `now`
    pub fn previous_hour(now: DateTime<Utc>) -> Self {
        let current_hour = now.timestamp_millis().div_euclid(HOUR_MS) * HOUR_MS;
        Self {
            start_ms: current_hour - HOUR_MS,
            end_ms: current_hour,
        }
    }

    /// The last full clock hour according to the wall clock
    pub fn last_full_hour() -> Self {
        Self::previous_hour(Utc::now())
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_ms)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_ms)
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        (self.start_ms..self.end_ms).contains(&timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_full_envelope() {
        let event = RawEvent::new(
            1,
            "stream",
            r#"{"log":"boom","stream":"stderr","kubernetes":{"pod_name":"api-0","container_image":"api:1.2","container_name":"api","namespace_name":"prod","labels":{"app":"api"}}}"#,
        );
        let envelope = event.decode().unwrap();
        assert_eq!(envelope.log, "boom");
        assert_eq!(envelope.kubernetes.container_name, "api");
        assert_eq!(envelope.kubernetes.namespace_name, "prod");
    }

    #[test]
    fn test_decode_without_kubernetes() {
        let event = RawEvent::new(1, "stream", r#"{"log":"plain"}"#);
        let envelope = event.decode().unwrap();
        assert_eq!(envelope.kubernetes.identity(), ContainerIdentity::default());
    }

    #[test]
    fn test_decode_malformed() {
        let event = RawEvent::new(1, "stream", "not json at all");
        assert!(event.decode().is_err());
    }

    #[test]
    fn test_previous_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 14, 37, 12).unwrap();
        let window = TimeWindow::previous_hour(now);
        assert_eq!(
            window.start(),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 13, 0, 0).unwrap())
        );
        assert_eq!(
            window.end(),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap())
        );
        assert_eq!(window.end_ms - window.start_ms, HOUR_MS);
    }

    #[test]
    fn test_previous_hour_on_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::previous_hour(now);
        assert_eq!(
            window.start(),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap())
        );
        assert!(window.contains(window.start_ms));
        assert!(!window.contains(window.end_ms));
    }
}
