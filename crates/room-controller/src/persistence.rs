//! Persistence sink boundary.
//!
//! Durable storage of face descriptors and attendance reports lives outside
//! this service; the core only talks to it through [`PersistenceSink`]. All
//! writes are best-effort: a failed save is logged by the caller and never
//! blocks the in-memory broadcasts that follow it.

use crate::attendance::AttendanceReport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Error returned by a persistence sink operation.
#[derive(Debug, Error)]
#[error("persistence sink error: {0}")]
pub struct SinkError(pub String);

/// External persistence collaborator.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store a face descriptor keyed by `(user_id, room_id)`. Re-registration
    /// overwrites the previous descriptor for the same key.
    async fn save_descriptor(
        &self,
        user_id: &str,
        room_id: &str,
        descriptor: &Value,
    ) -> Result<(), SinkError>;

    /// Delete every descriptor stored for a meeting.
    async fn delete_descriptors(&self, room_id: &str) -> Result<(), SinkError>;

    /// Persist a final attendance report.
    async fn save_report(&self, report: &AttendanceReport) -> Result<(), SinkError>;
}

/// In-process sink used when no external store is wired up.
///
/// Keeps descriptors and reports in memory for the lifetime of the process,
/// which matches the coordination core's own lifetime guarantees.
#[derive(Default)]
pub struct MemorySink {
    descriptors: Mutex<HashMap<(String, String), Value>>,
    reports: Mutex<Vec<AttendanceReport>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of descriptors currently stored for a meeting.
    pub async fn descriptor_count(&self, room_id: &str) -> usize {
        self.descriptors
            .lock()
            .await
            .keys()
            .filter(|(_, r)| r == room_id)
            .count()
    }

    /// Saved reports, oldest first.
    pub async fn reports(&self) -> Vec<AttendanceReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn save_descriptor(
        &self,
        user_id: &str,
        room_id: &str,
        descriptor: &Value,
    ) -> Result<(), SinkError> {
        self.descriptors.lock().await.insert(
            (user_id.to_string(), room_id.to_string()),
            descriptor.clone(),
        );
        Ok(())
    }

    async fn delete_descriptors(&self, room_id: &str) -> Result<(), SinkError> {
        self.descriptors
            .lock()
            .await
            .retain(|(_, r), _| r != room_id);
        Ok(())
    }

    async fn save_report(&self, report: &AttendanceReport) -> Result<(), SinkError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_descriptor_overwrite_and_delete() {
        let sink = MemorySink::new();

        sink.save_descriptor("u1", "r1", &json!([0.1, 0.2]))
            .await
            .unwrap();
        sink.save_descriptor("u1", "r1", &json!([0.3, 0.4]))
            .await
            .unwrap();
        sink.save_descriptor("u2", "r1", &json!([0.5]))
            .await
            .unwrap();
        sink.save_descriptor("u1", "r2", &json!([0.6]))
            .await
            .unwrap();

        // Same key overwrites instead of duplicating.
        assert_eq!(sink.descriptor_count("r1").await, 2);

        sink.delete_descriptors("r1").await.unwrap();
        assert_eq!(sink.descriptor_count("r1").await, 0);
        // Other meetings are untouched.
        assert_eq!(sink.descriptor_count("r2").await, 1);
    }

    #[tokio::test]
    async fn test_reports_accumulate_in_order() {
        let sink = MemorySink::new();

        for meeting_id in ["m1", "m2"] {
            sink.save_report(&AttendanceReport {
                meeting_id: meeting_id.to_string(),
                owner_id: "u1".to_string(),
                started_at: Utc::now(),
                ended_at: Utc::now(),
                participants: vec![],
            })
            .await
            .unwrap();
        }

        let reports = sink.reports().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports.first().map(|r| r.meeting_id.as_str()),
            Some("m1")
        );
    }
}
