//! Recording persistence sink.
//!
//! Implements [`PersistenceSink`] by recording every call, so tests can
//! assert on what the core handed to storage. A failure flag makes every
//! subsequent write fail, for exercising the best-effort error paths.

use async_trait::async_trait;
use room_controller::attendance::AttendanceReport;
use room_controller::persistence::{PersistenceSink, SinkError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded sink invocation.
#[derive(Debug, Clone)]
pub enum SinkCall {
    SaveDescriptor {
        user_id: String,
        room_id: String,
        descriptor: Value,
    },
    DeleteDescriptors {
        room_id: String,
    },
    SaveReport {
        report: AttendanceReport,
    },
}

/// Persistence sink that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: AtomicBool,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("sink mutex poisoned").clone()
    }

    /// Recorded reports, in order.
    pub fn reports(&self) -> Vec<AttendanceReport> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::SaveReport { report } => Some(report),
                _ => None,
            })
            .collect()
    }

    /// Recorded descriptor saves for a room.
    pub fn descriptor_saves(&self, room_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(
                |call| matches!(call, SinkCall::SaveDescriptor { room_id: r, .. } if r == room_id),
            )
            .count()
    }

    /// Whether descriptors for a room were deleted.
    pub fn descriptors_deleted(&self, room_id: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, SinkCall::DeleteDescriptors { room_id: r } if r == room_id))
    }

    fn record(&self, call: SinkCall) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError("injected failure".to_string()));
        }
        self.calls.lock().expect("sink mutex poisoned").push(call);
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn save_descriptor(
        &self,
        user_id: &str,
        room_id: &str,
        descriptor: &Value,
    ) -> Result<(), SinkError> {
        self.record(SinkCall::SaveDescriptor {
            user_id: user_id.to_string(),
            room_id: room_id.to_string(),
            descriptor: descriptor.clone(),
        })
    }

    async fn delete_descriptors(&self, room_id: &str) -> Result<(), SinkError> {
        self.record(SinkCall::DeleteDescriptors {
            room_id: room_id.to_string(),
        })
    }

    async fn save_report(&self, report: &AttendanceReport) -> Result<(), SinkError> {
        self.record(SinkCall::SaveReport {
            report: report.clone(),
        })
    }
}
