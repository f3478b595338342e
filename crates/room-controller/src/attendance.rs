//! Attendance computation.
//!
//! Turns per-participant presence counters into the final classified report.
//! All functions here are pure; the `RoomActor` owns the counters and calls
//! into this module when a meeting ends.
//!
//! Classification thresholds (percent of verified presence time):
//!
//! | Status  | Range        |
//! |---------|--------------|
//! | Present | >= 75        |
//! | Partial | >= 50, < 75  |
//! | Absent  | < 50         |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Threshold (percent) at or above which a participant counts as present.
pub const PRESENT_THRESHOLD_PERCENT: u8 = 75;

/// Threshold (percent) at or above which a participant counts as partial.
pub const PARTIAL_THRESHOLD_PERCENT: u8 = 50;

/// Final classification of one participant's attendance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Partial,
    Absent,
}

impl AttendanceStatus {
    /// Returns the status as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Partial => "Partial",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

/// Live per-participant counter snapshot, pushed to the owner after each
/// presence sample and embedded in the final report computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    /// Stable user identity, absent until face enrollment completes.
    pub user_id: Option<String>,
    /// Display name as last reported by the client.
    pub display_name: String,
    /// Accrued meeting time in seconds (fixed-interval accrual).
    pub total_time_seconds: u64,
    /// Accrued face-verified time in seconds.
    pub verified_time_seconds: u64,
}

/// One participant's row in the final attendance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub user_id: String,
    pub name: String,
    pub total_time_seconds: u64,
    pub verified_time_seconds: u64,
    pub verified_percent: u8,
    pub status: AttendanceStatus,
}

/// Final attendance report for one meeting.
///
/// Computed exactly once at meeting end, immutable afterwards. Handed to the
/// persistence sink and broadcast to every current participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub meeting_id: String,
    pub owner_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub participants: Vec<ParticipantReport>,
}

/// Compute the verified-presence percentage for one participant.
///
/// Returns 0 when no total time was accrued. Out-of-order or duplicate
/// samples can push verified time past total time; the result is clamped to
/// 100 rather than rejected.
#[must_use]
pub fn verified_percent(total_time_seconds: u64, verified_time_seconds: u64) -> u8 {
    if total_time_seconds == 0 {
        return 0;
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = verified_time_seconds as f64 / total_time_seconds as f64;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (ratio * 100.0).round() as u64;

    percent.min(100) as u8
}

/// Classify a verified-presence percentage into an attendance status.
#[must_use]
pub fn classify(percent: u8) -> AttendanceStatus {
    if percent >= PRESENT_THRESHOLD_PERCENT {
        AttendanceStatus::Present
    } else if percent >= PARTIAL_THRESHOLD_PERCENT {
        AttendanceStatus::Partial
    } else {
        AttendanceStatus::Absent
    }
}

/// Build one report row from a participant's counter snapshot.
///
/// Participants who never enrolled keep the original report's fallbacks:
/// `"Unknown"` for both identity and name.
#[must_use]
pub fn report_row(snapshot: &ParticipantSnapshot) -> ParticipantReport {
    let percent = verified_percent(snapshot.total_time_seconds, snapshot.verified_time_seconds);

    let user_id = snapshot
        .user_id
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    let name = if snapshot.display_name.is_empty() {
        user_id.clone()
    } else {
        snapshot.display_name.clone()
    };

    ParticipantReport {
        user_id,
        name,
        total_time_seconds: snapshot.total_time_seconds,
        verified_time_seconds: snapshot.verified_time_seconds,
        verified_percent: percent,
        status: classify(percent),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn snapshot(total: u64, verified: u64) -> ParticipantSnapshot {
        ParticipantSnapshot {
            user_id: Some("u1".to_string()),
            display_name: "Alice".to_string(),
            total_time_seconds: total,
            verified_time_seconds: verified,
        }
    }

    #[test]
    fn test_percent_zero_total_is_zero() {
        assert_eq!(verified_percent(0, 0), 0);
        assert_eq!(verified_percent(0, 50), 0);
    }

    #[test]
    fn test_percent_rounds() {
        assert_eq!(verified_percent(100, 75), 75);
        assert_eq!(verified_percent(3, 1), 33);
        assert_eq!(verified_percent(3, 2), 67);
    }

    #[test]
    fn test_percent_clamped_at_100() {
        // Duplicate samples can report more verified time than total time.
        assert_eq!(verified_percent(100, 130), 100);
    }

    #[test]
    fn test_classification_boundaries() {
        // The boundary cases from the attendance requirements.
        let row = report_row(&snapshot(100, 75));
        assert_eq!(row.verified_percent, 75);
        assert_eq!(row.status, AttendanceStatus::Present);

        let row = report_row(&snapshot(100, 50));
        assert_eq!(row.verified_percent, 50);
        assert_eq!(row.status, AttendanceStatus::Partial);

        let row = report_row(&snapshot(100, 49));
        assert_eq!(row.verified_percent, 49);
        assert_eq!(row.status, AttendanceStatus::Absent);

        let row = report_row(&snapshot(0, 0));
        assert_eq!(row.verified_percent, 0);
        assert_eq!(row.status, AttendanceStatus::Absent);
    }

    #[test]
    fn test_report_row_fallbacks_for_unenrolled() {
        let row = report_row(&ParticipantSnapshot {
            user_id: None,
            display_name: String::new(),
            total_time_seconds: 10,
            verified_time_seconds: 10,
        });
        assert_eq!(row.user_id, "Unknown");
        assert_eq!(row.name, "Unknown");
    }

    #[test]
    fn test_report_row_keeps_display_name() {
        let row = report_row(&snapshot(20, 10));
        assert_eq!(row.name, "Alice");
        assert_eq!(row.user_id, "u1");
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(AttendanceStatus::Present.as_str(), "Present");
        assert_eq!(AttendanceStatus::Partial.as_str(), "Partial");
        assert_eq!(AttendanceStatus::Absent.as_str(), "Absent");
    }

    #[test]
    fn test_report_serialization_round_trip() {
        let report = AttendanceReport {
            meeting_id: "m1".to_string(),
            owner_id: "u1".to_string(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            participants: vec![report_row(&snapshot(100, 80))],
        };

        let json = serde_json::to_string(&report).unwrap();
        let back: AttendanceReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
