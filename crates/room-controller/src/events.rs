//! Wire events exchanged with clients.
//!
//! The gateway decodes inbound frames into [`ClientEvent`] and encodes
//! [`ServerEvent`] back out. Both enums are externally tagged with a `type`
//! field in `snake_case`, mirroring the JSON envelope the clients speak.
//!
//! Signaling payloads (offers, answers, ICE candidates) and face descriptors
//! are opaque JSON values: the controller relays and stores them without
//! looking inside.

use crate::attendance::{AttendanceReport, ParticipantSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events received from a client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a meeting room, creating it if this is the first arrival.
    Join {
        room_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
        /// Client-side belief that it created the meeting. Logged only;
        /// ownership is decided by join order, never by this flag.
        #[serde(default)]
        owner_hint: bool,
    },

    /// Relay an opaque signaling payload to one other connection.
    Signal { to: String, payload: Value },

    /// Post a chat message to the sender's current room.
    Chat { sender: String, body: String },

    /// Bind a stable identity to this connection and store its face
    /// descriptor for the meeting.
    RegisterFace {
        room_id: String,
        user_id: String,
        descriptor: Value,
    },

    /// Periodic presence sample from the client's verification loop.
    PresenceSample {
        room_id: String,
        user_id: String,
        #[serde(default)]
        display_name: Option<String>,
        verified_delta_seconds: u64,
    },

    /// End the meeting and produce the attendance report.
    EndMeeting { room_id: String },
}

/// Events pushed to a client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once to the participant whose join claimed meeting ownership.
    YouAreOwner,

    /// A participant arrived; carries the newcomer's connection id and the
    /// full membership (in join order) so every pair can set up peering.
    ParticipantArrived {
        connection_id: String,
        members: Vec<String>,
    },

    /// A participant left the room.
    ParticipantLeft { connection_id: String },

    /// Relayed signaling payload, tagged with the sender's connection id.
    Signal { from: String, payload: Value },

    /// Chat message (also echoed back to its sender).
    Chat {
        sender: String,
        body: String,
        origin_connection_id: String,
    },

    /// Acknowledges a successful face registration.
    FaceRegistered,

    /// Live counter snapshot, pushed to the owner after each sample.
    LiveAttendance {
        participants: Vec<ParticipantSnapshot>,
    },

    /// Final attendance report, broadcast to every participant.
    AttendanceReport { report: AttendanceReport },

    /// Final attendance report with the owner-only annotation.
    OwnerAttendanceReport {
        report: AttendanceReport,
        message: String,
    },
}
