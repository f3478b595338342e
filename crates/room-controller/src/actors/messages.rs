//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply uses `tokio::sync::oneshot`. Events
//! that expect no answer (chat, samples, teardown) are fire-and-forget so a
//! slow room can never stall the directory on a reply.

use crate::attendance::ParticipantSnapshot;
use crate::errors::RcError;
use crate::events::ServerEvent;

use super::connection::ConnectionActorHandle;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

/// Messages sent to the `RoomDirectoryActor`.
#[derive(Debug)]
pub enum DirectoryMessage {
    /// A connection joins a room, creating the room if absent.
    Join {
        room_id: String,
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        /// Client-supplied ownership hint; logged, never trusted.
        owner_hint: bool,
        /// Answered by the room actor, not the directory.
        respond_to: oneshot::Sender<Result<JoinSummary, RcError>>,
    },

    /// A chat message from a connection; the directory resolves the room
    /// through the reverse index.
    Chat {
        connection_id: String,
        sender: String,
        body: String,
    },

    /// Bind an identity and store a face descriptor.
    RegisterFace {
        connection_id: String,
        room_id: String,
        user_id: String,
        descriptor: Value,
    },

    /// Periodic presence sample for a participant.
    PresenceSample {
        room_id: String,
        user_id: String,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    },

    /// End the meeting and produce the attendance report.
    EndMeeting { room_id: String },

    /// A connection closed; remove it from its room, deleting the room if it
    /// empties.
    ConnectionClosed { connection_id: String },

    /// Get current directory status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<DirectoryStatus>,
    },
}

/// Messages sent to a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// A new participant joins this room.
    Join {
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<JoinSummary, RcError>>,
    },

    /// A participant's connection closed; remove it and notify survivors.
    Leave { connection_id: String },

    /// Append a chat message and broadcast it to every member.
    Chat {
        origin_connection_id: String,
        sender: String,
        body: String,
    },

    /// Bind a stable identity to the participant behind a connection and
    /// persist its face descriptor.
    RegisterFace {
        connection_id: String,
        user_id: String,
        descriptor: Value,
    },

    /// Accrue presence counters for a participant, looked up by user id.
    PresenceSample {
        user_id: String,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    },

    /// End the meeting: compute, persist and broadcast the report.
    Finalize,

    /// Get a snapshot of room state (for debugging/tests).
    GetSnapshot {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },
}

/// Messages sent to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Push an event to the connected client.
    Deliver { event: ServerEvent },

    /// Close the connection gracefully.
    Close { reason: String },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinSummary {
    /// Whether this join claimed meeting ownership.
    pub is_new_owner: bool,
    /// Full membership (connection ids) in join order, including the joiner.
    pub members: Vec<String>,
}

/// Status of the `RoomDirectoryActor`.
#[derive(Debug, Clone)]
pub struct DirectoryStatus {
    /// Active rooms.
    pub room_count: usize,
    /// Connections currently attached to a room.
    pub attached_connections: usize,
    /// Whether the directory is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Point-in-time state of a room (for debugging/tests).
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub owner_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub participants: Vec<ParticipantSnapshot>,
    pub chat_len: usize,
    pub finalized: bool,
}
