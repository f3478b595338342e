//! Room Controller error types.
//!
//! Most inbound faults are not errors at all: operations naming a room or
//! connection that no longer exists are silently dropped at debug level
//! (see the actor modules). `RcError` covers the cases a caller can act on.

use thiserror::Error;

/// Room Controller error type.
#[derive(Debug, Error)]
pub enum RcError {
    /// Room not found (only surfaced where a reply channel exists).
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Connection not found in the registry.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service is draining (graceful shutdown in progress).
    #[error("Service is draining")]
    Draining,

    /// Conflict (e.g. a connection joining a second room).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error (actor channel failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::Config(_) | RcError::Internal(_) => "An internal error occurred".to_string(),
            RcError::RoomNotFound(_) => "Room not found".to_string(),
            RcError::ConnectionNotFound(_) => "Connection not found".to_string(),
            RcError::Draining => "Server is shutting down, please reconnect".to_string(),
            RcError::Conflict(msg) => msg.clone(),
        }
    }
}
