//! Actor model implementation for the Room Controller.
//!
//! This module implements the actor hierarchy:
//!
//! ```text
//! RoomDirectoryActor (singleton per service instance)
//! ├── owns the room map and the connection -> room reverse index
//! └── supervises N RoomActors
//!     └── RoomActor (one per populated room)
//!         └── owns participants, chat log, owner slot, attendance counters
//!
//! ConnectionActor (one per client connection, spawned by the gateway)
//! └── queues outbound events for one client
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per room**: room state mutates single-threaded; unrelated
//!   rooms proceed in parallel
//! - **Connections outlive room membership**: `ConnectionActor`s are spawned
//!   on connect, before any join, and registered in the
//!   [`crate::registry::ConnectionRegistry`] so the signaling relay can reach
//!   them without a room lookup
//! - **`CancellationToken` propagation**: the directory's token parents every
//!   room token for graceful shutdown
//! - **Message passing**: all inter-actor communication via
//!   `tokio::sync::mpsc` channels; replies travel on forwarded `oneshot`s so
//!   the directory never waits on a room
//!
//! # Modules
//!
//! - [`directory`] - `RoomDirectoryActor` singleton
//! - [`room`] - `RoomActor` per populated room
//! - [`connection`] - `ConnectionActor` per client connection
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod directory;
pub mod messages;
pub mod metrics;
pub mod room;

// Re-export primary types
pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use directory::{RoomDirectoryActor, RoomDirectoryHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle};
