//! Room Controller Service Library
//!
//! This library provides the core functionality for the Rollcall Room
//! Controller - a stateful WebSocket signaling server responsible for:
//!
//! - Real-time room coordination and participant state management
//! - Relaying opaque peer-connection-setup payloads between participants
//! - Per-room chat with full-history replay for late joiners
//! - Face-presence-verified attendance aggregation and final reports
//!
//! # Architecture
//!
//! The service uses an actor model hierarchy:
//!
//! ```text
//! RoomDirectoryActor (singleton per instance)
//! ├── owns the room map and the connection -> room reverse index
//! └── supervises N RoomActors
//!     └── RoomActor (one per populated room)
//!         └── owns participants, chat log, owner slot, attendance counters
//!
//! ConnectionActor (one per client connection)
//! └── queues outbound events for one client
//! ```
//!
//! # Key Design Decisions
//!
//! - **Rooms exist only while populated**: created on first join, deleted
//!   atomically when the last participant disconnects
//! - **Ownership is a one-shot CAS**: the first joiner with a resolvable
//!   identity claims the owner slot, evaluated atomically with the
//!   participant-count check
//! - **Best-effort delivery**: signaling, chat and live-attendance pushes
//!   are at-most-once; only the final attendance report is handed to the
//!   persistence sink
//! - **Disconnect always wins**: events naming a connection or room that is
//!   already gone are silently dropped, never an error
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`attendance`] - Attendance math and report assembly
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`events`] - Client-facing wire events
//! - [`gateway`] - axum WebSocket transport binding
//! - [`observability`] - Health endpoints
//! - [`persistence`] - External persistence sink boundary
//! - [`registry`] - Connection registry and signaling relay

pub mod actors;
pub mod attendance;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod observability;
pub mod persistence;
pub mod registry;
