//! # Room Controller Test Utilities
//!
//! Shared test utilities for the Room Controller service.
//!
//! This crate provides fixtures for driving the actor system from
//! integration tests without a WebSocket in sight:
//!
//! - [`RecordingSink`] - a persistence sink that records every call and can
//!   be told to fail on demand
//! - [`TestClient`] - a fake connected client: a registered
//!   `ConnectionActor` plus a receiver for everything pushed to it
//! - [`TestDirectory`] - a fully wired directory/registry/sink triple
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::TestDirectory;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let dir = TestDirectory::spawn();
//!     let mut alice = dir.connect("conn-a").await;
//!
//!     dir.handle
//!         .join("r1".into(), "conn-a".into(), Some("u-a".into()), None, false)
//!         .await
//!         .unwrap();
//!
//!     let events = alice.drain();
//!     // assert on events...
//! }
//! ```

pub mod harness;
pub mod recording_sink;

pub use harness::{TestClient, TestDirectory};
pub use recording_sink::{RecordingSink, SinkCall};
