//! Process-wide connection registry and signaling relay.
//!
//! Maps `connection_id` to the connection's outbound handle. The registry is
//! the relay's fast path: forwarding a signaling payload is one sharded read
//! plus one mailbox enqueue, with no room lookup and no room-membership
//! check, so unrelated signaling pairs never serialize behind each other or
//! behind room mutations.
//!
//! Registration happens when a connection opens, before any join; removal
//! happens on disconnect, before the room teardown message is sent. A relay
//! naming a connection that has already been removed is silently dropped.

use crate::actors::connection::ConnectionActorHandle;
use crate::events::ServerEvent;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Shared registry of live connections.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, ConnectionActorHandle>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened connection.
    pub async fn register(&self, handle: ConnectionActorHandle) {
        let connection_id = handle.connection_id().to_string();
        self.inner.write().await.insert(connection_id, handle);
    }

    /// Remove a connection, returning its handle if it was present.
    pub async fn deregister(&self, connection_id: &str) -> Option<ConnectionActorHandle> {
        self.inner.write().await.remove(connection_id)
    }

    /// Look up a connection's outbound handle.
    pub async fn get(&self, connection_id: &str) -> Option<ConnectionActorHandle> {
        self.inner.read().await.get(connection_id).cloned()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Forward an opaque signaling payload to one connection.
    ///
    /// The payload is tagged with the sender's connection id and delivered to
    /// the target only. Unknown targets are dropped: signaling races against
    /// disconnects are expected and never an error.
    pub async fn relay(&self, from_connection_id: &str, to_connection_id: &str, payload: Value) {
        // Clone the handle out of the guard so the enqueue happens with no
        // registry lock held.
        let target = self.get(to_connection_id).await;

        match target {
            Some(handle) => {
                let event = ServerEvent::Signal {
                    from: from_connection_id.to_string(),
                    payload,
                };
                if handle.deliver(event).await.is_err() {
                    debug!(
                        target: "rc.relay",
                        from = %from_connection_id,
                        to = %to_connection_id,
                        "Relay target mailbox closed, dropping payload"
                    );
                }
            }
            None => {
                debug!(
                    target: "rc.relay",
                    from = %from_connection_id,
                    to = %to_connection_id,
                    "Relay target not found, dropping payload"
                );
            }
        }
    }
}
