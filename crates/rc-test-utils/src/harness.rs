//! Test harness for driving the actor system without a transport.
//!
//! [`TestDirectory`] wires a real `RoomDirectoryActor` to a
//! [`RecordingSink`]; [`TestClient`] plays the gateway's role for one
//! connection: it spawns the `ConnectionActor`, registers it, and keeps the
//! receiving end of the transport channel so tests can assert on every
//! event pushed to that client.

use crate::recording_sink::RecordingSink;

use room_controller::actors::{
    ActorMetrics, ConnectionActor, ConnectionActorHandle, RoomDirectoryHandle,
};
use room_controller::events::ServerEvent;
use room_controller::persistence::PersistenceSink;
use room_controller::registry::ConnectionRegistry;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sample interval used by test directories.
pub const TEST_SAMPLE_INTERVAL_SECONDS: u64 = 10;

/// A fake connected client.
pub struct TestClient {
    pub connection_id: String,
    pub handle: ConnectionActorHandle,
    events: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Drain everything currently queued for this client.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event, panicking after one second.
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("transport channel closed")
    }
}

/// A fully wired directory with its registry and recording sink.
pub struct TestDirectory {
    pub handle: RoomDirectoryHandle,
    pub registry: ConnectionRegistry,
    pub sink: Arc<RecordingSink>,
    pub metrics: Arc<ActorMetrics>,
}

impl TestDirectory {
    /// Spawn a directory actor backed by a recording sink.
    #[must_use]
    pub fn spawn() -> Self {
        let registry = ConnectionRegistry::new();
        let sink = RecordingSink::new();
        let metrics = ActorMetrics::new();
        let sink_obj: Arc<dyn PersistenceSink> = sink.clone();
        let handle = RoomDirectoryHandle::new(
            registry.clone(),
            sink_obj,
            Arc::clone(&metrics),
            TEST_SAMPLE_INTERVAL_SECONDS,
        );

        Self {
            handle,
            registry,
            sink,
            metrics,
        }
    }

    /// Open a fake connection and register it, as the gateway would.
    pub async fn connect(&self, connection_id: &str) -> TestClient {
        let (transport_tx, transport_rx) = mpsc::channel(256);
        let (handle, _task) = ConnectionActor::spawn(
            connection_id.to_string(),
            transport_tx,
            CancellationToken::new(),
            Arc::clone(&self.metrics),
        );
        self.registry.register(handle.clone()).await;

        TestClient {
            connection_id: connection_id.to_string(),
            handle,
            events: transport_rx,
        }
    }

    /// Close a connection the way the gateway does: registry first, then the
    /// directory.
    pub async fn disconnect(&self, client: &TestClient) {
        self.registry.deregister(&client.connection_id).await;
        client.handle.cancel();
        let _ = self
            .handle
            .connection_closed(client.connection_id.clone())
            .await;
    }

    /// Give in-flight actor messages a moment to land.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
