//! WebSocket gateway.
//!
//! Upgrades HTTP to WS, mints a connection id, and bridges the socket to
//! the actor system:
//!
//! - reader half: decodes JSON frames into [`ClientEvent`]s and routes them
//!   to the directory (or straight to the relay for signaling)
//! - writer half: drains the connection's outbound channel onto the wire
//!
//! Malformed frames are dropped with a debug log, never answered with an
//! error. When either half ends, the connection is deregistered and the
//! directory is told the connection closed; the elapsed online duration is
//! logged for telemetry only and feeds no attendance counter.

use crate::actors::{ActorMetrics, ConnectionActor, RoomDirectoryHandle};
use crate::events::{ClientEvent, ServerEvent};
use crate::registry::ConnectionRegistry;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Buffer between a connection actor and its socket writer.
const TRANSPORT_CHANNEL_BUFFER: usize = 64;

/// Shared state for the gateway router.
#[derive(Clone)]
pub struct GatewayState {
    /// The coordination core.
    pub directory: RoomDirectoryHandle,
    /// Live connection registry (also the relay fast path).
    pub registry: ConnectionRegistry,
    /// Shared actor metrics.
    pub metrics: Arc<ActorMetrics>,
    /// Parent token for per-connection actors.
    pub connections_token: CancellationToken,
}

/// Create the gateway router.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Drive one client connection from open to close.
async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let connection_id = Uuid::new_v4().to_string();
    let connected_at = Instant::now();

    info!(
        target: "rc.gateway",
        connection_id = %connection_id,
        "Connection opened"
    );

    let (transport_tx, mut transport_rx) = mpsc::channel::<ServerEvent>(TRANSPORT_CHANNEL_BUFFER);
    let (handle, _actor_task) = ConnectionActor::spawn(
        connection_id.clone(),
        transport_tx,
        state.connections_token.child_token(),
        Arc::clone(&state.metrics),
    );

    state.registry.register(handle.clone()).await;
    state.metrics.connection_created();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: outbound channel -> wire.
    let writer_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = transport_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(
                        target: "rc.gateway",
                        connection_id = %writer_id,
                        error = %e,
                        "Failed to encode outbound event"
                    );
                }
            }
        }
    });

    // Reader: wire -> actor system.
    let reader_state = state.clone();
    let reader_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        metrics::counter!("rc_gateway_events_total").increment(1);
                        route_event(&reader_state, &reader_id, event).await;
                    }
                    Err(e) => {
                        debug!(
                            target: "rc.gateway",
                            connection_id = %reader_id,
                            error = %e,
                            "Malformed inbound event, dropping"
                        );
                    }
                },
                Message::Close(_) => break,
                // Binary frames are not part of the protocol; pings are
                // answered by axum itself.
                _ => {}
            }
        }
    });

    // If either half exits, tear the other down.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    // Disconnect wins every race: drop the relay route first, then detach
    // from the room.
    state.registry.deregister(&connection_id).await;
    handle.cancel();
    let _ = state.directory.connection_closed(connection_id.clone()).await;
    state.metrics.connection_closed();

    info!(
        target: "rc.gateway",
        connection_id = %connection_id,
        online_seconds = connected_at.elapsed().as_secs(),
        "Connection closed"
    );
}

/// Route one decoded event into the core.
async fn route_event(state: &GatewayState, connection_id: &str, event: ClientEvent) {
    match event {
        ClientEvent::Join {
            room_id,
            user_id,
            display_name,
            owner_hint,
        } => {
            if let Err(e) = state
                .directory
                .join(
                    room_id,
                    connection_id.to_string(),
                    user_id,
                    display_name,
                    owner_hint,
                )
                .await
            {
                debug!(
                    target: "rc.gateway",
                    connection_id = %connection_id,
                    error = %e,
                    "Join refused"
                );
            }
        }

        ClientEvent::Signal { to, payload } => {
            state.registry.relay(connection_id, &to, payload).await;
        }

        ClientEvent::Chat { sender, body } => {
            let _ = state
                .directory
                .chat(connection_id.to_string(), sender, body)
                .await;
        }

        ClientEvent::RegisterFace {
            room_id,
            user_id,
            descriptor,
        } => {
            let _ = state
                .directory
                .register_face(connection_id.to_string(), room_id, user_id, descriptor)
                .await;
        }

        ClientEvent::PresenceSample {
            room_id,
            user_id,
            display_name,
            verified_delta_seconds,
        } => {
            let _ = state
                .directory
                .presence_sample(room_id, user_id, display_name, verified_delta_seconds)
                .await;
        }

        ClientEvent::EndMeeting { room_id } => {
            let _ = state.directory.end_meeting(room_id).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::persistence::MemorySink;
    use serde_json::json;

    fn test_state() -> GatewayState {
        let registry = ConnectionRegistry::new();
        let directory = RoomDirectoryHandle::new(
            registry.clone(),
            MemorySink::new(),
            ActorMetrics::new(),
            10,
        );
        GatewayState {
            directory,
            registry,
            metrics: ActorMetrics::new(),
            connections_token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_route_join_reaches_directory() {
        let state = test_state();

        // Register a connection the way handle_connection would.
        let (transport_tx, _transport_rx) = mpsc::channel(8);
        let (handle, _task) = ConnectionActor::spawn(
            "conn-1".to_string(),
            transport_tx,
            state.connections_token.child_token(),
            Arc::clone(&state.metrics),
        );
        state.registry.register(handle).await;

        route_event(
            &state,
            "conn-1",
            ClientEvent::Join {
                room_id: "r1".to_string(),
                user_id: Some("u1".to_string()),
                display_name: None,
                owner_hint: false,
            },
        )
        .await;

        let status = state.directory.get_status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert_eq!(status.attached_connections, 1);

        state.directory.cancel();
    }

    #[tokio::test]
    async fn test_route_stale_events_do_not_error() {
        let state = test_state();

        // None of these name a live room or connection; all must be dropped
        // quietly.
        route_event(
            &state,
            "conn-ghost",
            ClientEvent::Chat {
                sender: "A".to_string(),
                body: "hi".to_string(),
            },
        )
        .await;
        route_event(
            &state,
            "conn-ghost",
            ClientEvent::Signal {
                to: "conn-other".to_string(),
                payload: json!({}),
            },
        )
        .await;
        route_event(
            &state,
            "conn-ghost",
            ClientEvent::EndMeeting {
                room_id: "r-gone".to_string(),
            },
        )
        .await;

        let status = state.directory.get_status().await.unwrap();
        assert_eq!(status.room_count, 0);

        state.directory.cancel();
    }

    #[tokio::test]
    async fn test_gateway_router_builds() {
        let state = test_state();
        let _router = gateway_router(state);
    }
}
