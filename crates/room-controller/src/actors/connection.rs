//! `ConnectionActor` - per-client-connection actor.
//!
//! Each `ConnectionActor`:
//! - Handles exactly one client connection
//! - Queues outbound [`ServerEvent`]s from room actors and the relay
//! - Forwards them to the transport writer owned by the gateway
//!
//! Room actors and the signaling relay never touch the socket: they enqueue
//! into this actor's mailbox and move on, so one slow client cannot stall a
//! room or an unrelated signaling pair.
//!
//! # Lifecycle
//!
//! 1. Spawned by the gateway when a connection opens
//! 2. Runs until the connection closes or the transport writer goes away
//! 3. Cancellation via child token propagates from the service root

use crate::errors::RcError;
use crate::events::ServerEvent;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default channel buffer size for the connection mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 200;

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: String,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Queue an event for delivery to the client.
    pub async fn deliver(&self, event: ServerEvent) -> Result<(), RcError> {
        self.sender
            .send(ConnectionMessage::Deliver { event })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Close the connection.
    pub async fn close(&self, reason: String) -> Result<(), RcError> {
        self.sender
            .send(ConnectionMessage::Close { reason })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    /// Connection ID.
    connection_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Outbound lane to the transport writer (owned by the gateway).
    transport: mpsc::Sender<ServerEvent>,
    /// Cancellation token (child of the service root token).
    cancel_token: CancellationToken,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle. `transport` is the channel
    /// the gateway's writer task drains onto the wire.
    pub fn spawn(
        connection_id: String,
        transport: mpsc::Sender<ServerEvent>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

        let actor = Self {
            connection_id: connection_id.clone(),
            receiver,
            transport,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, &connection_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    async fn run(mut self) {
        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "rc.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver { event } => {
                if self.transport.send(event).await.is_err() {
                    // Transport writer gone: the socket is dead, nothing more
                    // to deliver. Teardown follows via the gateway.
                    debug!(
                        target: "rc.actor.connection",
                        connection_id = %self.connection_id,
                        "Transport closed, dropping outbound event and exiting"
                    );
                    return true;
                }
                false
            }

            ConnectionMessage::Close { reason } => {
                debug!(
                    target: "rc.actor.connection",
                    connection_id = %self.connection_id,
                    reason = %reason,
                    "Closing connection"
                );
                true
            }
        }
    }
}
