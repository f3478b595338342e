//! `RoomDirectoryActor` - singleton that owns the room map and the
//! connection reverse index.
//!
//! The directory is the only writer of two structures that must move in
//! lock-step:
//!
//! - `rooms`: room id -> managed `RoomActor`
//! - `connection_to_room`: connection id -> room id (the reverse index that
//!   keeps disconnect handling O(1))
//!
//! Because both live inside one single-threaded actor, every join/leave
//! updates them atomically with respect to each other: concurrent joins to
//! an unknown room can never spawn two rooms, and a room is removed in the
//! same step that empties it, with no observable zero-participant state.
//!
//! The directory never awaits a room's reply: request/response messages
//! carry the caller's `oneshot` through to the room actor, so one busy room
//! cannot stall traffic to the others.

use crate::errors::RcError;
use crate::persistence::PersistenceSink;
use crate::registry::ConnectionRegistry;

use super::messages::{DirectoryMessage, DirectoryStatus, JoinSummary};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the directory mailbox.
const DIRECTORY_CHANNEL_BUFFER: usize = 1000;

/// How long to wait for a cancelled room task during cleanup.
const ROOM_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RoomDirectoryActor`.
///
/// This is the public interface of the coordination core. All methods are
/// async; fire-and-forget operations resolve as soon as the message is
/// enqueued.
#[derive(Clone)]
pub struct RoomDirectoryHandle {
    sender: mpsc::Sender<DirectoryMessage>,
    cancel_token: CancellationToken,
}

impl RoomDirectoryHandle {
    /// Create a new `RoomDirectoryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        registry: ConnectionRegistry,
        sink: Arc<dyn PersistenceSink>,
        metrics: Arc<ActorMetrics>,
        sample_interval_seconds: u64,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(DIRECTORY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomDirectoryActor::new(
            receiver,
            cancel_token.clone(),
            registry,
            sink,
            metrics,
            sample_interval_seconds,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Join a room, creating it if this is the first arrival.
    pub async fn join(
        &self,
        room_id: String,
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        owner_hint: bool,
    ) -> Result<JoinSummary, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DirectoryMessage::Join {
                room_id,
                connection_id,
                user_id,
                display_name,
                owner_hint,
                respond_to: tx,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Post a chat message from a connection to its room.
    pub async fn chat(
        &self,
        connection_id: String,
        sender: String,
        body: String,
    ) -> Result<(), RcError> {
        self.sender
            .send(DirectoryMessage::Chat {
                connection_id,
                sender,
                body,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Bind an identity and store a face descriptor.
    pub async fn register_face(
        &self,
        connection_id: String,
        room_id: String,
        user_id: String,
        descriptor: Value,
    ) -> Result<(), RcError> {
        self.sender
            .send(DirectoryMessage::RegisterFace {
                connection_id,
                room_id,
                user_id,
                descriptor,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Submit a presence sample.
    pub async fn presence_sample(
        &self,
        room_id: String,
        user_id: String,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    ) -> Result<(), RcError> {
        self.sender
            .send(DirectoryMessage::PresenceSample {
                room_id,
                user_id,
                display_name,
                verified_delta_seconds,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// End a meeting, producing its attendance report.
    pub async fn end_meeting(&self, room_id: String) -> Result<(), RcError> {
        self.sender
            .send(DirectoryMessage::EndMeeting { room_id })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Notify the directory that a connection closed.
    pub async fn connection_closed(&self, connection_id: String) -> Result<(), RcError> {
        self.sender
            .send(DirectoryMessage::ConnectionClosed { connection_id })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Get the current directory status.
    pub async fn get_status(&self) -> Result<DirectoryStatus, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DirectoryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the directory.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    /// Handle to the room actor.
    handle: RoomActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Connections currently in the room, mirrored from the reverse index.
    members: HashSet<String>,
}

/// The `RoomDirectoryActor` implementation.
pub struct RoomDirectoryActor {
    /// Message receiver.
    receiver: mpsc::Receiver<DirectoryMessage>,
    /// Cancellation token (root of the room/connection token tree).
    cancel_token: CancellationToken,
    /// Managed rooms by ID.
    rooms: HashMap<String, ManagedRoom>,
    /// Reverse index: connection id -> room id.
    connection_to_room: HashMap<String, String>,
    /// Registry of live connections (shared with the gateway and relay).
    registry: ConnectionRegistry,
    /// External persistence sink, handed to each room.
    sink: Arc<dyn PersistenceSink>,
    /// Whether the directory is draining.
    is_draining: bool,
    /// Seconds accrued per presence sample.
    sample_interval_seconds: u64,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RoomDirectoryActor {
    fn new(
        receiver: mpsc::Receiver<DirectoryMessage>,
        cancel_token: CancellationToken,
        registry: ConnectionRegistry,
        sink: Arc<dyn PersistenceSink>,
        metrics: Arc<ActorMetrics>,
        sample_interval_seconds: u64,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            connection_to_room: HashMap::new(),
            registry,
            sink,
            is_draining: false,
            sample_interval_seconds,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Directory, "directory"),
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.directory")]
    async fn run(mut self) {
        info!(target: "rc.actor.directory", "RoomDirectoryActor started");

        loop {
            // Check for terminated room actors
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.directory",
                        "RoomDirectoryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "rc.actor.directory",
                                "RoomDirectoryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.directory",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomDirectoryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: DirectoryMessage) {
        match message {
            DirectoryMessage::Join {
                room_id,
                connection_id,
                user_id,
                display_name,
                owner_hint,
                respond_to,
            } => {
                self.handle_join(
                    room_id,
                    connection_id,
                    user_id,
                    display_name,
                    owner_hint,
                    respond_to,
                )
                .await;
            }

            DirectoryMessage::Chat {
                connection_id,
                sender,
                body,
            } => {
                self.handle_chat(&connection_id, sender, body).await;
            }

            DirectoryMessage::RegisterFace {
                connection_id,
                room_id,
                user_id,
                descriptor,
            } => {
                self.forward_register_face(&room_id, connection_id, user_id, descriptor)
                    .await;
            }

            DirectoryMessage::PresenceSample {
                room_id,
                user_id,
                display_name,
                verified_delta_seconds,
            } => {
                self.forward_presence_sample(
                    &room_id,
                    user_id,
                    display_name,
                    verified_delta_seconds,
                )
                .await;
            }

            DirectoryMessage::EndMeeting { room_id } => {
                self.forward_finalize(&room_id).await;
            }

            DirectoryMessage::ConnectionClosed { connection_id } => {
                self.handle_connection_closed(&connection_id).await;
            }

            DirectoryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }
        }
    }

    /// Handle a connection joining a room.
    ///
    /// The reply oneshot is forwarded to the room actor; the directory only
    /// answers directly on its own failure paths.
    #[instrument(skip_all, fields(room_id = %room_id, connection_id = %connection_id))]
    async fn handle_join(
        &mut self,
        room_id: String,
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        owner_hint: bool,
        respond_to: oneshot::Sender<Result<JoinSummary, RcError>>,
    ) {
        if self.is_draining {
            let _ = respond_to.send(Err(RcError::Draining));
            return;
        }

        if room_id.is_empty() {
            debug!(target: "rc.actor.directory", "Join with empty room id, dropping");
            let _ = respond_to.send(Err(RcError::RoomNotFound(room_id)));
            return;
        }

        // Disconnect always wins: a join racing a closed connection is
        // dropped here, before any room state is touched.
        let Some(connection) = self.registry.get(&connection_id).await else {
            debug!(
                target: "rc.actor.directory",
                "Join for unregistered connection, dropping"
            );
            let _ = respond_to.send(Err(RcError::ConnectionNotFound(connection_id)));
            return;
        };

        if self.connection_to_room.contains_key(&connection_id) {
            debug!(
                target: "rc.actor.directory",
                "Connection already in a room, refusing second join"
            );
            let _ = respond_to.send(Err(RcError::Conflict(
                "Connection already joined a room".to_string(),
            )));
            return;
        }

        if owner_hint {
            debug!(
                target: "rc.actor.directory",
                "Client supplied ownership hint; ownership is decided by join order"
            );
        }

        if !self.rooms.contains_key(&room_id) {
            let (handle, task_handle) = RoomActor::spawn(
                room_id.clone(),
                self.cancel_token.child_token(),
                self.sample_interval_seconds,
                Arc::clone(&self.sink),
                Arc::clone(&self.metrics),
            );

            self.rooms.insert(
                room_id.clone(),
                ManagedRoom {
                    handle,
                    task_handle,
                    members: HashSet::new(),
                },
            );

            self.metrics.room_created();
            info!(
                target: "rc.actor.directory",
                total_rooms = self.rooms.len(),
                "Room created"
            );
        }

        let Some(managed) = self.rooms.get_mut(&room_id) else {
            let _ = respond_to.send(Err(RcError::Internal("room vanished".to_string())));
            return;
        };

        let room = managed.handle.clone();
        managed.members.insert(connection_id.clone());
        self.connection_to_room
            .insert(connection_id.clone(), room_id.clone());

        if let Err(e) = room
            .join(
                connection_id.clone(),
                user_id,
                display_name,
                connection,
                respond_to,
            )
            .await
        {
            // Room mailbox gone; roll the index back and let the health
            // check reap the dead actor. The caller's oneshot was consumed,
            // so it resolves as a receive error.
            warn!(
                target: "rc.actor.directory",
                room_id = %room_id,
                error = %e,
                "Failed to forward join to room actor"
            );
            self.connection_to_room.remove(&connection_id);
            if let Some(managed) = self.rooms.get_mut(&room_id) {
                managed.members.remove(&connection_id);
            }
        }
    }

    /// Resolve a chat message's room through the reverse index and forward.
    async fn handle_chat(&mut self, connection_id: &str, sender: String, body: String) {
        let Some(room_id) = self.connection_to_room.get(connection_id) else {
            debug!(
                target: "rc.actor.directory",
                connection_id = %connection_id,
                "Chat from connection with no room, dropping"
            );
            return;
        };

        if let Some(managed) = self.rooms.get(room_id) {
            let _ = managed
                .handle
                .chat(connection_id.to_string(), sender, body)
                .await;
        }
    }

    async fn forward_register_face(
        &mut self,
        room_id: &str,
        connection_id: String,
        user_id: String,
        descriptor: Value,
    ) {
        let Some(managed) = self.rooms.get(room_id) else {
            debug!(
                target: "rc.actor.directory",
                room_id = %room_id,
                "Face registration for unknown room, dropping"
            );
            return;
        };

        let _ = managed
            .handle
            .register_face(connection_id, user_id, descriptor)
            .await;
    }

    async fn forward_presence_sample(
        &mut self,
        room_id: &str,
        user_id: String,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    ) {
        let Some(managed) = self.rooms.get(room_id) else {
            debug!(
                target: "rc.actor.directory",
                room_id = %room_id,
                "Presence sample for unknown room, dropping"
            );
            return;
        };

        let _ = managed
            .handle
            .presence_sample(user_id, display_name, verified_delta_seconds)
            .await;
    }

    async fn forward_finalize(&mut self, room_id: &str) {
        let Some(managed) = self.rooms.get(room_id) else {
            debug!(
                target: "rc.actor.directory",
                room_id = %room_id,
                "End-meeting for unknown room, dropping"
            );
            return;
        };

        let _ = managed.handle.finalize().await;
    }

    /// Handle a closed connection: detach it from its room and delete the
    /// room if it empties, in one step.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    async fn handle_connection_closed(&mut self, connection_id: &str) {
        let Some(room_id) = self.connection_to_room.remove(connection_id) else {
            debug!(
                target: "rc.actor.directory",
                "Closed connection was not in a room"
            );
            return;
        };

        let room_emptied = {
            let Some(managed) = self.rooms.get_mut(&room_id) else {
                return;
            };
            managed.members.remove(connection_id);
            managed.members.is_empty()
        };

        if room_emptied {
            // Last participant out: the room, its chat log and its owner
            // slot all go away in this same step. New joins to the same id
            // start a fresh room.
            if let Some(managed) = self.rooms.remove(&room_id) {
                self.remove_room(&room_id, managed);
            }
        } else if let Some(managed) = self.rooms.get(&room_id) {
            let _ = managed.handle.leave(connection_id.to_string()).await;
        }
    }

    /// Cancel a room actor and reap its task in the background.
    fn remove_room(&mut self, room_id: &str, managed: ManagedRoom) {
        managed.handle.cancel();

        let room_id_owned = room_id.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(ROOM_CLEANUP_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rc.actor.directory",
                        room_id = %room_id_owned,
                        "Room actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rc.actor.directory",
                        room_id = %room_id_owned,
                        error = ?e,
                        "Room actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rc.actor.directory",
                        room_id = %room_id_owned,
                        "Room actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.room_removed();

        info!(
            target: "rc.actor.directory",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room deleted"
        );
    }

    /// Get current directory status.
    fn get_status(&self) -> DirectoryStatus {
        DirectoryStatus {
            room_count: self.rooms.len(),
            attached_connections: self.connection_to_room.len(),
            is_draining: self.is_draining,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "rc.actor.directory",
            rooms = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.is_draining = true;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(ROOM_CLEANUP_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rc.actor.directory",
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rc.actor.directory",
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rc.actor.directory",
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
        }
        self.connection_to_room.clear();

        info!(target: "rc.actor.directory", "Graceful shutdown complete");
    }

    /// Check health of managed room actors.
    async fn check_room_health(&mut self) {
        let mut finished = Vec::new();

        for (room_id, managed) in &self.rooms {
            if managed.task_handle.is_finished() {
                warn!(
                    target: "rc.actor.directory",
                    room_id = %room_id,
                    "Room actor task finished unexpectedly"
                );
                finished.push(room_id.clone());
            }
        }

        for room_id in finished {
            if let Some(managed) = self.rooms.remove(&room_id) {
                for connection_id in &managed.members {
                    self.connection_to_room.remove(connection_id);
                }

                match managed.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "rc.actor.directory",
                            room_id = %room_id,
                            "Room actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            self.metrics.record_panic(ActorType::Room);
                        }
                    }
                }

                self.metrics.room_removed();
            }
        }
    }
}
