//! `RoomActor` - per-room actor that owns room state.
//!
//! Each `RoomActor`:
//! - Owns all state for one room: participants (in join order), the chat
//!   log, the owner slot, the start time and the attendance counters
//! - Serializes every mutation of that state through its mailbox
//! - Dispatches notifications by enqueueing onto per-connection mailboxes,
//!   never by touching a socket
//!
//! Rooms exist only while populated: the directory spawns a `RoomActor` on
//! the first join and cancels it when the last participant leaves, so the
//! chat log and owner slot die with the room.
//!
//! # Ownership
//!
//! The owner slot is a one-shot compare-and-set evaluated atomically with
//! the participant-count check at join time: the first joiner with a
//! resolvable identity claims it, and nobody else ever does. It is cleared
//! when the meeting ends.

use crate::attendance::{report_row, AttendanceReport, ParticipantSnapshot};
use crate::errors::RcError;
use crate::events::ServerEvent;
use crate::persistence::PersistenceSink;

use super::connection::ConnectionActorHandle;
use super::messages::{JoinSummary, RoomMessage, RoomSnapshot};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Owner annotation attached to the owner's copy of the final report.
const OWNER_REPORT_MESSAGE: &str = "As the meeting owner, here is the final attendance report";

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Submit a join. The reply travels on `respond_to` straight from the
    /// room actor so the caller never blocks anyone else waiting for it.
    pub async fn join(
        &self,
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<JoinSummary, RcError>>,
    ) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::Join {
                connection_id,
                user_id,
                display_name,
                connection,
                respond_to,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Remove a departed connection's participant.
    pub async fn leave(&self, connection_id: String) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::Leave { connection_id })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Append and broadcast a chat message.
    pub async fn chat(
        &self,
        origin_connection_id: String,
        sender: String,
        body: String,
    ) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::Chat {
                origin_connection_id,
                sender,
                body,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Bind an identity to a connection's participant and store the
    /// descriptor.
    pub async fn register_face(
        &self,
        connection_id: String,
        user_id: String,
        descriptor: Value,
    ) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::RegisterFace {
                connection_id,
                user_id,
                descriptor,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Accrue presence counters for a participant.
    pub async fn presence_sample(
        &self,
        user_id: String,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    ) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::PresenceSample {
                user_id,
                display_name,
                verified_delta_seconds,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// End the meeting and produce the attendance report.
    pub async fn finalize(&self) -> Result<(), RcError> {
        self.sender
            .send(RoomMessage::Finalize)
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Get current room state.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetSnapshot { respond_to: tx })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Participant state within a room.
#[derive(Debug)]
struct Participant {
    /// Connection this participant arrived on.
    connection_id: String,
    /// Stable identity, absent until enrollment.
    user_id: Option<String>,
    /// Display name.
    display_name: String,
    /// Accrued meeting time in seconds.
    total_time_seconds: u64,
    /// Accrued verified time in seconds.
    verified_time_seconds: u64,
    /// Outbound handle for notifications.
    connection: ConnectionActorHandle,
}

impl Participant {
    fn to_snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            total_time_seconds: self.total_time_seconds,
            verified_time_seconds: self.verified_time_seconds,
        }
    }
}

/// One chat message, immutable once appended.
#[derive(Debug, Clone)]
struct ChatMessage {
    sender: String,
    body: String,
    origin_connection_id: String,
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    /// Room ID.
    room_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the directory's token).
    cancel_token: CancellationToken,
    /// Participants in join order.
    participants: Vec<Participant>,
    /// Append-only chat log, replayed in full to late joiners.
    chat_log: Vec<ChatMessage>,
    /// Owner slot, claimed at most once per room lifetime.
    owner_id: Option<String>,
    /// When the first participant joined; cleared on meeting end.
    started_at: Option<DateTime<Utc>>,
    /// Whether the attendance report has been issued.
    finalized: bool,
    /// Seconds of total time accrued per presence sample.
    sample_interval_seconds: u64,
    /// External persistence sink (best-effort writes).
    sink: Arc<dyn PersistenceSink>,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        cancel_token: CancellationToken,
        sample_interval_seconds: u64,
        sink: Arc<dyn PersistenceSink>,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            participants: Vec::new(),
            chat_log: Vec::new(),
            owner_id: None,
            started_at: Some(Utc::now()),
            finalized: false,
            sample_interval_seconds,
            sink,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, &room_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
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
                            debug!(
                                target: "rc.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            participants = self.participants.len(),
            chat_messages = self.chat_log.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                connection_id,
                user_id,
                display_name,
                connection,
                respond_to,
            } => {
                let result = self
                    .handle_join(connection_id, user_id, display_name, connection)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Leave { connection_id } => {
                self.handle_leave(&connection_id).await;
            }

            RoomMessage::Chat {
                origin_connection_id,
                sender,
                body,
            } => {
                self.handle_chat(origin_connection_id, sender, body).await;
            }

            RoomMessage::RegisterFace {
                connection_id,
                user_id,
                descriptor,
            } => {
                self.handle_register_face(&connection_id, user_id, descriptor)
                    .await;
            }

            RoomMessage::PresenceSample {
                user_id,
                display_name,
                verified_delta_seconds,
            } => {
                self.handle_presence_sample(&user_id, display_name, verified_delta_seconds)
                    .await;
            }

            RoomMessage::Finalize => {
                self.handle_finalize().await;
            }

            RoomMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Handle a new participant joining.
    ///
    /// Every member, the newcomer included, receives the arrival notification
    /// with the full membership list; this is what triggers peer setup on
    /// both sides of every pair. The newcomer alone then receives the chat
    /// log replay, in original order, before any new message.
    #[instrument(skip_all, fields(room_id = %self.room_id))]
    async fn handle_join(
        &mut self,
        connection_id: String,
        user_id: Option<String>,
        display_name: Option<String>,
        connection: ConnectionActorHandle,
    ) -> Result<JoinSummary, RcError> {
        // One-shot owner claim, atomic with the emptiness check.
        let is_new_owner =
            self.participants.is_empty() && self.owner_id.is_none() && user_id.is_some();
        if is_new_owner {
            self.owner_id = user_id.clone();
            let _ = connection.deliver(ServerEvent::YouAreOwner).await;
            info!(
                target: "rc.actor.room",
                owner_id = user_id.as_deref().unwrap_or(""),
                "Meeting owner claimed"
            );
        }

        let display_name = display_name.unwrap_or_else(|| "Anonymous".to_string());
        let newcomer = connection.clone();

        self.participants.push(Participant {
            connection_id: connection_id.clone(),
            user_id,
            display_name,
            total_time_seconds: 0,
            verified_time_seconds: 0,
            connection,
        });

        let members: Vec<String> = self
            .participants
            .iter()
            .map(|p| p.connection_id.clone())
            .collect();

        for participant in &self.participants {
            let _ = participant
                .connection
                .deliver(ServerEvent::ParticipantArrived {
                    connection_id: connection_id.clone(),
                    members: members.clone(),
                })
                .await;
        }

        for msg in &self.chat_log {
            let _ = newcomer
                .deliver(ServerEvent::Chat {
                    sender: msg.sender.clone(),
                    body: msg.body.clone(),
                    origin_connection_id: msg.origin_connection_id.clone(),
                })
                .await;
        }

        info!(
            target: "rc.actor.room",
            connection_id = %connection_id,
            total_participants = self.participants.len(),
            "Participant joined"
        );

        Ok(JoinSummary {
            is_new_owner,
            members,
        })
    }

    /// Handle a participant's connection closing.
    async fn handle_leave(&mut self, connection_id: &str) {
        let Some(position) = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)
        else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Leave for unknown connection, dropping"
            );
            return;
        };

        self.participants.remove(position);

        for participant in &self.participants {
            let _ = participant
                .connection
                .deliver(ServerEvent::ParticipantLeft {
                    connection_id: connection_id.to_string(),
                })
                .await;
        }

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            remaining_participants = self.participants.len(),
            "Participant left"
        );
    }

    /// Append a chat message and broadcast it to every member.
    ///
    /// The sender receives its own message back: all clients render from the
    /// broadcast, which gives a single source of truth for ordering.
    async fn handle_chat(&mut self, origin_connection_id: String, sender: String, body: String) {
        self.chat_log.push(ChatMessage {
            sender: sender.clone(),
            body: body.clone(),
            origin_connection_id: origin_connection_id.clone(),
        });

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            sender = %sender,
            chat_len = self.chat_log.len(),
            "Chat message appended"
        );

        for participant in &self.participants {
            let _ = participant
                .connection
                .deliver(ServerEvent::Chat {
                    sender: sender.clone(),
                    body: body.clone(),
                    origin_connection_id: origin_connection_id.clone(),
                })
                .await;
        }
    }

    /// Bind a stable identity to a connection's participant and persist the
    /// face descriptor.
    ///
    /// Re-registration on the same connection overwrites both; a user id
    /// already held by a different participant is refused to keep identities
    /// unique within the room.
    async fn handle_register_face(
        &mut self,
        connection_id: &str,
        user_id: String,
        descriptor: Value,
    ) {
        let duplicate = self
            .participants
            .iter()
            .any(|p| p.connection_id != connection_id && p.user_id.as_deref() == Some(&user_id));
        if duplicate {
            warn!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Identity already bound to another participant, refusing rebind"
            );
            return;
        }

        let Some(participant) = self
            .participants
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
        else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Face registration for unknown connection, dropping"
            );
            return;
        };

        participant.user_id = Some(user_id.clone());
        let ack_connection = participant.connection.clone();

        if let Err(e) = self
            .sink
            .save_descriptor(&user_id, &self.room_id, &descriptor)
            .await
        {
            error!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Face descriptor save failed"
            );
        }

        let _ = ack_connection.deliver(ServerEvent::FaceRegistered).await;

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            "Face registered"
        );
    }

    /// Accrue presence counters for a participant, looked up by user id so a
    /// reconnect under a new connection keeps accruing onto the same row.
    ///
    /// Total time advances by the fixed sample interval per call; the caller
    /// owns the cadence. Samples may race ahead of enrollment, so an unknown
    /// user id is dropped, not an error.
    async fn handle_presence_sample(
        &mut self,
        user_id: &str,
        display_name: Option<String>,
        verified_delta_seconds: u64,
    ) {
        let interval = self.sample_interval_seconds;

        let Some(participant) = self
            .participants
            .iter_mut()
            .find(|p| p.user_id.as_deref() == Some(user_id))
        else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                user_id = %user_id,
                "Presence sample for unknown user, dropping"
            );
            return;
        };

        participant.total_time_seconds += interval;
        participant.verified_time_seconds += verified_delta_seconds;
        if let Some(name) = display_name {
            participant.display_name = name;
        }

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            user_id = %user_id,
            total_time_seconds = participant.total_time_seconds,
            verified_time_seconds = participant.verified_time_seconds,
            "Presence sample applied"
        );

        self.push_live_attendance().await;
    }

    /// Push the live counter snapshot to the owner's connection only.
    async fn push_live_attendance(&self) {
        let Some(owner_id) = &self.owner_id else {
            return;
        };

        let Some(owner) = self
            .participants
            .iter()
            .find(|p| p.user_id.as_deref() == Some(owner_id))
        else {
            return;
        };

        let participants: Vec<ParticipantSnapshot> = self
            .participants
            .iter()
            .map(Participant::to_snapshot)
            .collect();

        let _ = owner
            .connection
            .deliver(ServerEvent::LiveAttendance { participants })
            .await;
    }

    /// End the meeting: compute, persist and broadcast the final report.
    ///
    /// Sink writes are best-effort; the broadcasts always proceed so storage
    /// trouble never withholds the result from participants. A second call,
    /// or a call on an empty room, is a no-op.
    #[instrument(skip_all, fields(room_id = %self.room_id))]
    async fn handle_finalize(&mut self) {
        if self.finalized || self.participants.is_empty() {
            debug!(
                target: "rc.actor.room",
                finalized = self.finalized,
                "Finalize skipped"
            );
            return;
        }

        let report = AttendanceReport {
            meeting_id: self.room_id.clone(),
            owner_id: self
                .owner_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            ended_at: Utc::now(),
            participants: self
                .participants
                .iter()
                .map(|p| report_row(&p.to_snapshot()))
                .collect(),
        };

        if let Err(e) = self.sink.save_report(&report).await {
            error!(
                target: "rc.actor.room",
                error = %e,
                "Attendance report save failed, broadcasting anyway"
            );
        }

        for participant in &self.participants {
            let _ = participant
                .connection
                .deliver(ServerEvent::AttendanceReport {
                    report: report.clone(),
                })
                .await;
        }

        if let Some(owner_id) = &self.owner_id {
            if let Some(owner) = self
                .participants
                .iter()
                .find(|p| p.user_id.as_deref() == Some(owner_id))
            {
                let _ = owner
                    .connection
                    .deliver(ServerEvent::OwnerAttendanceReport {
                        report: report.clone(),
                        message: OWNER_REPORT_MESSAGE.to_string(),
                    })
                    .await;
            }
        }

        if let Err(e) = self.sink.delete_descriptors(&self.room_id).await {
            error!(
                target: "rc.actor.room",
                error = %e,
                "Face descriptor cleanup failed"
            );
        }

        self.owner_id = None;
        self.started_at = None;
        self.finalized = true;

        info!(
            target: "rc.actor.room",
            participants = report.participants.len(),
            "Attendance report issued"
        );
    }

    /// Get current room state.
    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            owner_id: self.owner_id.clone(),
            started_at: self.started_at,
            participants: self
                .participants
                .iter()
                .map(Participant::to_snapshot)
                .collect(),
            chat_len: self.chat_log.len(),
            finalized: self.finalized,
        }
    }
}
