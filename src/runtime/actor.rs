//! The task that owns a session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::broadcast::{Broadcast, Envelope, Outbound};
use crate::error::Rejection;
use crate::registry::{ConnectionId, JoinOutcome};
use crate::session::{AbortReason, Delivery, GameCommand, GameKind, GameSession, RefundReport};
use crate::timer::{TimerRequest, TimerSlot, TimerTicket};

use super::LOG_TARGET;

const INBOX_CAPACITY: usize = 256;

/// One request to a session. Requests that expect an answer carry a
/// `oneshot` reply channel.
#[derive(Debug)]
pub enum SessionEvent {
    /// Seat or queue an identity.
    Join {
        /// Who joins.
        identity: String,
        /// Connection it arrived on.
        connection: ConnectionId,
        /// Join result.
        reply: oneshot::Sender<Result<JoinOutcome, Rejection>>,
    },
    /// Watch without playing.
    Spectate {
        /// Who watches.
        identity: String,
        /// Connection it arrived on.
        connection: ConnectionId,
        /// Acknowledgement.
        reply: oneshot::Sender<()>,
    },
    /// Rebind a known identity to a new connection.
    Attach {
        /// Who reconnected.
        identity: String,
        /// The new connection.
        connection: ConnectionId,
        /// Whether the identity was known.
        reply: oneshot::Sender<bool>,
    },
    /// Leave on request.
    Leave {
        /// Who leaves.
        identity: String,
        /// Whether the identity was known.
        reply: oneshot::Sender<bool>,
    },
    /// A transport connection closed.
    Disconnect {
        /// Identity the connection belonged to.
        identity: String,
        /// The closed connection.
        connection: ConnectionId,
    },
    /// Start a round.
    Start {
        /// Who asked.
        identity: String,
        /// Start result.
        reply: oneshot::Sender<Result<(), Rejection>>,
    },
    /// An in-game command.
    Command {
        /// Who sent it.
        identity: String,
        /// The command.
        command: GameCommand,
        /// Command result.
        reply: oneshot::Sender<Result<(), Rejection>>,
    },
    /// A timer fired.
    Timer(TimerTicket),
    /// Abort the running round and refund every stake.
    RefundAll {
        /// Why.
        reason: AbortReason,
        /// What was credited or left owing.
        reply: oneshot::Sender<RefundReport>,
    },
    /// Retry credits the ledger failed earlier.
    RetryPending {
        /// What was credited or left owing.
        reply: oneshot::Sender<RefundReport>,
    },
    /// The state as one viewer sees it.
    Snapshot {
        /// Viewer.
        viewer: String,
        /// Serialized projection.
        reply: oneshot::Sender<serde_json::Value>,
    },
}

/// Why a session request did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session refused the request.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The session task is gone.
    #[error("session closed")]
    Closed,
}

/// Cloneable front door of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    kind: GameKind,
    sender: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Which game the session runs.
    #[must_use]
    pub const fn kind(&self) -> GameKind {
        self.kind
    }

    /// Returns whether the session task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionEvent,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Seats or queues `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the table and waitlist are full.
    pub async fn join(
        &self,
        identity: &str,
        connection: ConnectionId,
    ) -> Result<JoinOutcome, SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Join {
            identity,
            connection,
            reply,
        })
        .await?
        .map_err(SessionError::from)
    }

    /// Adds `identity` as a spectator.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn spectate(&self, identity: &str, connection: ConnectionId) -> Result<(), SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Spectate {
            identity,
            connection,
            reply,
        })
        .await
    }

    /// Rebinds `identity` to `connection`. Returns whether the session knew
    /// the identity.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn attach(&self, identity: &str, connection: ConnectionId) -> Result<bool, SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Attach {
            identity,
            connection,
            reply,
        })
        .await
    }

    /// Removes `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn leave(&self, identity: &str) -> Result<bool, SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Leave { identity, reply })
            .await
    }

    /// Reports a closed connection. Does not wait for the session.
    pub async fn disconnect(&self, identity: &str, connection: ConnectionId) {
        let event = SessionEvent::Disconnect {
            identity: identity.to_owned(),
            connection,
        };
        if self.sender.send(event).await.is_err() {
            debug!(target: LOG_TARGET, game = %self.kind, identity, "session closed; disconnect dropped");
        }
    }

    /// Starts a round.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the session refuses.
    pub async fn start(&self, identity: &str) -> Result<(), SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Start { identity, reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Sends an in-game command.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] if the command is not valid now.
    pub async fn command(&self, identity: &str, command: GameCommand) -> Result<(), SessionError> {
        let identity = identity.to_owned();
        self.request(|reply| SessionEvent::Command {
            identity,
            command,
            reply,
        })
        .await?
        .map_err(SessionError::from)
    }

    /// Aborts the running round and refunds every stake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn refund_all(&self, reason: AbortReason) -> Result<RefundReport, SessionError> {
        self.request(|reply| SessionEvent::RefundAll { reason, reply })
            .await
    }

    /// Retries credits the ledger failed earlier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn retry_pending(&self) -> Result<RefundReport, SessionError> {
        self.request(|reply| SessionEvent::RetryPending { reply })
            .await
    }

    /// The session state as `viewer` sees it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is gone.
    pub async fn snapshot(&self, viewer: &str) -> Result<serde_json::Value, SessionError> {
        let viewer = viewer.to_owned();
        self.request(|reply| SessionEvent::Snapshot { viewer, reply })
            .await
    }
}

struct ScheduledTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns one session and applies its events one at a time.
pub struct SessionActor<G: GameSession> {
    game: G,
    inbox: mpsc::Receiver<SessionEvent>,
    timer_sender: mpsc::WeakSender<SessionEvent>,
    timers: HashMap<TimerSlot, ScheduledTimer>,
    broadcast: Arc<dyn Broadcast>,
    cancel: CancellationToken,
}

impl<G: GameSession> SessionActor<G> {
    /// Spawns the actor for `game` on the current runtime. The task stops when
    /// `cancel` fires or every handle is dropped.
    pub fn spawn(
        game: G,
        broadcast: Arc<dyn Broadcast>,
        cancel: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = SessionHandle {
            kind: game.kind(),
            sender: sender.clone(),
        };
        let actor = Self {
            game,
            inbox,
            timer_sender: sender.downgrade(),
            timers: HashMap::new(),
            broadcast,
            cancel,
        };
        (handle, tokio::spawn(actor.run()))
    }

    async fn run(mut self) {
        let kind = self.game.kind();
        debug!(target: LOG_TARGET, game = %kind, "session started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
        debug!(target: LOG_TARGET, game = %kind, "session stopped");
    }

    fn handle(&mut self, event: SessionEvent) {
        let touched = match event {
            SessionEvent::Join {
                identity,
                connection,
                reply,
            } => {
                let result = self.game.join(&identity, connection);
                let touched = result.is_ok();
                let _ = reply.send(result);
                touched
            }
            SessionEvent::Spectate {
                identity,
                connection,
                reply,
            } => {
                self.game.spectate(&identity, connection);
                let _ = reply.send(());
                true
            }
            SessionEvent::Attach {
                identity,
                connection,
                reply,
            } => {
                let known = self.game.attach(&identity, connection);
                let _ = reply.send(known);
                known
            }
            SessionEvent::Leave { identity, reply } => {
                let known = self.game.leave(&identity);
                let _ = reply.send(known);
                known
            }
            SessionEvent::Disconnect {
                identity,
                connection,
            } => self.game.disconnect(&identity, connection),
            SessionEvent::Start { identity, reply } => {
                let result = self.game.start(&identity);
                let touched = result.is_ok();
                let _ = reply.send(result);
                touched
            }
            SessionEvent::Command {
                identity,
                command,
                reply,
            } => {
                let result = self.game.command(&identity, command);
                let touched = result.is_ok();
                let _ = reply.send(result);
                touched
            }
            SessionEvent::Timer(ticket) => {
                if self
                    .timers
                    .get(&ticket.slot)
                    .is_some_and(|timer| timer.generation == ticket.generation)
                {
                    self.timers.remove(&ticket.slot);
                }
                self.game.on_timer(&ticket)
            }
            SessionEvent::RefundAll { reason, reply } => {
                let report = self.game.refund_all(reason);
                let touched = !report.is_empty();
                let _ = reply.send(report);
                touched
            }
            SessionEvent::RetryPending { reply } => {
                let report = self.game.retry_pending_credits();
                let _ = reply.send(report);
                false
            }
            SessionEvent::Snapshot { viewer, reply } => {
                if let Some(state) = self.projection(&viewer) {
                    let _ = reply.send(state);
                }
                false
            }
        };

        let faulted = self.check_integrity();
        self.apply_effects(touched || faulted);
    }

    fn check_integrity(&mut self) -> bool {
        let Err(err) = self.game.validate_invariants() else {
            return false;
        };
        error!(target: LOG_TARGET, game = %self.game.kind(), %err, "integrity fault, aborting round");
        let report = self.game.refund_all(AbortReason::IntegrityFault);
        if !report.pending.is_empty() {
            warn!(
                target: LOG_TARGET,
                game = %self.game.kind(),
                pending = report.total_pending(),
                "refunds left owing after integrity fault"
            );
        }
        true
    }

    fn apply_effects(&mut self, touched: bool) {
        let kind = self.game.kind();
        let effects = self.game.drain_effects();
        for request in effects.timers {
            self.schedule(request);
        }

        let delivered = !effects.deliveries.is_empty();
        for delivery in effects.deliveries {
            match delivery {
                Delivery::Viewer { identity, event } => {
                    self.broadcast
                        .to_viewer(&identity, &Envelope::game(kind, event));
                }
                Delivery::Table(event) => {
                    let envelope = Envelope::game(kind, event);
                    for viewer in self.game.viewers() {
                        self.broadcast.to_viewer(&viewer, &envelope);
                    }
                }
            }
        }

        if touched || delivered {
            self.broadcast_state();
        }
    }

    fn projection(&self, viewer: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self.game.project(viewer)) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(target: LOG_TARGET, game = %self.game.kind(), viewer, %err, "projection failed to serialize");
                None
            }
        }
    }

    fn broadcast_state(&self) {
        let kind = self.game.kind();
        for viewer in self.game.viewers() {
            if let Some(state) = self.projection(&viewer) {
                self.broadcast
                    .to_viewer(&viewer, &Envelope::game(kind, Outbound::State(state)));
            }
        }
    }

    fn schedule(&mut self, request: TimerRequest) {
        match request {
            TimerRequest::Arm { ticket, after } => {
                let slot = ticket.slot;
                let generation = ticket.generation;
                let task = spawn_timer(self.timer_sender.clone(), ticket, after);
                if let Some(previous) = self
                    .timers
                    .insert(slot, ScheduledTimer { generation, task })
                {
                    previous.task.abort();
                }
            }
            TimerRequest::Cancel(slot) => {
                if let Some(previous) = self.timers.remove(&slot) {
                    previous.task.abort();
                }
            }
        }
    }
}

fn spawn_timer(
    sender: mpsc::WeakSender<SessionEvent>,
    ticket: TimerTicket,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(sender) = sender.upgrade() {
            let _ = sender.send(SessionEvent::Timer(ticket)).await;
        }
    })
}
