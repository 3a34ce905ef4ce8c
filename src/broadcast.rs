//! Server-to-client events and the delivery interface.

use serde::Serialize;

use crate::registry::JoinOutcome;
use crate::session::{AbortReason, GameKind};
use crate::sync::Mutex;

/// A server-to-client event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
    /// Per-viewer projection of a session.
    State(serde_json::Value),
    /// A request was rejected. Only the requester receives this.
    Error {
        /// Stable reason tag.
        reason: &'static str,
        /// Human readable detail.
        message: String,
    },
    /// Result of a join.
    Joined(JoinOutcome),
    /// Table-wide announcement.
    Notice(TableNotice),
    /// Settlement of the viewer's round.
    Payout {
        /// Amount credited (stake plus allowed profit).
        amount: u64,
        /// Signed round result before the profit cap.
        delta: i64,
        /// Profit withheld by the daily cap.
        capped: u64,
        /// Balance after the credit.
        balance: u64,
    },
    /// The viewer's stake was returned because the round was aborted.
    Refund {
        /// Amount credited.
        amount: u64,
        /// Why the round ended.
        reason: AbortReason,
    },
    /// Clients holding unsent progress should send it now.
    FlushProgress,
    /// The server is going away; clients should reconnect elsewhere.
    Redirect {
        /// Human readable detail.
        reason: String,
    },
}

/// Table-wide announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableNotice {
    /// What happened.
    pub kind: NoticeKind,
    /// Human readable detail.
    pub message: String,
}

impl TableNotice {
    /// Creates a notice.
    #[must_use]
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Kinds of table-wide announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The round ended early and stakes were refunded.
    RoundAborted,
    /// A player left the table.
    PlayerLeft,
    /// A waitlisted player got a seat.
    PlayerSeated,
    /// Players who did not bet in time sit this round out.
    SittingOut,
    /// A game finished.
    GameOver,
}

/// An [`Outbound`] event tagged with the game it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Game kind, or `None` for server-wide events.
    pub game: Option<GameKind>,
    /// The event.
    #[serde(flatten)]
    pub event: Outbound,
}

impl Envelope {
    /// Wraps an event of `game`.
    #[must_use]
    pub const fn game(game: GameKind, event: Outbound) -> Self {
        Self {
            game: Some(game),
            event,
        }
    }

    /// Wraps a server-wide event.
    #[must_use]
    pub const fn server(event: Outbound) -> Self {
        Self { game: None, event }
    }
}

/// Pushes events to connected clients.
pub trait Broadcast: Send + Sync {
    /// Sends to the connection of `identity`, if it is connected.
    fn to_viewer(&self, identity: &str, envelope: &Envelope);
    /// Sends to every connection.
    fn to_all(&self, envelope: &Envelope);
}

/// A [`Broadcast`] that keeps everything it is asked to send.
#[derive(Debug, Default)]
pub struct Recorder {
    sent: Mutex<Vec<(Option<String>, Envelope)>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every recorded delivery. `None` marks a delivery
    /// to all connections.
    pub fn take(&self) -> Vec<(Option<String>, Envelope)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Removes and returns the events addressed to `identity` alone.
    pub fn take_for(&self, identity: &str) -> Vec<Envelope> {
        let mut sent = self.sent.lock();
        let (mine, rest): (Vec<_>, Vec<_>) = sent
            .drain(..)
            .partition(|(to, _)| to.as_deref() == Some(identity));
        *sent = rest;
        mine.into_iter().map(|(_, envelope)| envelope).collect()
    }
}

impl Broadcast for Recorder {
    fn to_viewer(&self, identity: &str, envelope: &Envelope) {
        self.sent
            .lock()
            .push((Some(identity.to_owned()), envelope.clone()));
    }

    fn to_all(&self, envelope: &Envelope) {
        self.sent.lock().push((None, envelope.clone()));
    }
}
