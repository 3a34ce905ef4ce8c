//! The interface every game session implements.
//!
//! A session is plain synchronous state. It is driven by exactly one
//! [`SessionActor`](crate::runtime::SessionActor), which applies one event at a
//! time and then collects the side effects the session queued: timer requests
//! for the scheduler and events for connected clients.

use serde::{Deserialize, Serialize};

use crate::broadcast::Outbound;
use crate::error::{IntegrityError, Rejection};
use crate::registry::{ConnectionId, JoinOutcome};
use crate::timer::{TimerRequest, TimerTicket};

/// The games served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Card game with betting against a dealer.
    Blackjack,
    /// Shedding card game with a draw pile.
    Stack,
    /// Four-in-a-row.
    Grid,
    /// Reaction-speed duel.
    Duel,
}

impl GameKind {
    /// Every game kind, in routing order.
    pub const ALL: [Self; 4] = [Self::Blackjack, Self::Stack, Self::Grid, Self::Duel];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blackjack => "blackjack",
            Self::Stack => "stack",
            Self::Grid => "grid",
            Self::Duel => "duel",
        }
    }
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a round was aborted and its stakes returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Every staked player left or lost their connection.
    Disconnect,
    /// The server is shutting down.
    Shutdown,
    /// The session found its own state inconsistent.
    IntegrityFault,
}

/// In-game requests after the lobby stage. Each game accepts its own subset
/// and rejects the rest as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameCommand {
    /// Place a bet.
    Bet {
        /// Amount to stake.
        amount: u64,
    },
    /// Take a card.
    Hit,
    /// Keep the hand.
    Stand,
    /// Double the stake for exactly one more card.
    Double,
    /// Split a pair into two hands.
    Split,
    /// Play the card at this index of the hand.
    Play {
        /// Index into the caller's hand.
        card: usize,
    },
    /// Take a card from the draw pile.
    Draw,
    /// Drop a disc into a column.
    Drop {
        /// Column index.
        column: usize,
    },
    /// React to the go signal.
    React,
}

impl GameCommand {
    /// Wire name of the command.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bet { .. } => "bet",
            Self::Hit => "hit",
            Self::Stand => "stand",
            Self::Double => "double",
            Self::Split => "split",
            Self::Play { .. } => "play",
            Self::Draw => "draw",
            Self::Drop { .. } => "drop",
            Self::React => "react",
        }
    }

    /// The rejection for a command the game does not know.
    #[must_use]
    pub const fn unsupported(self) -> Rejection {
        Rejection::Unsupported(self.name())
    }
}

/// A client event queued by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// For one identity only.
    Viewer {
        /// Recipient.
        identity: String,
        /// Event.
        event: Outbound,
    },
    /// For every viewer of the session.
    Table(Outbound),
}

/// Client events a session has queued but not yet handed out.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    /// Queues an event for `identity`.
    pub fn viewer(&mut self, identity: &str, event: Outbound) {
        self.deliveries.push(Delivery::Viewer {
            identity: identity.to_owned(),
            event,
        });
    }

    /// Queues an event for every viewer.
    pub fn table(&mut self, event: Outbound) {
        self.deliveries.push(Delivery::Table(event));
    }

    /// Takes the queued events.
    pub fn drain(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }
}

/// Side effects produced by one event.
#[derive(Debug, Default)]
pub struct Effects {
    /// Timers to arm or cancel, in order.
    pub timers: Vec<TimerRequest>,
    /// Events for clients, in order.
    pub deliveries: Vec<Delivery>,
}

/// One credit made or owed while unwinding a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credit {
    /// Ledger key.
    pub identity: String,
    /// Amount.
    pub amount: u64,
}

/// What a refund or credit retry did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefundReport {
    /// Credits the ledger accepted.
    pub credited: Vec<Credit>,
    /// Credits the ledger failed; they stay queued for a later retry.
    pub pending: Vec<Credit>,
}

impl RefundReport {
    /// Sum of the accepted credits.
    #[must_use]
    pub fn total_credited(&self) -> u64 {
        self.credited.iter().map(|credit| credit.amount).sum()
    }

    /// Sum of the credits still owed.
    #[must_use]
    pub fn total_pending(&self) -> u64 {
        self.pending.iter().map(|credit| credit.amount).sum()
    }

    /// Returns whether nothing was credited or left owing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credited.is_empty() && self.pending.is_empty()
    }

    /// Appends another report.
    pub fn merge(&mut self, other: Self) {
        self.credited.extend(other.credited);
        self.pending.extend(other.pending);
    }
}

/// A game session.
///
/// Every method runs to completion on the owning actor; none of them may
/// block on anything but the synchronous [`Ledger`](crate::Ledger).
pub trait GameSession: Send + 'static {
    /// Per-viewer projection of the state.
    type View: Serialize;

    /// Which game this is.
    fn kind(&self) -> GameKind;

    /// Seats or queues `identity`.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the table and waitlist are full.
    fn join(&mut self, identity: &str, connection: ConnectionId) -> Result<JoinOutcome, Rejection>;

    /// Adds `identity` as a spectator.
    fn spectate(&mut self, identity: &str, connection: ConnectionId);

    /// Removes `identity`, unwinding its part in any running round. Returns
    /// whether the identity was known.
    fn leave(&mut self, identity: &str) -> bool;

    /// Binds `identity` to a new connection after a reconnect, without
    /// touching game state. Returns whether the identity was known.
    fn attach(&mut self, identity: &str, connection: ConnectionId) -> bool;

    /// Connection currently stored for `identity`.
    fn connection_of(&self, identity: &str) -> Option<ConnectionId>;

    /// A transport connection closed. This is a leave only if it is still the
    /// connection stored for `identity`; an older socket closing after a
    /// reconnect changes nothing.
    fn disconnect(&mut self, identity: &str, connection: ConnectionId) -> bool {
        if self.connection_of(identity) == Some(connection) {
            self.leave(identity)
        } else {
            false
        }
    }

    /// Starts a round.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the caller is not seated or the session is
    /// not idle.
    fn start(&mut self, identity: &str) -> Result<(), Rejection>;

    /// Applies an in-game command.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the command is not valid right now; the
    /// session is unchanged.
    fn command(&mut self, identity: &str, command: GameCommand) -> Result<(), Rejection>;

    /// Handles a fired timer. Returns `false` for a stale ticket, in which
    /// case nothing changed.
    fn on_timer(&mut self, ticket: &TimerTicket) -> bool;

    /// Aborts any running round, returning every stake in full.
    /// Idempotent: an idle session returns an empty report.
    fn refund_all(&mut self, reason: AbortReason) -> RefundReport;

    /// Retries credits the ledger failed earlier.
    fn retry_pending_credits(&mut self) -> RefundReport {
        RefundReport::default()
    }

    /// Checks internal invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    fn validate_invariants(&self) -> Result<(), IntegrityError> {
        Ok(())
    }

    /// Identities that receive this session's state.
    fn viewers(&self) -> Vec<String>;

    /// The state as `viewer` may see it.
    fn project(&self, viewer: &str) -> Self::View;

    /// Takes the side effects queued since the last call.
    fn drain_effects(&mut self) -> Effects;
}
