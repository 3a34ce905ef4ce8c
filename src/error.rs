//! Error types for session operations.
//!
//! Every rejection carries a stable snake_case reason tag (see
//! [`Rejection::reason`]) which is what clients receive in `error` events.

use thiserror::Error;

/// Errors raised by the persistent balance store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The backing store could not be read or written.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// A debit would take the balance below zero.
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientFunds {
        /// Balance before the debit.
        available: u64,
        /// Amount that was requested.
        requested: u64,
    },
    /// A stored value could not be parsed.
    #[error("corrupt ledger entry `{0}`")]
    Corrupt(String),
}

/// Errors that can occur when joining a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Every seat is taken and the waitlist is at capacity.
    #[error("table and waitlist are full")]
    Full,
}

/// Errors that can occur when starting a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    /// The caller holds no seat.
    #[error("not seated at this table")]
    NotSeated,
    /// A round is already running.
    #[error("a round is already in progress")]
    InvalidState,
    /// Not enough seated players.
    #[error("at least {needed} seated players are required")]
    NotEnoughPlayers {
        /// Minimum number of seats required.
        needed: usize,
    },
    /// One deck cannot deal a hand to every seat.
    #[error("a deal needs {needed} cards, more than one deck holds")]
    NotEnoughCards {
        /// Cards the deal would take.
        needed: usize,
    },
}

/// Errors that can occur during betting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BetError {
    /// The caller holds no seat.
    #[error("not seated at this table")]
    NotSeated,
    /// Invalid game state for betting.
    #[error("invalid game state for betting")]
    InvalidState,
    /// The seat already placed its bet this round.
    #[error("bet already placed")]
    AlreadyBet,
    /// Bet amount is below the table minimum.
    #[error("bet is below the table minimum of {min}")]
    BelowMinimum {
        /// Table minimum.
        min: u64,
    },
    /// Insufficient funds.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// Bet exceeds the allowed fraction of the balance.
    #[error("bet exceeds the limit of {max}")]
    ExceedsLimit {
        /// Largest bet currently allowed.
        max: u64,
    },
    /// The ledger rejected or failed the debit.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors that can occur during player actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Invalid game state for this action.
    #[error("invalid game state for this action")]
    InvalidState,
    /// The caller holds no seat.
    #[error("not seated at this table")]
    NotSeated,
    /// Not this player's turn.
    #[error("not this player's turn")]
    NotYourTurn,
    /// Hand is not active.
    #[error("hand is not active")]
    HandNotActive,
    /// Cannot double down on this hand.
    #[error("cannot double down on this hand")]
    CannotDouble,
    /// Cannot split this hand.
    #[error("cannot split this hand")]
    CannotSplit,
    /// Maximum splits reached.
    #[error("maximum splits reached")]
    MaxSplitsReached,
    /// Insufficient funds for this action.
    #[error("insufficient funds for this action")]
    InsufficientFunds,
    /// No cards left in the shoe.
    #[error("no cards left in the shoe")]
    NoCards,
    /// The ledger rejected or failed the debit.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors for moves in the non-betting games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// No game is running, or the game is not accepting this move.
    #[error("invalid game state for this move")]
    InvalidState,
    /// The caller holds no seat.
    #[error("not seated at this table")]
    NotSeated,
    /// Not this player's turn.
    #[error("not this player's turn")]
    NotYourTurn,
    /// The column does not exist.
    #[error("no such column")]
    InvalidColumn,
    /// The column has no free cell.
    #[error("column is full")]
    ColumnFull,
    /// The hand holds no card at that index.
    #[error("no such card in hand")]
    CardNotFound,
    /// The card matches neither the suit nor the rank of the pile.
    #[error("card does not match the pile")]
    IllegalCard,
    /// The player already acted this round.
    #[error("already acted")]
    AlreadyActed,
}

/// Internal invariant violations. These are never caused by a client; the
/// session recovers by aborting the round with a full refund.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// The shoe ran out while cards were still owed.
    #[error("shoe exhausted mid-round")]
    ShoeExhausted,
    /// The escrow total drifted from the seats' stakes.
    #[error("escrow mismatch: {escrowed} escrowed, {staked} staked")]
    EscrowMismatch {
        /// Amount debited from the ledger this round.
        escrowed: u64,
        /// Sum of stakes on the seats.
        staked: u64,
    },
    /// The turn pointer addresses a hand that cannot act.
    #[error("turn points at seat {seat_index} hand {hand_index}, which cannot act")]
    StaleTurn {
        /// Seat index.
        seat_index: usize,
        /// Hand index.
        hand_index: usize,
    },
}

/// A rejected request, returned to the requester only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Join failed.
    #[error(transparent)]
    Join(#[from] JoinError),
    /// Start failed.
    #[error(transparent)]
    Start(#[from] StartError),
    /// Bet failed.
    #[error(transparent)]
    Bet(#[from] BetError),
    /// Card action failed.
    #[error(transparent)]
    Action(#[from] ActionError),
    /// Move failed.
    #[error(transparent)]
    Move(#[from] MoveError),
    /// The event does not exist for this game kind.
    #[error("`{0}` is not supported by this game")]
    Unsupported(&'static str),
}

impl Rejection {
    /// Stable reason tag sent to clients.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Join(JoinError::Full) => "full",
            Self::Start(err) => match err {
                StartError::NotSeated => "not_seated",
                StartError::InvalidState => "invalid_state",
                StartError::NotEnoughPlayers { .. } => "not_enough_players",
                StartError::NotEnoughCards { .. } => "not_enough_cards",
            },
            Self::Bet(err) => match err {
                BetError::NotSeated => "not_seated",
                BetError::InvalidState => "invalid_state",
                BetError::AlreadyBet => "already_bet",
                BetError::BelowMinimum { .. } => "below_minimum",
                BetError::InsufficientFunds => "insufficient_funds",
                BetError::ExceedsLimit { .. } => "exceeds_limit",
                BetError::Ledger(_) => "ledger_unavailable",
            },
            Self::Action(err) => match err {
                ActionError::InvalidState => "invalid_state",
                ActionError::NotSeated => "not_seated",
                ActionError::NotYourTurn => "not_your_turn",
                ActionError::HandNotActive => "hand_not_active",
                ActionError::CannotDouble => "cannot_double",
                ActionError::CannotSplit => "cannot_split",
                ActionError::MaxSplitsReached => "max_splits",
                ActionError::InsufficientFunds => "insufficient_funds",
                ActionError::NoCards => "no_cards",
                ActionError::Ledger(_) => "ledger_unavailable",
            },
            Self::Move(err) => match err {
                MoveError::InvalidState => "invalid_state",
                MoveError::NotSeated => "not_seated",
                MoveError::NotYourTurn => "not_your_turn",
                MoveError::InvalidColumn => "invalid_column",
                MoveError::ColumnFull => "column_full",
                MoveError::CardNotFound => "card_not_found",
                MoveError::IllegalCard => "illegal_card",
                MoveError::AlreadyActed => "already_acted",
            },
            Self::Unsupported(_) => "unsupported_event",
        }
    }
}
