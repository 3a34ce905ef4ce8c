//! Table state types.

use serde::Serialize;

/// Table phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for someone to start a round.
    Lobby,
    /// Accepting bets for the next round.
    Betting,
    /// Waiting for player actions.
    Playing,
    /// Dealer plays out their hand.
    Resolving,
    /// Round has been settled; the next one opens after the cooldown.
    Payout,
}

impl Phase {
    /// Returns whether stakes may be held in escrow.
    #[must_use]
    pub const fn holds_stakes(self) -> bool {
        matches!(self, Self::Betting | Self::Playing | Self::Resolving)
    }
}

/// Represents the current turn position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TurnPosition {
    /// Index into the seats.
    pub seat_index: usize,
    /// Index into the seat's hands (for splits).
    pub hand_index: usize,
}

/// Where a seat stands in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    /// Not taking part in the current round.
    Idle,
    /// Expected to bet.
    Betting,
    /// Bet placed, waiting for the deal.
    Ready,
    /// Holds at least one unresolved hand.
    Playing,
    /// Every hand is resolved.
    Finished,
}

impl SeatStatus {
    /// Returns whether the seat was dealt into the running round.
    #[must_use]
    pub const fn was_dealt(self) -> bool {
        matches!(self, Self::Playing | Self::Finished)
    }
}
