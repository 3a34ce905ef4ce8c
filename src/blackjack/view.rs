//! What each viewer is shown.

use serde::Serialize;

use crate::card::Card;
use crate::hand::{Hand, HandStatus};
use crate::registry::Occupant;
use crate::result::RoundResult;
use crate::timer::TimerSlot;

use super::{BlackjackTable, Phase, Seat, SeatStatus};

/// A hand as shown to every viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandView {
    /// Cards in the hand.
    pub cards: Vec<Card>,
    /// Soft-ace score.
    pub score: u8,
    /// Hand status.
    pub status: HandStatus,
    /// Stake on the hand.
    pub bet: u64,
    /// Whether the hand was doubled.
    pub doubled: bool,
}

impl From<&Hand> for HandView {
    fn from(hand: &Hand) -> Self {
        Self {
            cards: hand.cards().to_vec(),
            score: hand.score(),
            status: hand.status(),
            bet: hand.bet(),
            doubled: hand.is_doubled(),
        }
    }
}

/// A seat as shown to every viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatView {
    /// Identity holding the seat.
    pub identity: String,
    /// Round status.
    pub status: SeatStatus,
    /// Hands, with the stake on each.
    pub hands: Vec<HandView>,
    /// Index of the hand being played.
    pub active_hand: usize,
    /// Sum of the stakes.
    pub total_bet: u64,
    /// Signed result of the last settled round.
    pub last_outcome: i64,
}

impl From<&Seat> for SeatView {
    fn from(seat: &Seat) -> Self {
        Self {
            identity: seat.identity().to_owned(),
            status: seat.status(),
            hands: seat.hands().iter().map(HandView::from).collect(),
            active_hand: seat.active_hand(),
            total_bet: seat.total_bet(),
            last_outcome: seat.last_outcome(),
        }
    }
}

/// The dealer's hand. A face-down card is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealerView {
    /// Cards, face-down ones as `None`.
    pub cards: Vec<Option<Card>>,
    /// Value of the face-up cards.
    pub value: u8,
}

/// One viewer's picture of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableView {
    /// Table phase.
    pub phase: Phase,
    /// Every seat.
    pub seats: Vec<SeatView>,
    /// The dealer.
    pub dealer: DealerView,
    /// Seat index holding the turn, while playing.
    pub turn_seat: Option<usize>,
    /// Hand index holding the turn, while playing.
    pub turn_hand: Option<usize>,
    /// Whether the viewer must act now.
    pub your_turn: bool,
    /// The viewer's seat index.
    pub your_seat: Option<usize>,
    /// The viewer's one-based waitlist position.
    pub waitlist_position: Option<usize>,
    /// Number of identities waiting for a seat.
    pub waitlist_length: usize,
    /// Number of spectators.
    pub spectators: usize,
    /// When the current turn times out, in epoch milliseconds.
    pub turn_deadline: Option<u64>,
    /// When betting closes, in epoch milliseconds.
    pub betting_deadline: Option<u64>,
    /// Table minimum.
    pub min_bet: u64,
    /// Result of the last settled round.
    pub last_result: Option<RoundResult>,
}

impl BlackjackTable {
    fn dealer_view(&self) -> DealerView {
        let hidden = matches!(self.phase, Phase::Betting | Phase::Playing);
        let cards = self.dealer.cards();
        if hidden && cards.len() >= 2 {
            let mut shown: Vec<Option<Card>> = Vec::with_capacity(cards.len());
            shown.push(cards.first().copied());
            shown.push(None);
            shown.extend(cards.iter().skip(2).copied().map(Some));
            DealerView {
                cards: shown,
                value: self.dealer.visible_value(),
            }
        } else {
            DealerView {
                cards: cards.iter().copied().map(Some).collect(),
                value: self.dealer.value(),
            }
        }
    }

    pub(super) fn view_for(&self, viewer: &str) -> TableView {
        let playing = self.phase == Phase::Playing;
        let your_seat = self.registry.seat_index(viewer);

        TableView {
            phase: self.phase,
            seats: self.registry.seats().iter().map(SeatView::from).collect(),
            dealer: self.dealer_view(),
            turn_seat: playing.then_some(self.turn.seat_index),
            turn_hand: playing.then_some(self.turn.hand_index),
            your_turn: self.current_player() == Some(viewer),
            your_seat,
            waitlist_position: self.registry.waitlist_position(viewer),
            waitlist_length: self.registry.waitlist().count(),
            spectators: self.registry.spectator_count(),
            turn_deadline: self.timers.deadline(TimerSlot::Turn),
            betting_deadline: self.timers.deadline(TimerSlot::Betting),
            min_bet: self.options.min_bet,
            last_result: self.last_result.clone(),
        }
    }
}
