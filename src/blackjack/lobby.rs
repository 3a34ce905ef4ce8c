use tracing::{debug, info};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::deck::Deck;
use crate::error::JoinError;
use crate::hand::{Hand, HandStatus};
use crate::registry::{ConnectionId, Departure, JoinOutcome, Occupant};
use crate::session::AbortReason;
use crate::timer::TimerSlot;

use super::{BlackjackTable, LOG_TARGET, Phase, Seat, SeatStatus, TurnPosition};

impl BlackjackTable {
    pub(super) fn join_table(
        &mut self,
        identity: &str,
        connection: ConnectionId,
    ) -> Result<JoinOutcome, JoinError> {
        let status = self.new_seat_status();
        let outcome = self
            .registry
            .join(identity, connection, self.seat_open(), |entry| {
                Seat::new(entry, status)
            })?;

        if outcome == JoinOutcome::AlreadyIn {
            if let Some(seat) = self.registry.seat_mut(identity) {
                seat.departed = false;
            }
        }
        debug!(target: LOG_TARGET, identity, ?outcome, "join");
        Ok(outcome)
    }

    pub(super) fn leave_table(&mut self, identity: &str) -> bool {
        if self.phase == Phase::Resolving {
            if let Some(seat) = self.registry.seat_mut(identity) {
                // Settled at payout and dropped at the next reset.
                seat.departed = true;
                info!(target: LOG_TARGET, identity, "player left during resolution");
                return true;
            }
        }

        let Some(departure) = self.registry.leave(identity) else {
            return false;
        };
        let Departure::Seat { index, seat } = departure else {
            return true;
        };

        info!(target: LOG_TARGET, identity, phase = ?self.phase, "player left");
        self.outbox.table(Outbound::Notice(TableNotice::new(
            NoticeKind::PlayerLeft,
            format!("{identity} left the table"),
        )));

        match self.phase {
            Phase::Lobby | Phase::Payout => self.promote_waitlist(),
            Phase::Betting => self.left_while_betting(&seat),
            Phase::Playing => self.left_while_playing(index, &seat),
            Phase::Resolving => {}
        }
        true
    }

    fn left_while_betting(&mut self, seat: &Seat) {
        self.refund_stake(seat.identity(), seat.total_bet(), AbortReason::Disconnect);
        self.promote_waitlist();

        let waiting: Vec<SeatStatus> = self
            .registry
            .seats()
            .iter()
            .map(Seat::status)
            .filter(|status| matches!(status, SeatStatus::Betting | SeatStatus::Ready))
            .collect();

        if waiting.is_empty() {
            self.return_to_lobby();
        } else if waiting.iter().all(|status| *status == SeatStatus::Ready) {
            self.deal();
        }
    }

    fn left_while_playing(&mut self, index: usize, seat: &Seat) {
        // A busted hand has already lost; only live hands get their stake back.
        let lost: u64 = seat
            .hands()
            .iter()
            .filter(|hand| hand.status() == HandStatus::Bust)
            .map(Hand::bet)
            .sum();
        if lost > 0 {
            self.escrowed = self.escrowed.saturating_sub(lost);
            info!(target: LOG_TARGET, identity = seat.identity(), lost, "busted stake forfeited");
        }
        self.refund_stake(
            seat.identity(),
            seat.total_bet() - lost,
            AbortReason::Disconnect,
        );

        let anyone_staked = self
            .registry
            .seats()
            .iter()
            .any(|seat| seat.status.was_dealt() && seat.total_bet() > 0);
        if !anyone_staked {
            info!(target: LOG_TARGET, "no staked seat left, aborting round");
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::RoundAborted,
                "every player in the round left",
            )));
            self.return_to_lobby();
            return;
        }

        if index < self.turn.seat_index {
            self.turn.seat_index -= 1;
        } else if index == self.turn.seat_index {
            self.seek_turn(TurnPosition {
                seat_index: index,
                hand_index: 0,
            });
        }
    }

    /// Opens a betting round with a fresh shoe.
    pub(super) fn open_betting(&mut self) {
        self.deck = Deck::shuffled(self.options.decks, &mut self.rng);
        self.dealer.clear();
        self.last_result = None;
        for seat in self.registry.seats_mut() {
            seat.clear_round();
            seat.status = SeatStatus::Betting;
        }
        self.phase = Phase::Betting;
        let now = self.now_ms();
        self.timers
            .arm(TimerSlot::Betting, None, self.options.betting_time, now);
        info!(target: LOG_TARGET, seats = self.registry.len(), "betting opened");
    }

    /// Clears every trace of the round; seats, waitlist and spectators stay.
    pub(super) fn reset_round(&mut self) {
        self.timers.cancel_all();
        self.registry.retain_seats(|seat| !seat.departed);
        for seat in self.registry.seats_mut() {
            seat.clear_round();
        }
        self.deck = Deck::default();
        self.dealer.clear();
        self.turn = TurnPosition::default();
        self.escrowed = 0;
    }

    pub(super) fn return_to_lobby(&mut self) {
        self.reset_round();
        self.phase = Phase::Lobby;
        self.promote_waitlist();
        debug!(target: LOG_TARGET, "back to lobby");
    }

    pub(super) fn promote_waitlist(&mut self) {
        if !self.seat_open() {
            return;
        }
        let status = self.new_seat_status();
        let promoted = self
            .registry
            .promote(|entry| Seat::new(entry, status));
        for identity in promoted {
            info!(target: LOG_TARGET, identity, "promoted from waitlist");
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::PlayerSeated,
                format!("{identity} took a seat"),
            )));
        }
    }

    /// Ends the pause after payout and moves on to the next round.
    pub(super) fn cooldown_elapsed(&mut self) -> bool {
        if self.phase != Phase::Payout {
            return false;
        }

        self.retry_credits();
        self.reset_round();
        self.phase = Phase::Lobby;
        self.promote_waitlist();

        if self.options.auto_restart && !self.registry.is_empty() {
            self.open_betting();
        }
        true
    }
}
