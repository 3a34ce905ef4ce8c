use tracing::{debug, info};

use crate::hand::HandStatus;
use crate::registry::Occupant;
use crate::result::resolve_round;
use crate::timer::TimerSlot;

use super::{BlackjackTable, LOG_TARGET, Phase, Seat};

impl BlackjackTable {
    /// Checks if any dealt hand is still standing against the dealer.
    fn any_live_hands(&self) -> bool {
        self.registry
            .seats()
            .iter()
            .filter(|seat| seat.status.was_dealt())
            .flat_map(Seat::hands)
            .any(|hand| hand.status() != HandStatus::Bust)
    }

    fn dealer_must_draw(&self) -> bool {
        self.dealer.must_draw() && self.any_live_hands()
    }

    /// Reveals the hole card and lets the dealer play.
    pub(super) fn begin_resolving(&mut self) {
        self.timers.cancel(TimerSlot::Turn);
        self.phase = Phase::Resolving;
        self.dealer.reveal_hole();
        debug!(target: LOG_TARGET, dealer = self.dealer.value(), "hole card revealed");
        self.play_dealer();
    }

    /// Draws dealer cards until the dealer stands. With a pacing delay each
    /// card waits for its own timer.
    fn play_dealer(&mut self) {
        while self.dealer_must_draw() {
            if !self.options.dealer_delay.is_zero() {
                let now = self.now_ms();
                self.timers
                    .arm(TimerSlot::Reveal, None, self.options.dealer_delay, now);
                return;
            }
            if !self.dealer_draw() {
                return;
            }
        }
        self.finish_round();
    }

    fn dealer_draw(&mut self) -> bool {
        match self.draw() {
            Ok(card) => {
                self.dealer.add_card(card);
                debug!(target: LOG_TARGET, card = card.label(), dealer = self.dealer.value(), "dealer draws");
                true
            }
            Err(fault) => {
                self.fault(&fault);
                false
            }
        }
    }

    /// Paced dealer card.
    pub(super) fn reveal_next(&mut self) -> bool {
        if self.phase != Phase::Resolving {
            return false;
        }
        if self.dealer_draw() {
            self.play_dealer();
        }
        true
    }

    /// Resolves every hand, settles the seats and starts the cooldown.
    fn finish_round(&mut self) {
        let result = resolve_round(
            self.registry
                .seats()
                .iter()
                .filter(|seat| seat.status.was_dealt())
                .map(|seat| (seat.identity(), seat.hands())),
            &self.dealer,
            self.options.blackjack_payout_percent,
        );
        self.phase = Phase::Payout;
        info!(
            target: LOG_TARGET,
            dealer = result.dealer_value,
            dealer_bust = result.dealer_bust,
            seats = result.seats.len(),
            "round resolved"
        );

        self.settle_round(&result);
        self.last_result = Some(result);

        let now = self.now_ms();
        self.timers
            .arm(TimerSlot::Cooldown, None, self.options.cooldown, now);
    }
}
