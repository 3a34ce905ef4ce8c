use tracing::{debug, info};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::error::{BetError, IntegrityError, LedgerError};
use crate::hand::Hand;
use crate::registry::Occupant;
use crate::timer::TimerSlot;

use super::{BlackjackTable, LOG_TARGET, Phase, SeatStatus, TurnPosition};

impl BlackjackTable {
    /// Places a bet for `identity`.
    ///
    /// The ledger debit happens first; only once it succeeded is the stake
    /// put on the seat and counted as escrowed. When every seat in the round
    /// has bet, the cards are dealt at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not betting, the caller is not
    /// seated or already bet, the amount is outside the table limits, or the
    /// ledger fails the debit.
    pub fn place_bet(&mut self, identity: &str, amount: u64) -> Result<(), BetError> {
        if self.phase != Phase::Betting {
            return Err(BetError::InvalidState);
        }

        let seat = self.registry.seat(identity).ok_or(BetError::NotSeated)?;
        match seat.status {
            SeatStatus::Betting => {}
            SeatStatus::Ready => return Err(BetError::AlreadyBet),
            _ => return Err(BetError::InvalidState),
        }

        if amount < self.options.min_bet {
            return Err(BetError::BelowMinimum {
                min: self.options.min_bet,
            });
        }

        let balance = self.ledger.balance(identity)?;
        if amount > balance {
            return Err(BetError::InsufficientFunds);
        }
        let max = self.options.max_bet(balance);
        if amount > max {
            return Err(BetError::ExceedsLimit { max });
        }

        match self.ledger.debit(identity, amount) {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds { .. }) => return Err(BetError::InsufficientFunds),
            Err(err) => return Err(err.into()),
        }

        if let Some(seat) = self.registry.seat_mut(identity) {
            seat.hands = vec![Hand::new(amount)];
            seat.status = SeatStatus::Ready;
        }
        self.escrowed += amount;
        debug!(target: LOG_TARGET, identity, amount, "bet placed");

        let everyone_bet = self
            .registry
            .seats()
            .iter()
            .all(|seat| seat.status != SeatStatus::Betting);
        if everyone_bet {
            self.deal();
        }
        Ok(())
    }

    /// Closes betting: whoever has not bet sits the round out.
    pub(super) fn betting_timeout(&mut self) -> bool {
        if self.phase != Phase::Betting {
            return false;
        }

        let mut sitting_out = Vec::new();
        for seat in self.registry.seats_mut() {
            if seat.status == SeatStatus::Betting {
                seat.status = SeatStatus::Idle;
                sitting_out.push(seat.identity().to_owned());
            }
        }
        if !sitting_out.is_empty() {
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::SittingOut,
                format!("{} sit this round out", sitting_out.join(", ")),
            )));
        }

        let anyone_bet = self
            .registry
            .seats()
            .iter()
            .any(|seat| seat.status == SeatStatus::Ready);
        if anyone_bet {
            self.deal();
        } else {
            info!(target: LOG_TARGET, "no bets placed, back to lobby");
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::RoundAborted,
                "no bets were placed",
            )));
            self.return_to_lobby();
        }
        true
    }

    /// Deals two cards to every seat that bet and two to the dealer, the
    /// second one face down.
    pub(super) fn deal(&mut self) {
        self.timers.cancel(TimerSlot::Betting);

        let mut order = Vec::new();
        for (index, seat) in self.registry.seats_mut().iter_mut().enumerate() {
            match seat.status {
                SeatStatus::Ready => {
                    seat.status = SeatStatus::Playing;
                    order.push(index);
                }
                SeatStatus::Betting => seat.status = SeatStatus::Idle,
                _ => {}
            }
        }

        if let Err(fault) = self.deal_cards(&order) {
            self.fault(&fault);
            return;
        }

        self.phase = Phase::Playing;
        info!(target: LOG_TARGET, players = order.len(), escrowed = self.escrowed, "cards dealt");
        self.seek_turn(TurnPosition::default());
    }

    fn deal_cards(&mut self, order: &[usize]) -> Result<(), IntegrityError> {
        self.dealer.clear();
        for _ in 0..2 {
            for &index in order {
                let card = self.draw()?;
                if let Some(hand) = self
                    .registry
                    .seats_mut()
                    .get_mut(index)
                    .and_then(|seat| seat.hands.first_mut())
                {
                    hand.add_card(card);
                }
            }
            let card = self.draw()?;
            self.dealer.add_card(card);
        }
        Ok(())
    }
}
