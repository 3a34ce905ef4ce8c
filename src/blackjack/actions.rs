use tracing::debug;

use crate::error::{ActionError, IntegrityError, LedgerError};
use crate::hand::Hand;
use crate::registry::Occupant;
use crate::timer::{TimerSlot, TimerTicket, TurnTarget};

use super::{BlackjackTable, LOG_TARGET, Phase, SeatStatus, TurnPosition};

impl BlackjackTable {
    /// Checks that `identity` holds the turn and returns the position of its
    /// active hand.
    fn ensure_turn(&self, identity: &str) -> Result<TurnPosition, ActionError> {
        if self.phase != Phase::Playing {
            return Err(ActionError::InvalidState);
        }
        let seat_index = self
            .registry
            .seat_index(identity)
            .ok_or(ActionError::NotSeated)?;
        if seat_index != self.turn.seat_index {
            return Err(ActionError::NotYourTurn);
        }

        if !self.current_hand().is_some_and(Hand::is_playing) {
            return Err(ActionError::HandNotActive);
        }
        Ok(self.turn)
    }

    fn current_hand(&self) -> Option<&Hand> {
        self.registry
            .seats()
            .get(self.turn.seat_index)
            .and_then(|seat| seat.hands.get(self.turn.hand_index))
    }

    fn current_hand_mut(&mut self) -> Option<&mut Hand> {
        let TurnPosition {
            seat_index,
            hand_index,
        } = self.turn;
        self.registry
            .seats_mut()
            .get_mut(seat_index)
            .and_then(|seat| seat.hands.get_mut(hand_index))
    }

    /// Moves the turn on once the current hand is resolved.
    fn after_action(&mut self) {
        if !self.current_hand().is_some_and(Hand::is_playing) {
            self.seek_turn(self.turn);
        }
    }

    /// Player action: Hit (draw a card).
    ///
    /// A hand that busts or reaches 21 is resolved and the turn moves on.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not playing, it is not the caller's
    /// turn, or the shoe is empty.
    pub fn hit(&mut self, identity: &str) -> Result<(), ActionError> {
        self.ensure_turn(identity)?;

        let card = match self.draw() {
            Ok(card) => card,
            Err(fault) => {
                self.fault(&fault);
                return Err(ActionError::NoCards);
            }
        };
        if let Some(hand) = self.current_hand_mut() {
            hand.add_card(card);
            debug!(target: LOG_TARGET, identity, card = card.label(), score = hand.score(), "hit");
        }

        self.after_action();
        Ok(())
    }

    /// Player action: Stand (keep current hand).
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not playing or it is not the caller's
    /// turn.
    pub fn stand(&mut self, identity: &str) -> Result<(), ActionError> {
        self.ensure_turn(identity)?;

        if let Some(hand) = self.current_hand_mut() {
            hand.stand();
        }
        debug!(target: LOG_TARGET, identity, "stand");

        self.after_action();
        Ok(())
    }

    /// Player action: Double down (double bet, receive one card, then stand).
    ///
    /// The extra stake is debited before anything else changes.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not the caller's turn, the hand does not
    /// hold exactly two cards, the shoe is empty, or the ledger refuses the
    /// extra stake.
    pub fn double_down(&mut self, identity: &str) -> Result<(), ActionError> {
        self.ensure_turn(identity)?;

        let bet = match self.current_hand() {
            Some(hand) if hand.cards().len() == 2 => hand.bet(),
            _ => return Err(ActionError::CannotDouble),
        };
        if self.deck.remaining() == 0 {
            self.fault(&IntegrityError::ShoeExhausted);
            return Err(ActionError::NoCards);
        }

        self.debit_extra_stake(identity, bet)?;

        let card = match self.draw() {
            Ok(card) => card,
            Err(fault) => {
                self.fault(&fault);
                return Err(ActionError::NoCards);
            }
        };
        if let Some(hand) = self.current_hand_mut() {
            hand.double_bet();
            hand.add_card(card);
            hand.stand();
            debug!(target: LOG_TARGET, identity, bet = hand.bet(), score = hand.score(), "double");
        }

        self.after_action();
        Ok(())
    }

    /// Player action: Split (split a pair into two hands).
    ///
    /// Allowed once per seat. A second stake equal to the first is debited,
    /// the second card moves to a new hand, and each hand receives one card.
    /// Play continues on the first hand.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not the caller's turn, the seat already
    /// split, the hand is not a pair, the shoe is short, or the ledger
    /// refuses the second stake.
    pub fn split(&mut self, identity: &str) -> Result<(), ActionError> {
        let position = self.ensure_turn(identity)?;

        let hands = self
            .registry
            .seats()
            .get(position.seat_index)
            .map_or(0, |seat| seat.hands.len());
        if hands > 1 {
            return Err(ActionError::MaxSplitsReached);
        }
        let bet = match self.current_hand() {
            Some(hand) if hand.is_pair() => hand.bet(),
            _ => return Err(ActionError::CannotSplit),
        };
        if self.deck.remaining() < 2 {
            self.fault(&IntegrityError::ShoeExhausted);
            return Err(ActionError::NoCards);
        }

        self.debit_extra_stake(identity, bet)?;

        let (first, second) = match (self.draw(), self.draw()) {
            (Ok(first), Ok(second)) => (first, second),
            (Err(fault), _) | (_, Err(fault)) => {
                self.fault(&fault);
                return Err(ActionError::NoCards);
            }
        };
        if let Some(seat) = self.registry.seats_mut().get_mut(position.seat_index) {
            let moved = seat
                .hands
                .get_mut(position.hand_index)
                .and_then(Hand::take_split_card);
            if let Some(moved) = moved {
                let mut sibling = Hand::from_split(moved, bet);
                sibling.add_card(second);
                seat.hands.insert(position.hand_index + 1, sibling);
            }
            if let Some(hand) = seat.hands.get_mut(position.hand_index) {
                hand.add_card(first);
            }
        }
        debug!(target: LOG_TARGET, identity, bet, "split");

        self.after_action();
        Ok(())
    }

    fn debit_extra_stake(&mut self, identity: &str, amount: u64) -> Result<(), ActionError> {
        match self.ledger.debit(identity, amount) {
            Ok(_) => {
                self.escrowed += amount;
                Ok(())
            }
            Err(LedgerError::InsufficientFunds { .. }) => Err(ActionError::InsufficientFunds),
            Err(err) => Err(err.into()),
        }
    }

    /// Points the turn at the first unresolved hand at or after `from`, in
    /// seating order, and re-arms the turn timer for it. Past the last seat
    /// the dealer plays.
    pub(super) fn seek_turn(&mut self, from: TurnPosition) {
        let mut next = None;
        for (seat_index, seat) in self
            .registry
            .seats_mut()
            .iter_mut()
            .enumerate()
            .skip(from.seat_index)
        {
            if seat.status != SeatStatus::Playing {
                continue;
            }
            let first = if seat_index == from.seat_index {
                from.hand_index
            } else {
                0
            };
            let found = seat
                .hands
                .iter()
                .enumerate()
                .skip(first)
                .find(|(_, hand)| hand.is_playing())
                .map(|(index, _)| index);
            if let Some(hand_index) = found {
                seat.active_hand = hand_index;
                next = Some((
                    TurnPosition {
                        seat_index,
                        hand_index,
                    },
                    seat.identity().to_owned(),
                ));
                break;
            }
            if !seat.hands.iter().any(Hand::is_playing) {
                seat.status = SeatStatus::Finished;
            }
        }

        match next {
            Some((position, identity)) => {
                self.turn = position;
                let now = self.now_ms();
                let target = TurnTarget {
                    identity,
                    hand: position.hand_index,
                };
                self.timers
                    .arm(TimerSlot::Turn, Some(target), self.options.turn_time, now);
            }
            None => {
                self.turn = TurnPosition {
                    seat_index: self.registry.len(),
                    hand_index: 0,
                };
                self.begin_resolving();
            }
        }
    }

    /// Stands the hand a turn timer was armed for, if it still holds the
    /// turn.
    pub(super) fn turn_timeout(&mut self, ticket: &TimerTicket) -> bool {
        let Some(target) = &ticket.target else {
            return false;
        };
        let current = self.current_player() == Some(target.identity.as_str())
            && self.turn.hand_index == target.hand;
        if !current {
            return false;
        }

        debug!(target: LOG_TARGET, identity = %target.identity, hand = target.hand, "turn timed out");
        self.stand(&target.identity).is_ok()
    }
}
