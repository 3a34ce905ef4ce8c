//! The stacking card game.
//!
//! Players take turns putting a card on the discard pile that matches its
//! top card in suit or rank, or drawing one. The first to empty their hand
//! wins. When the draw pile runs dry the discards (all but the top card) are
//! shuffled back in.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::card::{Card, DECK_SIZE};
use crate::deck::Deck;
use crate::error::{MoveError, Rejection, StartError};
use crate::options::StackOptions;
use crate::registry::{ConnectionId, Departure, Entry, JoinOutcome, Occupant, Registry};
use crate::session::{AbortReason, Effects, GameCommand, GameKind, GameSession, Outbox, RefundReport};
use crate::timer::{Clock, TimerSlot, TimerTicket, Timers, TurnTarget};

const LOG_TARGET: &str = "parlor::stack";
const MIN_PLAYERS: usize = 2;

/// Phase of the stacking game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackPhase {
    /// Waiting for a start.
    Lobby,
    /// Cards are being played.
    Playing,
    /// Someone won; the table clears after the cooldown.
    Finished,
}

/// A seated player and their cards.
#[derive(Debug, Clone)]
pub struct StackSeat {
    identity: String,
    connection: ConnectionId,
    hand: Vec<Card>,
}

impl StackSeat {
    /// Cards held.
    #[must_use]
    pub fn hand(&self) -> &[Card] {
        &self.hand
    }
}

impl From<Entry> for StackSeat {
    fn from(entry: Entry) -> Self {
        Self {
            identity: entry.identity,
            connection: entry.connection,
            hand: Vec::new(),
        }
    }
}

impl Occupant for StackSeat {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn connection(&self) -> ConnectionId {
        self.connection
    }

    fn rebind(&mut self, connection: ConnectionId) {
        self.connection = connection;
    }
}

/// An opponent as everyone sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSeatView {
    /// Identity.
    pub identity: String,
    /// Number of cards held.
    pub cards: usize,
}

/// One viewer's picture of the stacking game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackView {
    /// Phase.
    pub phase: StackPhase,
    /// Every seat, hands hidden.
    pub seats: Vec<StackSeatView>,
    /// The viewer's own cards, if seated.
    pub your_hand: Option<Vec<Card>>,
    /// Face-up card of the discard pile.
    pub top: Option<Card>,
    /// Cards left to draw.
    pub draw_pile: usize,
    /// Identity holding the turn.
    pub turn: Option<String>,
    /// Whether the viewer must act now.
    pub your_turn: bool,
    /// When the current turn times out, in epoch milliseconds.
    pub turn_deadline: Option<u64>,
    /// The viewer's one-based waitlist position.
    pub waitlist_position: Option<usize>,
    /// Winner of the last game.
    pub winner: Option<String>,
}

/// The stacking game session.
pub struct StackGame {
    options: StackOptions,
    phase: StackPhase,
    registry: Registry<StackSeat>,
    deck: Deck,
    turn: usize,
    winner: Option<String>,
    timers: Timers,
    outbox: Outbox,
    rng: ChaCha8Rng,
    clock: Arc<dyn Clock>,
}

impl StackGame {
    /// Creates a session. `seed` drives every shuffle.
    #[must_use]
    pub fn new(options: StackOptions, seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Registry::new(options.seats, options.waitlist),
            options,
            phase: StackPhase::Lobby,
            deck: Deck::default(),
            turn: 0,
            winner: None,
            timers: Timers::new(),
            outbox: Outbox::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> StackPhase {
        self.phase
    }

    /// Returns the seat held by `identity`.
    #[must_use]
    pub fn seat(&self, identity: &str) -> Option<&StackSeat> {
        self.registry.seat(identity)
    }

    /// Face-up card of the discard pile.
    #[must_use]
    pub fn top_card(&self) -> Option<Card> {
        self.deck.top_discard().copied()
    }

    /// Cards left in the draw pile.
    #[must_use]
    pub fn draw_pile(&self) -> usize {
        self.deck.remaining()
    }

    /// Identity holding the turn.
    #[must_use]
    pub fn current_player(&self) -> Option<&str> {
        if self.phase != StackPhase::Playing {
            return None;
        }
        self.registry.seats().get(self.turn).map(Occupant::identity)
    }

    /// Winner of the last game.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// The armed ticket of `slot`.
    #[must_use]
    pub fn timer(&self, slot: TimerSlot) -> Option<&TimerTicket> {
        self.timers.ticket(slot)
    }

    /// Replaces the shoe with one that deals `draws` in order. Takes effect
    /// for the next [`start`](GameSession::start).
    pub fn stack_deck(&mut self, draws: &[Card]) {
        self.deck = Deck::stacked(draws);
    }

    fn deal(&mut self) -> bool {
        if self.deck.remaining() == 0 {
            self.deck = Deck::shuffled(1, &mut self.rng);
        }
        for _ in 0..self.options.hand_size {
            for seat in self.registry.seats_mut() {
                let Some(card) = self.deck.draw() else {
                    return false;
                };
                seat.hand.push(card);
            }
        }
        match self.deck.draw() {
            Some(card) => {
                self.deck.discard(card);
                true
            }
            None => false,
        }
    }

    fn arm_turn(&mut self) {
        let Some(identity) = self.current_player().map(str::to_owned) else {
            return;
        };
        let now = self.clock.now_ms();
        let target = TurnTarget { identity, hand: 0 };
        self.timers
            .arm(TimerSlot::Turn, Some(target), self.options.turn_time, now);
    }

    fn advance(&mut self) {
        let seats = self.registry.len();
        if seats > 0 {
            self.turn = (self.turn + 1) % seats;
        }
        self.arm_turn();
    }

    fn ensure_turn(&self, identity: &str) -> Result<usize, MoveError> {
        if self.phase != StackPhase::Playing {
            return Err(MoveError::InvalidState);
        }
        let index = self
            .registry
            .seat_index(identity)
            .ok_or(MoveError::NotSeated)?;
        if index != self.turn {
            return Err(MoveError::NotYourTurn);
        }
        Ok(index)
    }

    /// Puts the card at `card` in the caller's hand on the pile.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not the caller's turn, there is no such
    /// card, or it matches neither suit nor rank of the top card.
    pub fn play(&mut self, identity: &str, card: usize) -> Result<(), MoveError> {
        let index = self.ensure_turn(identity)?;
        let top = self.deck.top_discard().copied();
        let seat = self
            .registry
            .seats_mut()
            .get_mut(index)
            .ok_or(MoveError::NotSeated)?;
        let played = *seat.hand.get(card).ok_or(MoveError::CardNotFound)?;
        if let Some(top) = top {
            if played.suit != top.suit && played.rank != top.rank {
                return Err(MoveError::IllegalCard);
            }
        }

        seat.hand.remove(card);
        let emptied = seat.hand.is_empty();
        self.deck.discard(played);
        debug!(target: LOG_TARGET, identity, card = played.label(), "card played");

        if emptied {
            self.finish(Some(identity.to_owned()));
        } else {
            self.advance();
        }
        Ok(())
    }

    /// Takes one card from the draw pile and passes the turn. With nothing
    /// left to draw the turn just passes.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not the caller's turn.
    pub fn draw(&mut self, identity: &str) -> Result<(), MoveError> {
        let index = self.ensure_turn(identity)?;
        let card = self.deck.draw_or_reshuffle(&mut self.rng);
        if let (Some(card), Some(seat)) = (card, self.registry.seats_mut().get_mut(index)) {
            seat.hand.push(card);
        }
        debug!(target: LOG_TARGET, identity, drew = card.is_some(), "card drawn");
        self.advance();
        Ok(())
    }

    fn finish(&mut self, winner: Option<String>) {
        self.timers.cancel(TimerSlot::Turn);
        self.phase = StackPhase::Finished;
        let message = winner
            .as_deref()
            .map_or_else(|| "game over".to_owned(), |w| format!("{w} wins"));
        info!(target: LOG_TARGET, winner = ?winner, "game over");
        self.outbox
            .table(Outbound::Notice(TableNotice::new(NoticeKind::GameOver, message)));
        self.winner = winner;
        let now = self.clock.now_ms();
        self.timers
            .arm(TimerSlot::Cooldown, None, self.options.cooldown, now);
    }

    fn clear_hands(&mut self) {
        for seat in self.registry.seats_mut() {
            seat.hand.clear();
        }
    }

    fn reset(&mut self) {
        self.timers.cancel_all();
        self.clear_hands();
        self.deck = Deck::default();
        self.turn = 0;
        self.phase = StackPhase::Lobby;
        self.registry.promote(StackSeat::from);
    }
}

impl GameSession for StackGame {
    type View = StackView;

    fn kind(&self) -> GameKind {
        GameKind::Stack
    }

    fn join(&mut self, identity: &str, connection: ConnectionId) -> Result<JoinOutcome, Rejection> {
        let open = self.phase == StackPhase::Lobby;
        Ok(self
            .registry
            .join(identity, connection, open, StackSeat::from)?)
    }

    fn spectate(&mut self, identity: &str, connection: ConnectionId) {
        self.registry.spectate(identity, connection);
    }

    fn leave(&mut self, identity: &str) -> bool {
        let Some(departure) = self.registry.leave(identity) else {
            return false;
        };
        let Departure::Seat { index, .. } = departure else {
            return true;
        };

        match self.phase {
            StackPhase::Playing if self.registry.len() < MIN_PLAYERS => {
                let last = self
                    .registry
                    .seats()
                    .first()
                    .map(|seat| seat.identity().to_owned());
                self.finish(last);
            }
            StackPhase::Playing => {
                if index < self.turn {
                    self.turn -= 1;
                } else if index == self.turn {
                    self.turn %= self.registry.len();
                    self.arm_turn();
                }
            }
            StackPhase::Lobby => {
                self.registry.promote(StackSeat::from);
            }
            StackPhase::Finished => {}
        }
        true
    }

    fn attach(&mut self, identity: &str, connection: ConnectionId) -> bool {
        self.registry.rebind(identity, connection)
    }

    fn connection_of(&self, identity: &str) -> Option<ConnectionId> {
        self.registry.connection_of(identity)
    }

    fn start(&mut self, identity: &str) -> Result<(), Rejection> {
        if !self.registry.seated(identity) {
            return Err(StartError::NotSeated.into());
        }
        if self.phase != StackPhase::Lobby {
            return Err(StartError::InvalidState.into());
        }
        if self.registry.len() < MIN_PLAYERS {
            return Err(StartError::NotEnoughPlayers {
                needed: MIN_PLAYERS,
            }
            .into());
        }

        let needed = self.options.cards_needed(self.registry.len());
        if needed > DECK_SIZE {
            return Err(StartError::NotEnoughCards { needed }.into());
        }

        self.winner = None;
        if !self.deal() {
            // The stacked deck was too short; start over with a full one.
            self.clear_hands();
            self.deck = Deck::shuffled(1, &mut self.rng);
            if !self.deal() {
                self.clear_hands();
                return Err(StartError::NotEnoughCards { needed }.into());
            }
        }
        self.phase = StackPhase::Playing;
        self.turn = 0;
        info!(target: LOG_TARGET, players = self.registry.len(), "game started");
        self.arm_turn();
        Ok(())
    }

    fn command(&mut self, identity: &str, command: GameCommand) -> Result<(), Rejection> {
        match command {
            GameCommand::Play { card } => self.play(identity, card)?,
            GameCommand::Draw => self.draw(identity)?,
            other => return Err(other.unsupported()),
        }
        Ok(())
    }

    fn on_timer(&mut self, ticket: &TimerTicket) -> bool {
        if !self.timers.take_fired(ticket) {
            return false;
        }
        match ticket.slot {
            TimerSlot::Turn => {
                let Some(target) = &ticket.target else {
                    return false;
                };
                if self.current_player() != Some(target.identity.as_str()) {
                    return false;
                }
                self.draw(&target.identity).is_ok()
            }
            TimerSlot::Cooldown if self.phase == StackPhase::Finished => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn refund_all(&mut self, reason: AbortReason) -> RefundReport {
        if self.phase == StackPhase::Playing {
            info!(target: LOG_TARGET, ?reason, "game aborted");
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::RoundAborted,
                "the game was aborted",
            )));
            self.reset();
        }
        RefundReport::default()
    }

    fn viewers(&self) -> Vec<String> {
        self.registry.viewers()
    }

    fn project(&self, viewer: &str) -> StackView {
        StackView {
            phase: self.phase,
            seats: self
                .registry
                .seats()
                .iter()
                .map(|seat| StackSeatView {
                    identity: seat.identity.clone(),
                    cards: seat.hand.len(),
                })
                .collect(),
            your_hand: self.registry.seat(viewer).map(|seat| seat.hand.clone()),
            top: self.top_card(),
            draw_pile: self.deck.remaining(),
            turn: self.current_player().map(str::to_owned),
            your_turn: self.current_player() == Some(viewer),
            turn_deadline: self.timers.deadline(TimerSlot::Turn),
            waitlist_position: self.registry.waitlist_position(viewer),
            winner: self.winner.clone(),
        }
    }

    fn drain_effects(&mut self) -> Effects {
        Effects {
            timers: self.timers.drain_requests(),
            deliveries: self.outbox.drain(),
        }
    }
}
