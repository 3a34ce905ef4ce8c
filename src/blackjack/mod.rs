//! The blackjack table.
//!
//! One shared table with a dealer. Stakes are debited from the [`Ledger`]
//! when a bet is placed and held in escrow until the round is settled or
//! aborted; every stake leaves escrow as exactly one payout or refund.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::error;

use crate::card::Card;
use crate::deck::Deck;
use crate::error::{IntegrityError, Rejection, StartError};
use crate::hand::{DealerHand, Hand};
use crate::ledger::Ledger;
use crate::options::TableOptions;
use crate::registry::{ConnectionId, Entry, JoinOutcome, Occupant, Registry};
use crate::result::RoundResult;
use crate::session::{AbortReason, Effects, GameCommand, GameKind, GameSession, Outbox, RefundReport};
use crate::timer::{Clock, TimerSlot, TimerTicket, Timers};

mod actions;
mod bet;
mod dealer;
mod escrow;
mod lobby;
pub mod state;
mod view;

pub use escrow::PendingCredit;
pub use state::{Phase, SeatStatus, TurnPosition};
pub use view::{DealerView, HandView, SeatView, TableView};

const LOG_TARGET: &str = "parlor::blackjack";

/// A seated player.
#[derive(Debug, Clone)]
pub struct Seat {
    identity: String,
    connection: ConnectionId,
    hands: Vec<Hand>,
    active_hand: usize,
    status: SeatStatus,
    last_outcome: i64,
    departed: bool,
}

impl Seat {
    fn new(entry: Entry, status: SeatStatus) -> Self {
        Self {
            identity: entry.identity,
            connection: entry.connection,
            hands: Vec::new(),
            active_hand: 0,
            status,
            last_outcome: 0,
            departed: false,
        }
    }

    /// The seat's hands; the bet lives on the first one from the moment it
    /// is placed.
    #[must_use]
    pub fn hands(&self) -> &[Hand] {
        &self.hands
    }

    /// Index of the hand being played.
    #[must_use]
    pub const fn active_hand(&self) -> usize {
        self.active_hand
    }

    /// Round status of the seat.
    #[must_use]
    pub const fn status(&self) -> SeatStatus {
        self.status
    }

    /// Signed result of the seat's last settled round.
    #[must_use]
    pub const fn last_outcome(&self) -> i64 {
        self.last_outcome
    }

    /// Returns whether the player left while the dealer was playing.
    #[must_use]
    pub const fn is_departed(&self) -> bool {
        self.departed
    }

    /// Sum of the bets on every hand.
    #[must_use]
    pub fn total_bet(&self) -> u64 {
        self.hands.iter().map(Hand::bet).sum()
    }

    fn clear_round(&mut self) {
        self.hands.clear();
        self.active_hand = 0;
        self.status = SeatStatus::Idle;
    }
}

impl Occupant for Seat {
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

/// The blackjack table session.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use parlor::{
///     BlackjackTable, GameSession, ManualClock, MemoryStore, Phase, ProfitCap, StoreLedger,
///     TableOptions,
/// };
/// use parlor::registry::ConnectionId;
///
/// let clock = Arc::new(ManualClock::new(0));
/// let ledger = Arc::new(StoreLedger::new(
///     MemoryStore::new(),
///     1_000,
///     ProfitCap::default(),
///     clock.clone(),
/// ));
/// let mut table = BlackjackTable::new(TableOptions::default(), 42, ledger, clock);
///
/// table.join("alice", ConnectionId(1)).unwrap();
/// table.start("alice").unwrap();
/// assert_eq!(table.phase(), Phase::Betting);
/// ```
pub struct BlackjackTable {
    options: TableOptions,
    phase: Phase,
    registry: Registry<Seat>,
    deck: Deck,
    dealer: DealerHand,
    turn: TurnPosition,
    timers: Timers,
    escrowed: u64,
    pending_credits: Vec<PendingCredit>,
    last_result: Option<RoundResult>,
    outbox: Outbox,
    rng: ChaCha8Rng,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl BlackjackTable {
    /// Creates a table. `seed` drives every shuffle.
    #[must_use]
    pub fn new(
        options: TableOptions,
        seed: u64,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Registry::new(options.seats, options.waitlist),
            options,
            phase: Phase::Lobby,
            deck: Deck::default(),
            dealer: DealerHand::new(),
            turn: TurnPosition::default(),
            timers: Timers::new(),
            escrowed: 0,
            pending_credits: Vec::new(),
            last_result: None,
            outbox: Outbox::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            ledger,
            clock,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the table options.
    #[must_use]
    pub const fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Returns the seat, waitlist and spectator lists.
    #[must_use]
    pub const fn registry(&self) -> &Registry<Seat> {
        &self.registry
    }

    /// Returns the seat held by `identity`.
    #[must_use]
    pub fn seat(&self, identity: &str) -> Option<&Seat> {
        self.registry.seat(identity)
    }

    /// Returns the dealer's hand.
    #[must_use]
    pub const fn dealer(&self) -> &DealerHand {
        &self.dealer
    }

    /// Returns the current turn position.
    #[must_use]
    pub const fn current_turn(&self) -> TurnPosition {
        self.turn
    }

    /// Returns the identity whose turn it is.
    ///
    /// Returns `None` outside the playing phase.
    #[must_use]
    pub fn current_player(&self) -> Option<&str> {
        if self.phase != Phase::Playing {
            return None;
        }
        self.registry
            .seats()
            .get(self.turn.seat_index)
            .map(Occupant::identity)
    }

    /// Total amount debited for the running round and not yet paid out.
    #[must_use]
    pub const fn escrowed(&self) -> u64 {
        self.escrowed
    }

    /// Credits the ledger failed and that will be retried.
    #[must_use]
    pub fn pending_credits(&self) -> &[PendingCredit] {
        &self.pending_credits
    }

    /// Result of the last settled round.
    #[must_use]
    pub const fn last_result(&self) -> Option<&RoundResult> {
        self.last_result.as_ref()
    }

    /// Returns the number of cards remaining in the shoe.
    #[must_use]
    pub fn cards_remaining(&self) -> usize {
        self.deck.remaining()
    }

    /// Replaces the shoe with one that deals `draws` in order.
    ///
    /// A fresh shoe is built whenever betting opens, so call this after
    /// [`start`](GameSession::start) and before the last bet.
    pub fn stack_shoe(&mut self, draws: &[Card]) {
        self.deck = Deck::stacked(draws);
    }

    /// The armed ticket of `slot`. Mostly useful to drive timers by hand.
    #[must_use]
    pub fn timer(&self, slot: TimerSlot) -> Option<&TimerTicket> {
        self.timers.ticket(slot)
    }

    /// Absolute deadline of `slot` in epoch milliseconds.
    #[must_use]
    pub fn deadline(&self, slot: TimerSlot) -> Option<u64> {
        self.timers.deadline(slot)
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn draw(&mut self) -> Result<Card, IntegrityError> {
        self.deck.draw().ok_or(IntegrityError::ShoeExhausted)
    }

    fn seat_open(&self) -> bool {
        matches!(self.phase, Phase::Lobby | Phase::Betting)
    }

    fn new_seat_status(&self) -> SeatStatus {
        if self.phase == Phase::Betting {
            SeatStatus::Betting
        } else {
            SeatStatus::Idle
        }
    }

    /// Aborts the round after an internal fault.
    fn fault(&mut self, fault: &IntegrityError) {
        error!(target: LOG_TARGET, %fault, phase = ?self.phase, "integrity fault, aborting round");
        self.refund_all(AbortReason::IntegrityFault);
    }
}

impl GameSession for BlackjackTable {
    type View = TableView;

    fn kind(&self) -> GameKind {
        GameKind::Blackjack
    }

    fn join(&mut self, identity: &str, connection: ConnectionId) -> Result<JoinOutcome, Rejection> {
        self.join_table(identity, connection).map_err(Rejection::from)
    }

    fn spectate(&mut self, identity: &str, connection: ConnectionId) {
        self.registry.spectate(identity, connection);
    }

    fn leave(&mut self, identity: &str) -> bool {
        self.leave_table(identity)
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
        if self.phase != Phase::Lobby {
            return Err(StartError::InvalidState.into());
        }
        self.open_betting();
        Ok(())
    }

    fn command(&mut self, identity: &str, command: GameCommand) -> Result<(), Rejection> {
        match command {
            GameCommand::Bet { amount } => self.place_bet(identity, amount)?,
            GameCommand::Hit => self.hit(identity)?,
            GameCommand::Stand => self.stand(identity)?,
            GameCommand::Double => self.double_down(identity)?,
            GameCommand::Split => self.split(identity)?,
            other => return Err(other.unsupported()),
        }
        Ok(())
    }

    fn on_timer(&mut self, ticket: &TimerTicket) -> bool {
        if !self.timers.take_fired(ticket) {
            return false;
        }
        match ticket.slot {
            TimerSlot::Betting => self.betting_timeout(),
            TimerSlot::Turn => self.turn_timeout(ticket),
            TimerSlot::Reveal => self.reveal_next(),
            TimerSlot::Cooldown => self.cooldown_elapsed(),
            TimerSlot::Signal => false,
        }
    }

    fn refund_all(&mut self, reason: AbortReason) -> RefundReport {
        self.abort_round(reason)
    }

    fn retry_pending_credits(&mut self) -> RefundReport {
        self.retry_credits()
    }

    fn validate_invariants(&self) -> Result<(), IntegrityError> {
        if self.phase.holds_stakes() {
            let staked: u64 = self.registry.seats().iter().map(Seat::total_bet).sum();
            if staked != self.escrowed {
                return Err(IntegrityError::EscrowMismatch {
                    escrowed: self.escrowed,
                    staked,
                });
            }
        }

        if self.phase == Phase::Playing {
            let TurnPosition {
                seat_index,
                hand_index,
            } = self.turn;
            let can_act = self
                .registry
                .seats()
                .get(seat_index)
                .and_then(|seat| seat.hands.get(hand_index))
                .is_some_and(Hand::is_playing);
            if !can_act {
                return Err(IntegrityError::StaleTurn {
                    seat_index,
                    hand_index,
                });
            }
        }

        Ok(())
    }

    fn viewers(&self) -> Vec<String> {
        self.registry.viewers()
    }

    fn project(&self, viewer: &str) -> TableView {
        self.view_for(viewer)
    }

    fn drain_effects(&mut self) -> Effects {
        Effects {
            timers: self.timers.drain_requests(),
            deliveries: self.outbox.drain(),
        }
    }
}
