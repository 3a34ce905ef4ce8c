//! Reaction duel.
//!
//! Two players wait for a go signal that comes after a random delay. The
//! first to react after the signal wins; reacting before it loses on the
//! spot.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::error::{MoveError, Rejection, StartError};
use crate::options::DuelOptions;
use crate::registry::{ConnectionId, Departure, JoinOutcome, Occupant, Player, Registry};
use crate::session::{AbortReason, Effects, GameCommand, GameKind, GameSession, Outbox, RefundReport};
use crate::timer::{Clock, TimerSlot, TimerTicket, Timers};

const LOG_TARGET: &str = "parlor::duel";
const PLAYERS: usize = 2;

/// Phase of the duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelPhase {
    /// Waiting for a start.
    Lobby,
    /// Started; the signal has not been given yet.
    Armed,
    /// The signal is up; the first reaction wins.
    Signalled,
    /// Decided; the duel clears after the cooldown.
    Finished,
}

/// How the last duel ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuelResult {
    /// Winner, or `None` if nobody reacted in time.
    pub winner: Option<String>,
    /// Milliseconds between the signal and the winning reaction.
    pub reaction_ms: Option<u64>,
    /// Who reacted before the signal, if that decided it.
    pub false_start: Option<String>,
}

/// One viewer's picture of the duel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuelView {
    /// Phase.
    pub phase: DuelPhase,
    /// Seated identities.
    pub players: Vec<String>,
    /// When the signal went up, in epoch milliseconds.
    pub signal_at: Option<u64>,
    /// The viewer's one-based waitlist position.
    pub waitlist_position: Option<usize>,
    /// Result of the last duel.
    pub result: Option<DuelResult>,
}

/// The duel session.
pub struct DuelGame {
    options: DuelOptions,
    phase: DuelPhase,
    registry: Registry<Player>,
    signal_at: Option<u64>,
    result: Option<DuelResult>,
    timers: Timers,
    outbox: Outbox,
    rng: ChaCha8Rng,
    clock: Arc<dyn Clock>,
}

impl DuelGame {
    /// Creates a session. `seed` drives the signal delays.
    #[must_use]
    pub fn new(options: DuelOptions, seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Registry::new(PLAYERS, options.waitlist),
            options,
            phase: DuelPhase::Lobby,
            signal_at: None,
            result: None,
            timers: Timers::new(),
            outbox: Outbox::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> DuelPhase {
        self.phase
    }

    /// Result of the last duel.
    #[must_use]
    pub const fn result(&self) -> Option<&DuelResult> {
        self.result.as_ref()
    }

    /// The armed ticket of `slot`.
    #[must_use]
    pub fn timer(&self, slot: TimerSlot) -> Option<&TimerTicket> {
        self.timers.ticket(slot)
    }

    fn signal_delay(&mut self) -> Duration {
        let min = self.options.min_signal.as_millis() as u64;
        let max = (self.options.max_signal.as_millis() as u64).max(min);
        Duration::from_millis(self.rng.random_range(min..=max))
    }

    fn opponent_of(&self, identity: &str) -> Option<String> {
        self.registry
            .seats()
            .iter()
            .map(Occupant::identity)
            .find(|other| *other != identity)
            .map(str::to_owned)
    }

    /// Reacts to the signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not seated or no duel is running.
    pub fn react(&mut self, identity: &str) -> Result<(), MoveError> {
        if !self.registry.seated(identity) {
            return Err(MoveError::NotSeated);
        }
        match self.phase {
            DuelPhase::Armed => {
                debug!(target: LOG_TARGET, identity, "false start");
                self.finish(DuelResult {
                    winner: self.opponent_of(identity),
                    reaction_ms: None,
                    false_start: Some(identity.to_owned()),
                });
                Ok(())
            }
            DuelPhase::Signalled => {
                let now = self.clock.now_ms();
                let reaction = self.signal_at.map(|at| now.saturating_sub(at));
                debug!(target: LOG_TARGET, identity, reaction_ms = ?reaction, "reaction");
                self.finish(DuelResult {
                    winner: Some(identity.to_owned()),
                    reaction_ms: reaction,
                    false_start: None,
                });
                Ok(())
            }
            DuelPhase::Finished => Err(MoveError::AlreadyActed),
            DuelPhase::Lobby => Err(MoveError::InvalidState),
        }
    }

    fn finish(&mut self, result: DuelResult) {
        self.timers.cancel(TimerSlot::Signal);
        self.timers.cancel(TimerSlot::Turn);
        self.phase = DuelPhase::Finished;
        let message = match (&result.winner, &result.false_start) {
            (Some(winner), Some(early)) => format!("{early} jumped the gun, {winner} wins"),
            (Some(winner), None) => format!("{winner} wins"),
            (None, _) => "nobody reacted".to_owned(),
        };
        info!(target: LOG_TARGET, winner = ?result.winner, reaction_ms = ?result.reaction_ms, "duel decided");
        self.outbox
            .table(Outbound::Notice(TableNotice::new(NoticeKind::GameOver, message)));
        self.result = Some(result);
        let now = self.clock.now_ms();
        self.timers
            .arm(TimerSlot::Cooldown, None, self.options.cooldown, now);
    }

    fn reset(&mut self) {
        self.timers.cancel_all();
        self.signal_at = None;
        self.phase = DuelPhase::Lobby;
        self.registry.promote(Player::from);
    }

    const fn running(&self) -> bool {
        matches!(self.phase, DuelPhase::Armed | DuelPhase::Signalled)
    }
}

impl GameSession for DuelGame {
    type View = DuelView;

    fn kind(&self) -> GameKind {
        GameKind::Duel
    }

    fn join(&mut self, identity: &str, connection: ConnectionId) -> Result<JoinOutcome, Rejection> {
        let open = self.phase == DuelPhase::Lobby;
        Ok(self
            .registry
            .join(identity, connection, open, Player::from)?)
    }

    fn spectate(&mut self, identity: &str, connection: ConnectionId) {
        self.registry.spectate(identity, connection);
    }

    fn leave(&mut self, identity: &str) -> bool {
        let Some(departure) = self.registry.leave(identity) else {
            return false;
        };
        if !matches!(departure, Departure::Seat { .. }) {
            return true;
        }

        if self.running() {
            let opponent = self
                .registry
                .seats()
                .first()
                .map(|seat| seat.identity().to_owned());
            self.finish(DuelResult {
                winner: opponent,
                reaction_ms: None,
                false_start: None,
            });
        } else if self.phase == DuelPhase::Lobby {
            self.registry.promote(Player::from);
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
        if self.phase != DuelPhase::Lobby {
            return Err(StartError::InvalidState.into());
        }
        if self.registry.len() < PLAYERS {
            return Err(StartError::NotEnoughPlayers { needed: PLAYERS }.into());
        }

        self.result = None;
        self.phase = DuelPhase::Armed;
        let delay = self.signal_delay();
        let now = self.clock.now_ms();
        self.timers.arm(TimerSlot::Signal, None, delay, now);
        info!(target: LOG_TARGET, delay_ms = delay.as_millis() as u64, "duel armed");
        Ok(())
    }

    fn command(&mut self, identity: &str, command: GameCommand) -> Result<(), Rejection> {
        match command {
            GameCommand::React => Ok(self.react(identity)?),
            other => Err(other.unsupported()),
        }
    }

    fn on_timer(&mut self, ticket: &TimerTicket) -> bool {
        if !self.timers.take_fired(ticket) {
            return false;
        }
        match (ticket.slot, self.phase) {
            (TimerSlot::Signal, DuelPhase::Armed) => {
                let now = self.clock.now_ms();
                self.signal_at = Some(now);
                self.phase = DuelPhase::Signalled;
                self.timers
                    .arm(TimerSlot::Turn, None, self.options.reaction_window, now);
                debug!(target: LOG_TARGET, "signal");
                true
            }
            (TimerSlot::Turn, DuelPhase::Signalled) => {
                self.finish(DuelResult {
                    winner: None,
                    reaction_ms: None,
                    false_start: None,
                });
                true
            }
            (TimerSlot::Cooldown, DuelPhase::Finished) => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn refund_all(&mut self, reason: AbortReason) -> RefundReport {
        if self.running() {
            info!(target: LOG_TARGET, ?reason, "duel aborted");
            self.outbox.table(Outbound::Notice(TableNotice::new(
                NoticeKind::RoundAborted,
                "the duel was aborted",
            )));
            self.reset();
        }
        RefundReport::default()
    }

    fn viewers(&self) -> Vec<String> {
        self.registry.viewers()
    }

    fn project(&self, viewer: &str) -> DuelView {
        DuelView {
            phase: self.phase,
            players: self
                .registry
                .seats()
                .iter()
                .map(|seat| seat.identity().to_owned())
                .collect(),
            signal_at: self.signal_at,
            waitlist_position: self.registry.waitlist_position(viewer),
            result: self.result.clone(),
        }
    }

    fn drain_effects(&mut self) -> Effects {
        Effects {
            timers: self.timers.drain_requests(),
            deliveries: self.outbox.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    fn armed_duel() -> (DuelGame, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let mut duel = DuelGame::new(DuelOptions::default(), 3, clock.clone());
        duel.join("ann", ConnectionId(1)).unwrap();
        duel.join("bob", ConnectionId(2)).unwrap();
        duel.start("ann").unwrap();
        (duel, clock)
    }

    #[test]
    fn signal_delay_stays_in_window() {
        let (duel, _) = armed_duel();
        let ticket = duel.timer(TimerSlot::Signal).unwrap();
        assert!(ticket.target.is_none());
        let deadline = duel.timers.deadline(TimerSlot::Signal).unwrap();
        assert!((11_500..=14_000).contains(&deadline));
    }

    #[test]
    fn reacting_early_hands_the_win_to_the_opponent() {
        let (mut duel, _) = armed_duel();
        duel.react("ann").unwrap();

        let result = duel.result().unwrap();
        assert_eq!(result.winner.as_deref(), Some("bob"));
        assert_eq!(result.false_start.as_deref(), Some("ann"));
        assert!(!duel.timers.is_armed(TimerSlot::Signal));
        assert_eq!(duel.react("bob"), Err(MoveError::AlreadyActed));
    }

    #[test]
    fn first_reaction_after_signal_wins() {
        let (mut duel, clock) = armed_duel();
        let signal = duel.timer(TimerSlot::Signal).cloned().unwrap();
        assert!(duel.on_timer(&signal));
        assert_eq!(duel.phase(), DuelPhase::Signalled);

        clock.advance(Duration::from_millis(240));
        duel.react("bob").unwrap();
        let result = duel.result().unwrap();
        assert_eq!(result.winner.as_deref(), Some("bob"));
        assert_eq!(result.reaction_ms, Some(240));

        let cooldown = duel.timer(TimerSlot::Cooldown).cloned().unwrap();
        assert!(duel.on_timer(&cooldown));
        assert_eq!(duel.phase(), DuelPhase::Lobby);
    }

    #[test]
    fn silent_window_is_a_draw() {
        let (mut duel, _) = armed_duel();
        let signal = duel.timer(TimerSlot::Signal).cloned().unwrap();
        duel.on_timer(&signal);
        let window = duel.timer(TimerSlot::Turn).cloned().unwrap();
        assert!(duel.on_timer(&window));

        let result = duel.result().unwrap();
        assert_eq!(result.winner, None);
        assert_eq!(duel.phase(), DuelPhase::Finished);
        assert!(!duel.on_timer(&signal));
    }

    #[test]
    fn leaving_mid_duel_forfeits() {
        let (mut duel, _) = armed_duel();
        assert!(duel.leave("bob"));
        assert_eq!(duel.result().unwrap().winner.as_deref(), Some("ann"));
        assert_eq!(duel.command("ann", GameCommand::Hit), Err(Rejection::Unsupported("hit")));
    }
}
