//! Four-in-a-row.
//!
//! Two players drop discs into columns; a disc falls to the lowest free
//! cell. A line of `connect` discs in any direction wins; a full board is a
//! draw. A player who lets the turn clock run out has a disc dropped for
//! them in the most central open column.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::error::{MoveError, Rejection, StartError};
use crate::options::GridOptions;
use crate::registry::{ConnectionId, Departure, JoinOutcome, Occupant, Player, Registry};
use crate::session::{AbortReason, Effects, GameCommand, GameKind, GameSession, Outbox, RefundReport};
use crate::timer::{Clock, TimerSlot, TimerTicket, Timers, TurnTarget};

const LOG_TARGET: &str = "parlor::grid";
const PLAYERS: usize = 2;

/// Phase of the grid game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GridPhase {
    /// Waiting for a start.
    Lobby,
    /// Discs are being dropped.
    Playing,
    /// Won or drawn; the board clears after the cooldown.
    Finished,
}

/// A board of `columns` by `rows` cells. Row 0 is the bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    columns: usize,
    rows: usize,
    cells: Vec<Option<u8>>,
}

impl Board {
    /// Creates an empty board.
    #[must_use]
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            cells: vec![None; columns * rows],
        }
    }

    /// The disc at (`column`, `row`), by player index.
    #[must_use]
    pub fn get(&self, column: usize, row: usize) -> Option<u8> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.cells.get(row * self.columns + column).copied().flatten()
    }

    /// Drops a disc for `player` and returns the row it landed on.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or full column.
    pub fn drop_disc(&mut self, column: usize, player: u8) -> Result<usize, MoveError> {
        if column >= self.columns {
            return Err(MoveError::InvalidColumn);
        }
        let row = (0..self.rows)
            .find(|&row| self.get(column, row).is_none())
            .ok_or(MoveError::ColumnFull)?;
        if let Some(cell) = self.cells.get_mut(row * self.columns + column) {
            *cell = Some(player);
        }
        Ok(row)
    }

    /// Returns whether `column` exists and has room.
    #[must_use]
    pub fn is_open(&self, column: usize) -> bool {
        column < self.columns && self.get(column, self.rows.saturating_sub(1)).is_none()
    }

    /// Returns whether every cell is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// The open column closest to the middle, left first on ties.
    #[must_use]
    pub fn central_open_column(&self) -> Option<usize> {
        let middle = self.columns.saturating_sub(1) / 2;
        (0..self.columns)
            .filter(|&column| self.is_open(column))
            .min_by_key(|&column| (column.abs_diff(middle), column))
    }

    /// Returns whether the disc at (`column`, `row`) is part of a line of at
    /// least `connect`.
    #[must_use]
    pub fn wins_at(&self, column: usize, row: usize, connect: usize) -> bool {
        let Some(player) = self.get(column, row) else {
            return false;
        };
        let directions: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
        directions.iter().any(|&(dc, dr)| {
            1 + self.run(column, row, dc, dr, player) + self.run(column, row, -dc, -dr, player)
                >= connect
        })
    }

    fn run(&self, column: usize, row: usize, dc: isize, dr: isize, player: u8) -> usize {
        let mut count = 0;
        let (mut c, mut r) = (column, row);
        loop {
            let (Some(next_c), Some(next_r)) = (c.checked_add_signed(dc), r.checked_add_signed(dr))
            else {
                return count;
            };
            if self.get(next_c, next_r) != Some(player) {
                return count;
            }
            count += 1;
            (c, r) = (next_c, next_r);
        }
    }
}

/// One viewer's picture of the grid game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridView {
    /// Phase.
    pub phase: GridPhase,
    /// Seated identities; the index is the disc number.
    pub players: Vec<String>,
    /// The board.
    pub board: Board,
    /// Identity holding the turn.
    pub turn: Option<String>,
    /// Whether the viewer must act now.
    pub your_turn: bool,
    /// When the current turn times out, in epoch milliseconds.
    pub turn_deadline: Option<u64>,
    /// The viewer's one-based waitlist position.
    pub waitlist_position: Option<usize>,
    /// Winner of the last game; `None` after a draw.
    pub winner: Option<String>,
}

/// The grid game session.
pub struct GridGame {
    options: GridOptions,
    phase: GridPhase,
    registry: Registry<Player>,
    board: Board,
    turn: usize,
    winner: Option<String>,
    timers: Timers,
    outbox: Outbox,
    clock: Arc<dyn Clock>,
}

impl GridGame {
    /// Creates a session.
    #[must_use]
    pub fn new(options: GridOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Registry::new(PLAYERS, options.waitlist),
            board: Board::new(options.columns, options.rows),
            options,
            phase: GridPhase::Lobby,
            turn: 0,
            winner: None,
            timers: Timers::new(),
            outbox: Outbox::default(),
            clock,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> GridPhase {
        self.phase
    }

    /// Returns the board.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Identity holding the turn.
    #[must_use]
    pub fn current_player(&self) -> Option<&str> {
        if self.phase != GridPhase::Playing {
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

    fn arm_turn(&mut self) {
        let Some(identity) = self.current_player().map(str::to_owned) else {
            return;
        };
        let now = self.clock.now_ms();
        let target = TurnTarget { identity, hand: 0 };
        self.timers
            .arm(TimerSlot::Turn, Some(target), self.options.turn_time, now);
    }

    /// Drops a disc for the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if it is not the caller's turn or the column is
    /// missing or full.
    pub fn drop_disc(&mut self, identity: &str, column: usize) -> Result<(), MoveError> {
        if self.phase != GridPhase::Playing {
            return Err(MoveError::InvalidState);
        }
        let index = self
            .registry
            .seat_index(identity)
            .ok_or(MoveError::NotSeated)?;
        if index != self.turn {
            return Err(MoveError::NotYourTurn);
        }

        let row = self.board.drop_disc(column, index as u8)?;
        debug!(target: LOG_TARGET, identity, column, row, "disc dropped");

        if self.board.wins_at(column, row, self.options.connect) {
            self.finish(Some(identity.to_owned()));
        } else if self.board.is_full() {
            self.finish(None);
        } else {
            self.turn = (self.turn + 1) % PLAYERS;
            self.arm_turn();
        }
        Ok(())
    }

    fn finish(&mut self, winner: Option<String>) {
        self.timers.cancel(TimerSlot::Turn);
        self.phase = GridPhase::Finished;
        let message = winner
            .as_deref()
            .map_or_else(|| "draw".to_owned(), |w| format!("{w} wins"));
        info!(target: LOG_TARGET, winner = ?winner, "game over");
        self.outbox
            .table(Outbound::Notice(TableNotice::new(NoticeKind::GameOver, message)));
        self.winner = winner;
        let now = self.clock.now_ms();
        self.timers
            .arm(TimerSlot::Cooldown, None, self.options.cooldown, now);
    }

    fn reset(&mut self) {
        self.timers.cancel_all();
        self.board = Board::new(self.options.columns, self.options.rows);
        self.turn = 0;
        self.phase = GridPhase::Lobby;
        self.registry.promote(Player::from);
    }
}

impl GameSession for GridGame {
    type View = GridView;

    fn kind(&self) -> GameKind {
        GameKind::Grid
    }

    fn join(&mut self, identity: &str, connection: ConnectionId) -> Result<JoinOutcome, Rejection> {
        let open = self.phase == GridPhase::Lobby;
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

        match self.phase {
            GridPhase::Playing => {
                let opponent = self
                    .registry
                    .seats()
                    .first()
                    .map(|seat| seat.identity().to_owned());
                self.finish(opponent);
            }
            GridPhase::Lobby => {
                self.registry.promote(Player::from);
            }
            GridPhase::Finished => {}
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
        if self.phase != GridPhase::Lobby {
            return Err(StartError::InvalidState.into());
        }
        if self.registry.len() < PLAYERS {
            return Err(StartError::NotEnoughPlayers { needed: PLAYERS }.into());
        }

        self.board = Board::new(self.options.columns, self.options.rows);
        self.winner = None;
        self.turn = 0;
        self.phase = GridPhase::Playing;
        info!(target: LOG_TARGET, "game started");
        self.arm_turn();
        Ok(())
    }

    fn command(&mut self, identity: &str, command: GameCommand) -> Result<(), Rejection> {
        match command {
            GameCommand::Drop { column } => Ok(self.drop_disc(identity, column)?),
            other => Err(other.unsupported()),
        }
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
                let Some(column) = self.board.central_open_column() else {
                    return false;
                };
                debug!(target: LOG_TARGET, identity = %target.identity, column, "turn timed out");
                self.drop_disc(&target.identity, column).is_ok()
            }
            TimerSlot::Cooldown if self.phase == GridPhase::Finished => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn refund_all(&mut self, reason: AbortReason) -> RefundReport {
        if self.phase == GridPhase::Playing {
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

    fn project(&self, viewer: &str) -> GridView {
        GridView {
            phase: self.phase,
            players: self
                .registry
                .seats()
                .iter()
                .map(|seat| seat.identity().to_owned())
                .collect(),
            board: self.board.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discs_stack_and_full_column_is_rejected() {
        let mut board = Board::new(3, 2);
        assert_eq!(board.drop_disc(1, 0), Ok(0));
        assert_eq!(board.drop_disc(1, 1), Ok(1));
        assert_eq!(board.drop_disc(1, 0), Err(MoveError::ColumnFull));
        assert_eq!(board.drop_disc(3, 0), Err(MoveError::InvalidColumn));
    }

    #[test]
    fn diagonal_line_wins() {
        let mut board = Board::new(7, 6);
        // Staircase under player 0's diagonal.
        for (column, fillers) in [(1, 1), (2, 2), (3, 3)] {
            for _ in 0..fillers {
                board.drop_disc(column, 1).unwrap();
            }
        }
        for column in 0..4 {
            board.drop_disc(column, 0).unwrap();
        }
        assert!(board.wins_at(3, 3, 4));
        assert!(board.wins_at(0, 0, 4));
        assert!(!board.wins_at(1, 0, 4));
    }

    #[test]
    fn central_column_prefers_middle_then_left() {
        let mut board = Board::new(7, 1);
        assert_eq!(board.central_open_column(), Some(3));
        board.drop_disc(3, 0).unwrap();
        assert_eq!(board.central_open_column(), Some(2));
        board.drop_disc(2, 0).unwrap();
        assert_eq!(board.central_open_column(), Some(4));
    }
}
