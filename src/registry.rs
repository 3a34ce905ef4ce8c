//! Seats, waitlist and spectators of one session.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::JoinError;

/// Opaque handle of the transport connection an identity is reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

/// Something that occupies a seat.
pub trait Occupant {
    /// Durable identity of the occupant.
    fn identity(&self) -> &str;
    /// Connection the occupant was last seen on.
    fn connection(&self) -> ConnectionId;
    /// Replaces the connection after a reconnect.
    fn rebind(&mut self, connection: ConnectionId);
}

/// A waitlisted player or a spectator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Durable identity.
    pub identity: String,
    /// Current connection.
    pub connection: ConnectionId,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(identity: impl Into<String>, connection: ConnectionId) -> Self {
        Self {
            identity: identity.into(),
            connection,
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// A seat was created.
    Joined {
        /// Index of the new seat.
        seat: usize,
    },
    /// The identity was put on the waitlist.
    Queued {
        /// One-based waitlist position.
        position: usize,
    },
    /// The identity was already seated or queued; only its connection was
    /// updated.
    AlreadyIn,
}

/// Where a departing identity was removed from.
#[derive(Debug)]
pub enum Departure<S> {
    /// It held a seat.
    Seat {
        /// Index the seat had.
        index: usize,
        /// The removed seat.
        seat: S,
    },
    /// It was waiting for a seat.
    Waitlist,
    /// It was watching.
    Spectator,
}

/// Seats, a FIFO waitlist and spectators.
#[derive(Debug)]
pub struct Registry<S> {
    capacity: usize,
    waitlist_limit: usize,
    seats: Vec<S>,
    waitlist: VecDeque<Entry>,
    spectators: Vec<Entry>,
}

impl<S: Occupant> Registry<S> {
    /// Creates a registry with `capacity` seats and room for
    /// `waitlist_limit` queued identities.
    #[must_use]
    pub fn new(capacity: usize, waitlist_limit: usize) -> Self {
        Self {
            capacity,
            waitlist_limit,
            seats: Vec::with_capacity(capacity),
            waitlist: VecDeque::new(),
            spectators: Vec::new(),
        }
    }

    /// Seats or queues `identity`.
    ///
    /// A seat is only handed out while `seat_open` holds (no round in
    /// progress); otherwise the identity goes to the back of the waitlist.
    /// Joining again while seated or queued just rebinds the connection.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Full`] if a seat cannot be given and the waitlist
    /// is at capacity.
    pub fn join(
        &mut self,
        identity: &str,
        connection: ConnectionId,
        seat_open: bool,
        make_seat: impl FnOnce(Entry) -> S,
    ) -> Result<JoinOutcome, JoinError> {
        if self.seated(identity) || self.waitlist_position(identity).is_some() {
            self.rebind(identity, connection);
            return Ok(JoinOutcome::AlreadyIn);
        }

        if seat_open && self.seats.len() < self.capacity {
            self.spectators.retain(|entry| entry.identity != identity);
            self.seats.push(make_seat(Entry::new(identity, connection)));
            return Ok(JoinOutcome::Joined {
                seat: self.seats.len() - 1,
            });
        }

        if self.waitlist.len() >= self.waitlist_limit {
            return Err(JoinError::Full);
        }

        self.spectators.retain(|entry| entry.identity != identity);
        self.waitlist.push_back(Entry::new(identity, connection));
        Ok(JoinOutcome::Queued {
            position: self.waitlist.len(),
        })
    }

    /// Adds `identity` as a spectator. Seated or queued identities already
    /// receive the table state, so for them this only rebinds the connection.
    ///
    /// Returns whether a spectator entry was added.
    pub fn spectate(&mut self, identity: &str, connection: ConnectionId) -> bool {
        if self.rebind(identity, connection) {
            return false;
        }
        self.spectators.push(Entry::new(identity, connection));
        true
    }

    /// Removes `identity` from whichever list holds it.
    pub fn leave(&mut self, identity: &str) -> Option<Departure<S>> {
        if let Some(index) = self.seat_index(identity) {
            let seat = self.seats.remove(index);
            return Some(Departure::Seat { index, seat });
        }
        if let Some(position) = self.waitlist.iter().position(|e| e.identity == identity) {
            self.waitlist.remove(position);
            return Some(Departure::Waitlist);
        }
        if let Some(position) = self.spectators.iter().position(|e| e.identity == identity) {
            self.spectators.remove(position);
            return Some(Departure::Spectator);
        }
        None
    }

    /// Moves waitlisted identities into free seats, oldest first.
    ///
    /// Returns the identities that were seated.
    pub fn promote(&mut self, mut make_seat: impl FnMut(Entry) -> S) -> Vec<String> {
        let mut promoted = Vec::new();
        while self.seats.len() < self.capacity {
            let Some(entry) = self.waitlist.pop_front() else {
                break;
            };
            promoted.push(entry.identity.clone());
            self.seats.push(make_seat(entry));
        }
        promoted
    }

    /// Replaces the stored connection of `identity`. Returns whether the
    /// identity is known to this registry.
    pub fn rebind(&mut self, identity: &str, connection: ConnectionId) -> bool {
        if let Some(seat) = self.seat_mut(identity) {
            seat.rebind(connection);
            return true;
        }
        if let Some(entry) = self
            .waitlist
            .iter_mut()
            .chain(self.spectators.iter_mut())
            .find(|entry| entry.identity == identity)
        {
            entry.connection = connection;
            return true;
        }
        false
    }

    /// Connection currently stored for `identity`.
    #[must_use]
    pub fn connection_of(&self, identity: &str) -> Option<ConnectionId> {
        if let Some(seat) = self.seat(identity) {
            return Some(seat.connection());
        }
        self.waitlist
            .iter()
            .chain(self.spectators.iter())
            .find(|entry| entry.identity == identity)
            .map(|entry| entry.connection)
    }

    /// Every identity that should receive this session's state.
    #[must_use]
    pub fn viewers(&self) -> Vec<String> {
        self.seats
            .iter()
            .map(|seat| seat.identity().to_owned())
            .chain(self.waitlist.iter().map(|entry| entry.identity.clone()))
            .chain(self.spectators.iter().map(|entry| entry.identity.clone()))
            .collect()
    }

    /// Returns whether `identity` holds a seat.
    #[must_use]
    pub fn seated(&self, identity: &str) -> bool {
        self.seat_index(identity).is_some()
    }

    /// Index of the seat held by `identity`.
    #[must_use]
    pub fn seat_index(&self, identity: &str) -> Option<usize> {
        self.seats.iter().position(|seat| seat.identity() == identity)
    }

    /// The seat held by `identity`.
    #[must_use]
    pub fn seat(&self, identity: &str) -> Option<&S> {
        self.seats.iter().find(|seat| seat.identity() == identity)
    }

    /// The seat held by `identity`, mutably.
    pub fn seat_mut(&mut self, identity: &str) -> Option<&mut S> {
        self.seats
            .iter_mut()
            .find(|seat| seat.identity() == identity)
    }

    /// All seats in seating order.
    #[must_use]
    pub fn seats(&self) -> &[S] {
        &self.seats
    }

    /// All seats in seating order, mutably.
    pub fn seats_mut(&mut self) -> &mut [S] {
        &mut self.seats
    }

    /// Drops every seat for which `keep` returns `false`.
    pub fn retain_seats(&mut self, keep: impl FnMut(&S) -> bool) {
        self.seats.retain(keep);
    }

    /// One-based waitlist position of `identity`.
    #[must_use]
    pub fn waitlist_position(&self, identity: &str) -> Option<usize> {
        self.waitlist
            .iter()
            .position(|entry| entry.identity == identity)
            .map(|index| index + 1)
    }

    /// Waitlisted identities in order.
    pub fn waitlist(&self) -> impl Iterator<Item = &str> {
        self.waitlist.iter().map(|entry| entry.identity.as_str())
    }

    /// Number of spectators.
    #[must_use]
    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Number of seats.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns whether every seat is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.capacity
    }

    /// Number of occupied seats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Returns whether no seat is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

/// Minimal occupant used by games whose seats only need an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    identity: String,
    connection: ConnectionId,
}

impl From<Entry> for Player {
    fn from(entry: Entry) -> Self {
        Self {
            identity: entry.identity,
            connection: entry.connection,
        }
    }
}

impl Occupant for Player {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize) -> Registry<Player> {
        Registry::new(capacity, 2)
    }

    #[test]
    fn seats_until_full_then_queues() {
        let mut reg = registry(2);
        assert_eq!(
            reg.join("a", ConnectionId(1), true, Player::from),
            Ok(JoinOutcome::Joined { seat: 0 })
        );
        assert_eq!(
            reg.join("b", ConnectionId(2), true, Player::from),
            Ok(JoinOutcome::Joined { seat: 1 })
        );
        assert_eq!(
            reg.join("c", ConnectionId(3), true, Player::from),
            Ok(JoinOutcome::Queued { position: 1 })
        );
        assert_eq!(
            reg.join("d", ConnectionId(4), true, Player::from),
            Ok(JoinOutcome::Queued { position: 2 })
        );
        assert_eq!(
            reg.join("e", ConnectionId(5), true, Player::from),
            Err(JoinError::Full)
        );
    }

    #[test]
    fn closed_seating_queues_even_with_free_seats() {
        let mut reg = registry(4);
        assert_eq!(
            reg.join("a", ConnectionId(1), false, Player::from),
            Ok(JoinOutcome::Queued { position: 1 })
        );
        assert_eq!(reg.promote(Player::from), vec!["a".to_owned()]);
        assert!(reg.seated("a"));
    }

    #[test]
    fn rejoin_only_rebinds_connection() {
        let mut reg = registry(1);
        reg.join("a", ConnectionId(1), true, Player::from).unwrap();
        reg.join("b", ConnectionId(2), true, Player::from).unwrap();

        assert_eq!(
            reg.join("a", ConnectionId(7), true, Player::from),
            Ok(JoinOutcome::AlreadyIn)
        );
        assert_eq!(
            reg.join("b", ConnectionId(8), true, Player::from),
            Ok(JoinOutcome::AlreadyIn)
        );
        assert_eq!(reg.connection_of("a"), Some(ConnectionId(7)));
        assert_eq!(reg.connection_of("b"), Some(ConnectionId(8)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn leave_then_promote_is_fifo() {
        let mut reg = registry(1);
        reg.join("a", ConnectionId(1), true, Player::from).unwrap();
        reg.join("b", ConnectionId(2), true, Player::from).unwrap();
        reg.join("c", ConnectionId(3), true, Player::from).unwrap();

        assert!(matches!(
            reg.leave("a"),
            Some(Departure::Seat { index: 0, .. })
        ));
        assert_eq!(reg.promote(Player::from), vec!["b".to_owned()]);
        assert_eq!(reg.waitlist_position("c"), Some(1));
    }

    #[test]
    fn spectator_moves_to_seat_on_join() {
        let mut reg = registry(1);
        assert!(reg.spectate("s", ConnectionId(1)));
        assert_eq!(reg.spectator_count(), 1);

        reg.join("s", ConnectionId(2), true, Player::from).unwrap();
        assert_eq!(reg.spectator_count(), 0);
        assert_eq!(reg.viewers(), vec!["s".to_owned()]);
    }
}
