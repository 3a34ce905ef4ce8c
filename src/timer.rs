//! Deadline bookkeeping for session timers.
//!
//! Games never sleep. They record what should fire and when through
//! [`Timers`]; the session actor turns each [`TimerRequest`] into a
//! cancellable task which feeds the [`TimerTicket`] back into the same inbox
//! as client requests. A ticket is only honoured while it is the latest one
//! armed for its slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Creates a clock reading `now_ms`.
    #[must_use]
    pub const fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Named timer slots. At most one timer per slot is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerSlot {
    /// Betting countdown.
    Betting,
    /// Per-turn action countdown.
    Turn,
    /// Pacing between dealer cards.
    Reveal,
    /// Pause between the end of a round and the next one.
    Cooldown,
    /// Randomised go signal of the duel.
    Signal,
}

/// The seat and hand a turn timer was armed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTarget {
    /// Identity whose turn it was.
    pub identity: String,
    /// Hand index within that seat.
    pub hand: usize,
}

/// Proof that a particular arming of a slot fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTicket {
    /// Slot the timer belongs to.
    pub slot: TimerSlot,
    /// Unique arming number.
    pub generation: u64,
    /// Turn the timer was armed for, if it is a turn timer.
    pub target: Option<TurnTarget>,
}

/// Instruction for whoever schedules the timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerRequest {
    /// Fire `ticket` after `after`, replacing any timer in the same slot.
    Arm {
        /// Ticket to deliver.
        ticket: TimerTicket,
        /// Delay before delivery.
        after: Duration,
    },
    /// Drop the timer in this slot.
    Cancel(TimerSlot),
}

#[derive(Debug, Clone)]
struct Armed {
    ticket: TimerTicket,
    deadline_ms: u64,
}

/// Armed timers of one session plus the requests not yet handed to the
/// scheduler.
#[derive(Debug, Default)]
pub struct Timers {
    generation: u64,
    armed: HashMap<TimerSlot, Armed>,
    requests: Vec<TimerRequest>,
}

impl Timers {
    /// Creates an empty timer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `slot` to fire after `after`, superseding the previous arming.
    pub fn arm(
        &mut self,
        slot: TimerSlot,
        target: Option<TurnTarget>,
        after: Duration,
        now_ms: u64,
    ) -> TimerTicket {
        self.generation += 1;
        let ticket = TimerTicket {
            slot,
            generation: self.generation,
            target,
        };
        self.armed.insert(
            slot,
            Armed {
                ticket: ticket.clone(),
                deadline_ms: now_ms + after.as_millis() as u64,
            },
        );
        self.requests.push(TimerRequest::Arm {
            ticket: ticket.clone(),
            after,
        });
        ticket
    }

    /// Cancels the timer in `slot`, if any.
    pub fn cancel(&mut self, slot: TimerSlot) {
        if self.armed.remove(&slot).is_some() {
            self.requests.push(TimerRequest::Cancel(slot));
        }
    }

    /// Cancels every armed timer.
    pub fn cancel_all(&mut self) {
        let mut slots: Vec<TimerSlot> = self.armed.keys().copied().collect();
        slots.sort_by_key(|slot| *slot as u8);
        for slot in slots {
            self.cancel(slot);
        }
    }

    /// Consumes a fired ticket. Returns `false` for a ticket that has been
    /// superseded or cancelled; the caller must then do nothing.
    pub fn take_fired(&mut self, ticket: &TimerTicket) -> bool {
        let current = self
            .armed
            .get(&ticket.slot)
            .is_some_and(|armed| armed.ticket.generation == ticket.generation);
        if current {
            self.armed.remove(&ticket.slot);
        }
        current
    }

    /// Absolute deadline of the timer in `slot`, in epoch milliseconds.
    #[must_use]
    pub fn deadline(&self, slot: TimerSlot) -> Option<u64> {
        self.armed.get(&slot).map(|armed| armed.deadline_ms)
    }

    /// The ticket currently armed in `slot`.
    #[must_use]
    pub fn ticket(&self, slot: TimerSlot) -> Option<&TimerTicket> {
        self.armed.get(&slot).map(|armed| &armed.ticket)
    }

    /// Returns whether `slot` is armed.
    #[must_use]
    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.armed.contains_key(&slot)
    }

    /// Hands the pending scheduling requests to the caller.
    pub fn drain_requests(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_supersedes_previous_ticket() {
        let mut timers = Timers::new();
        let first = timers.arm(TimerSlot::Turn, None, Duration::from_secs(15), 1_000);
        let second = timers.arm(TimerSlot::Turn, None, Duration::from_secs(15), 2_000);

        assert!(!timers.take_fired(&first));
        assert_eq!(timers.deadline(TimerSlot::Turn), Some(17_000));
        assert!(timers.take_fired(&second));
        assert!(!timers.is_armed(TimerSlot::Turn));
    }

    #[test]
    fn cancelled_ticket_is_stale() {
        let mut timers = Timers::new();
        let ticket = timers.arm(TimerSlot::Betting, None, Duration::from_secs(1), 0);
        timers.cancel(TimerSlot::Betting);

        assert!(!timers.take_fired(&ticket));
        assert_eq!(
            timers.drain_requests(),
            vec![
                TimerRequest::Arm {
                    ticket,
                    after: Duration::from_secs(1)
                },
                TimerRequest::Cancel(TimerSlot::Betting),
            ]
        );
    }

    #[test]
    fn cancelling_an_idle_slot_requests_nothing() {
        let mut timers = Timers::new();
        timers.cancel(TimerSlot::Reveal);
        assert!(timers.drain_requests().is_empty());
    }
}
