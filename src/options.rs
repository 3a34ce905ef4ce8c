//! Per-game configuration options.
//!
//! Every options type has a `Default` matching the live tables and
//! `with_*` builders. They also deserialize from the server configuration
//! file, where durations are given in milliseconds (`turn_time_ms = 15000`)
//! and any field may be omitted.

use std::time::Duration;

use serde::Deserialize;

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Configuration options for the blackjack table.
///
/// Use the builder pattern to customize options:
///
/// ```
/// use parlor::TableOptions;
///
/// let options = TableOptions::default()
///     .with_decks(6)
///     .with_max_bet_percent(25)
///     .with_auto_restart(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Number of seats.
    pub seats: usize,
    /// Number of identities that may wait for a seat.
    pub waitlist: usize,
    /// Number of decks in the shoe.
    pub decks: u8,
    /// Smallest accepted bet.
    pub min_bet: u64,
    /// Largest bet as a percentage of the current balance.
    pub max_bet_percent: u8,
    /// Profit on a natural as a percentage of the bet (150 pays 3:2).
    pub blackjack_payout_percent: u64,
    /// How long seats have to place their bets.
    #[serde(rename = "betting_time_ms", deserialize_with = "millis::deserialize")]
    pub betting_time: Duration,
    /// How long a hand may stall before it stands automatically.
    #[serde(rename = "turn_time_ms", deserialize_with = "millis::deserialize")]
    pub turn_time: Duration,
    /// Pause between dealer cards.
    #[serde(rename = "dealer_delay_ms", deserialize_with = "millis::deserialize")]
    pub dealer_delay: Duration,
    /// Pause between payout and the next round.
    #[serde(rename = "cooldown_ms", deserialize_with = "millis::deserialize")]
    pub cooldown: Duration,
    /// Whether a new betting round opens by itself after the cooldown.
    pub auto_restart: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            seats: 4,
            waitlist: 16,
            decks: 8,
            min_bet: 1,
            max_bet_percent: 50,
            blackjack_payout_percent: 150,
            betting_time: Duration::from_secs(15),
            turn_time: Duration::from_secs(15),
            dealer_delay: Duration::from_millis(800),
            cooldown: Duration::from_secs(4),
            auto_restart: true,
        }
    }
}

impl TableOptions {
    /// Sets the number of seats.
    ///
    /// # Example
    ///
    /// ```
    /// use parlor::TableOptions;
    ///
    /// let options = TableOptions::default().with_seats(2);
    /// assert_eq!(options.seats, 2);
    /// ```
    #[must_use]
    pub const fn with_seats(mut self, seats: usize) -> Self {
        self.seats = seats;
        self
    }

    /// Sets the waitlist capacity.
    #[must_use]
    pub const fn with_waitlist(mut self, waitlist: usize) -> Self {
        self.waitlist = waitlist;
        self
    }

    /// Sets the number of decks.
    ///
    /// # Example
    ///
    /// ```
    /// use parlor::TableOptions;
    ///
    /// let options = TableOptions::default().with_decks(6);
    /// assert_eq!(options.decks, 6);
    /// ```
    #[must_use]
    pub const fn with_decks(mut self, decks: u8) -> Self {
        self.decks = decks;
        self
    }

    /// Sets the table minimum.
    #[must_use]
    pub const fn with_min_bet(mut self, min_bet: u64) -> Self {
        self.min_bet = min_bet;
        self
    }

    /// Sets the largest bet as a percentage of the balance.
    ///
    /// # Example
    ///
    /// ```
    /// use parlor::TableOptions;
    ///
    /// let options = TableOptions::default().with_max_bet_percent(100);
    /// assert_eq!(options.max_bet_percent, 100);
    /// ```
    #[must_use]
    pub const fn with_max_bet_percent(mut self, percent: u8) -> Self {
        self.max_bet_percent = percent;
        self
    }

    /// Sets the profit on a natural as a percentage of the bet.
    #[must_use]
    pub const fn with_blackjack_payout_percent(mut self, percent: u64) -> Self {
        self.blackjack_payout_percent = percent;
        self
    }

    /// Sets the betting countdown.
    #[must_use]
    pub const fn with_betting_time(mut self, time: Duration) -> Self {
        self.betting_time = time;
        self
    }

    /// Sets the per-turn countdown.
    #[must_use]
    pub const fn with_turn_time(mut self, time: Duration) -> Self {
        self.turn_time = time;
        self
    }

    /// Sets the pause between dealer cards. Zero draws the dealer's hand in
    /// one go.
    #[must_use]
    pub const fn with_dealer_delay(mut self, delay: Duration) -> Self {
        self.dealer_delay = delay;
        self
    }

    /// Sets the pause after payout.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets whether betting reopens by itself after a round.
    #[must_use]
    pub const fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    /// Largest bet allowed for a balance.
    #[must_use]
    pub const fn max_bet(&self, balance: u64) -> u64 {
        let percent = self.max_bet_percent as u64;
        (balance / 100)
            .saturating_mul(percent)
            .saturating_add(balance % 100 * percent / 100)
    }
}

/// Configuration options for the stacking card game.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StackOptions {
    /// Number of seats.
    pub seats: usize,
    /// Number of identities that may wait for a seat.
    pub waitlist: usize,
    /// Cards dealt to each player.
    pub hand_size: usize,
    /// How long a player may stall before drawing automatically.
    #[serde(rename = "turn_time_ms", deserialize_with = "millis::deserialize")]
    pub turn_time: Duration,
    /// Pause after a game before seats are reshuffled.
    #[serde(rename = "cooldown_ms", deserialize_with = "millis::deserialize")]
    pub cooldown: Duration,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            seats: 4,
            waitlist: 16,
            hand_size: 5,
            turn_time: Duration::from_secs(20),
            cooldown: Duration::from_secs(5),
        }
    }
}

impl StackOptions {
    /// Sets the number of seats.
    #[must_use]
    pub const fn with_seats(mut self, seats: usize) -> Self {
        self.seats = seats;
        self
    }

    /// Sets the number of cards dealt to each player.
    #[must_use]
    pub const fn with_hand_size(mut self, hand_size: usize) -> Self {
        self.hand_size = hand_size;
        self
    }

    /// Sets the per-turn countdown.
    #[must_use]
    pub const fn with_turn_time(mut self, time: Duration) -> Self {
        self.turn_time = time;
        self
    }

    /// Cards a deal takes for `players`: every hand plus the face-up card.
    #[must_use]
    pub const fn cards_needed(&self, players: usize) -> usize {
        self.hand_size.saturating_mul(players).saturating_add(1)
    }
}

/// Configuration options for the grid game.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Number of identities that may wait for a seat.
    pub waitlist: usize,
    /// Board width.
    pub columns: usize,
    /// Board height.
    pub rows: usize,
    /// Discs in a row needed to win.
    pub connect: usize,
    /// How long a player may stall before a disc is dropped for them.
    #[serde(rename = "turn_time_ms", deserialize_with = "millis::deserialize")]
    pub turn_time: Duration,
    /// Pause after a game before the board is cleared.
    #[serde(rename = "cooldown_ms", deserialize_with = "millis::deserialize")]
    pub cooldown: Duration,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            waitlist: 16,
            columns: 7,
            rows: 6,
            connect: 4,
            turn_time: Duration::from_secs(20),
            cooldown: Duration::from_secs(5),
        }
    }
}

impl GridOptions {
    /// Sets the per-turn countdown.
    #[must_use]
    pub const fn with_turn_time(mut self, time: Duration) -> Self {
        self.turn_time = time;
        self
    }

    /// Sets the board size.
    #[must_use]
    pub const fn with_board(mut self, columns: usize, rows: usize) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }
}

/// Configuration options for the reaction duel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DuelOptions {
    /// Number of identities that may wait for a seat.
    pub waitlist: usize,
    /// Earliest go signal after the start.
    #[serde(rename = "min_signal_ms", deserialize_with = "millis::deserialize")]
    pub min_signal: Duration,
    /// Latest go signal after the start.
    #[serde(rename = "max_signal_ms", deserialize_with = "millis::deserialize")]
    pub max_signal: Duration,
    /// How long after the signal a reaction still counts.
    #[serde(rename = "reaction_window_ms", deserialize_with = "millis::deserialize")]
    pub reaction_window: Duration,
    /// Pause after a duel before the next one may start.
    #[serde(rename = "cooldown_ms", deserialize_with = "millis::deserialize")]
    pub cooldown: Duration,
}

impl Default for DuelOptions {
    fn default() -> Self {
        Self {
            waitlist: 16,
            min_signal: Duration::from_millis(1_500),
            max_signal: Duration::from_millis(4_000),
            reaction_window: Duration::from_secs(3),
            cooldown: Duration::from_secs(3),
        }
    }
}

impl DuelOptions {
    /// Sets the window in which the go signal is drawn.
    #[must_use]
    pub const fn with_signal_window(mut self, min: Duration, max: Duration) -> Self {
        self.min_signal = min;
        self.max_signal = max;
        self
    }

    /// Sets how long reactions are accepted after the signal.
    #[must_use]
    pub const fn with_reaction_window(mut self, window: Duration) -> Self {
        self.reaction_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let options = TableOptions::default()
            .with_seats(2)
            .with_decks(1)
            .with_min_bet(10)
            .with_max_bet_percent(20)
            .with_turn_time(Duration::from_secs(5))
            .with_auto_restart(false);

        assert_eq!(options.seats, 2);
        assert_eq!(options.decks, 1);
        assert_eq!(options.min_bet, 10);
        assert_eq!(options.max_bet_percent, 20);
        assert_eq!(options.turn_time, Duration::from_secs(5));
        assert!(!options.auto_restart);
    }

    #[test]
    fn max_bet_is_floor_of_percentage() {
        let options = TableOptions::default();
        assert_eq!(options.max_bet(1_000), 500);
        assert_eq!(options.max_bet(1_001), 500);
        assert_eq!(options.max_bet(3), 1);
        assert_eq!(options.clone().with_max_bet_percent(100).max_bet(77), 77);
        assert_eq!(options.with_max_bet_percent(200).max_bet(u64::MAX), u64::MAX);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let options: TableOptions = toml::from_str("seats = 2\nturn_time_ms = 5000").unwrap();
        assert_eq!(options.seats, 2);
        assert_eq!(options.turn_time, Duration::from_secs(5));
        assert_eq!(options.decks, 8);
    }
}
