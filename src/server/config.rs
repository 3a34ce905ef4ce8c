//! Server configuration file.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! shutdown_grace_ms = 3000
//!
//! [ledger]
//! path = "balances.json"
//! starting_balance = 1000
//!
//! [ledger.profit_cap]
//! daily = 50000
//!
//! [blackjack]
//! min_bet = 10
//! turn_time_ms = 20000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::card::DECK_SIZE;
use crate::ledger::ProfitCap;
use crate::options::{DuelOptions, GridOptions, StackOptions, TableOptions, millis};

/// Balance storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON file holding balances. Balances are kept in memory when unset.
    pub path: Option<PathBuf>,
    /// Balance of an identity seen for the first time.
    pub starting_balance: u64,
    /// Daily profit cap.
    pub profit_cap: ProfitCap,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            starting_balance: 1_000,
            profit_cap: ProfitCap::default(),
        }
    }
}

/// Everything the server binary reads from its configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Seed for the session RNGs. Taken from the clock when unset.
    pub seed: Option<u64>,
    /// How long clients get to flush progress before refunds start.
    #[serde(rename = "shutdown_grace_ms", deserialize_with = "millis::deserialize")]
    pub shutdown_grace: Duration,
    /// Balance storage.
    pub ledger: LedgerConfig,
    /// Blackjack table.
    pub blackjack: TableOptions,
    /// Shedding game.
    pub stack: StackOptions,
    /// Four-in-a-row.
    pub grid: GridOptions,
    /// Reaction duel.
    pub duel: DuelOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            seed: None,
            shutdown_grace: Duration::from_secs(3),
            ledger: LedgerConfig::default(),
            blackjack: TableOptions::default(),
            stack: StackOptions::default(),
            grid: GridOptions::default(),
            duel: DuelOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or a value has the
    /// wrong type.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no game could start with.
    ///
    /// # Errors
    ///
    /// Returns an error if a full stack table cannot be dealt from one deck.
    pub fn validate(&self) -> anyhow::Result<()> {
        let needed = self.stack.cards_needed(self.stack.seats);
        anyhow::ensure!(
            needed <= DECK_SIZE,
            "stack: {} seats of {} cards need {needed} cards, one deck holds {DECK_SIZE}",
            self.stack.seats,
            self.stack.hand_size,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(ServerConfig::from_toml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn sections_override_their_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            bind = "0.0.0.0:9000"
            shutdown_grace_ms = 500

            [ledger]
            starting_balance = 250

            [ledger.profit_cap]
            daily = 100
            balance_percent = 10

            [blackjack]
            min_bet = 5
            turn_time_ms = 30000

            [grid]
            columns = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
        assert_eq!(config.ledger.starting_balance, 250);
        assert_eq!(config.ledger.profit_cap.limit(1_000), Some(200));
        assert_eq!(config.blackjack.min_bet, 5);
        assert_eq!(config.blackjack.turn_time, Duration::from_secs(30));
        assert_eq!(config.blackjack.seats, TableOptions::default().seats);
        assert_eq!(config.grid.columns, 9);
        assert_eq!(config.duel, DuelOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stack_hands_must_fit_in_one_deck() {
        let config = ServerConfig::from_toml("[stack]\nseats = 4\nhand_size = 13").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("need 53 cards"));

        let config = ServerConfig::from_toml("[stack]\nseats = 4\nhand_size = 12").unwrap();
        assert!(config.validate().is_ok());
    }
}
