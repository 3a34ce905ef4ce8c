//! Persistent balances.
//!
//! The engine only talks to the [`Ledger`] trait. [`StoreLedger`] is the
//! stock implementation over any [`KeyValueStore`], keeping each balance
//! under `balance:<identity>` and each day's realised profit under
//! `profit:<identity>:<day>`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::sync::Mutex;
use crate::timer::Clock;

const LOG_TARGET: &str = "parlor::ledger";
const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

/// Balance reads and writes for player identities.
///
/// Calls are synchronous and must be durable when they return: a credit is
/// only reported to a client after `credit` succeeded.
pub trait Ledger: Send + Sync {
    /// Current balance of `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn balance(&self, identity: &str) -> Result<u64, LedgerError>;

    /// Adds `amount` and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn credit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Removes `amount` and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if the balance is too low,
    /// or an error if the backing store fails.
    fn debit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Clips `profit` to what `identity` may still realise today and records
    /// the allowed part as realised. Returns the allowed amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn apply_daily_profit_cap(
        &self,
        identity: &str,
        profit: u64,
        balance: u64,
    ) -> Result<u64, LedgerError>;
}

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Reads `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    /// Writes `key`, durably.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save(&self, key: &str, value: String) -> Result<(), LedgerError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        (**self).get(key)
    }

    fn save(&self, key: &str, value: String) -> Result<(), LedgerError> {
        (**self).save(key, value)
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: String) -> Result<(), LedgerError> {
        self.entries.lock().insert(key.to_owned(), value);
        Ok(())
    }
}

/// A JSON object on disk, rewritten through a temporary file and a rename on
/// every save.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or starts) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|_| LedgerError::Corrupt(path.display().to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(LedgerError::Unavailable(err.to_string())),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), LedgerError> {
        let raw = serde_json::to_string(entries)
            .map_err(|err| LedgerError::Unavailable(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw).map_err(|err| LedgerError::Unavailable(err.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|err| LedgerError::Unavailable(err.to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: String) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_owned(), value);
        if let Err(err) = self.persist(&entries) {
            match previous {
                Some(previous) => entries.insert(key.to_owned(), previous),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }
}

/// How much profit an identity may realise per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfitCap {
    /// Flat daily allowance. `None` disables the cap.
    pub daily: Option<u64>,
    /// Extra allowance as a percentage of the balance at settlement time.
    pub balance_percent: u8,
}

impl Default for ProfitCap {
    fn default() -> Self {
        Self {
            daily: Some(50_000),
            balance_percent: 0,
        }
    }
}

impl ProfitCap {
    /// No cap at all.
    pub const UNCAPPED: Self = Self {
        daily: None,
        balance_percent: 0,
    };

    /// Daily allowance for a player holding `balance`.
    #[must_use]
    pub const fn limit(&self, balance: u64) -> Option<u64> {
        match self.daily {
            Some(daily) => {
                let extra = (balance / 100).saturating_mul(self.balance_percent as u64);
                Some(daily.saturating_add(extra))
            }
            None => None,
        }
    }
}

/// [`Ledger`] over a [`KeyValueStore`].
pub struct StoreLedger<S> {
    store: S,
    starting_balance: u64,
    cap: ProfitCap,
    clock: Arc<dyn Clock>,
    // Serialises read-modify-write cycles on the store.
    write: Mutex<()>,
}

impl<S: KeyValueStore> StoreLedger<S> {
    /// Creates a ledger. Identities never seen before start with
    /// `starting_balance`.
    pub fn new(store: S, starting_balance: u64, cap: ProfitCap, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            starting_balance,
            cap,
            clock,
            write: Mutex::new(()),
        }
    }

    fn read_u64(&self, key: &str) -> Result<Option<u64>, LedgerError> {
        self.store
            .get(key)?
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| LedgerError::Corrupt(key.to_owned()))
            })
            .transpose()
    }

    fn read_balance(&self, identity: &str) -> Result<u64, LedgerError> {
        Ok(self
            .read_u64(&balance_key(identity))?
            .unwrap_or(self.starting_balance))
    }
}

fn balance_key(identity: &str) -> String {
    format!("balance:{identity}")
}

fn profit_key(identity: &str, day: u64) -> String {
    format!("profit:{identity}:{day}")
}

impl<S: KeyValueStore> Ledger for StoreLedger<S> {
    fn balance(&self, identity: &str) -> Result<u64, LedgerError> {
        self.read_balance(identity)
    }

    fn credit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError> {
        let _guard = self.write.lock();
        let balance = self.read_balance(identity)?.saturating_add(amount);
        self.store.save(&balance_key(identity), balance.to_string())?;
        debug!(target: LOG_TARGET, identity, amount, balance, "credited");
        Ok(balance)
    }

    fn debit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError> {
        let _guard = self.write.lock();
        let available = self.read_balance(identity)?;
        let Some(balance) = available.checked_sub(amount) else {
            return Err(LedgerError::InsufficientFunds {
                available,
                requested: amount,
            });
        };
        self.store.save(&balance_key(identity), balance.to_string())?;
        debug!(target: LOG_TARGET, identity, amount, balance, "debited");
        Ok(balance)
    }

    fn apply_daily_profit_cap(
        &self,
        identity: &str,
        profit: u64,
        balance: u64,
    ) -> Result<u64, LedgerError> {
        let Some(limit) = self.cap.limit(balance) else {
            return Ok(profit);
        };

        let _guard = self.write.lock();
        let key = profit_key(identity, self.clock.now_ms() / DAY_MS);
        let realised = self.read_u64(&key)?.unwrap_or(0);
        let allowed = profit.min(limit.saturating_sub(realised));
        if allowed < profit {
            warn!(
                target: LOG_TARGET,
                identity,
                profit,
                allowed,
                limit,
                "daily profit cap reached"
            );
        }
        self.store.save(&key, (realised + allowed).to_string())?;
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    fn ledger(cap: ProfitCap) -> StoreLedger<MemoryStore> {
        StoreLedger::new(MemoryStore::new(), 1_000, cap, Arc::new(ManualClock::new(0)))
    }

    #[test]
    fn unknown_identity_starts_with_default_balance() {
        let ledger = ledger(ProfitCap::UNCAPPED);
        assert_eq!(ledger.balance("new"), Ok(1_000));
    }

    #[test]
    fn debit_refuses_overdraft() {
        let ledger = ledger(ProfitCap::UNCAPPED);
        assert_eq!(ledger.debit("a", 400), Ok(600));
        assert_eq!(
            ledger.debit("a", 601),
            Err(LedgerError::InsufficientFunds {
                available: 600,
                requested: 601
            })
        );
        assert_eq!(ledger.credit("a", 50), Ok(650));
    }

    #[test]
    fn profit_cap_clips_and_accumulates_per_day() {
        let clock = Arc::new(ManualClock::new(0));
        let ledger = StoreLedger::new(
            MemoryStore::new(),
            1_000,
            ProfitCap {
                daily: Some(300),
                balance_percent: 0,
            },
            clock.clone(),
        );

        assert_eq!(ledger.apply_daily_profit_cap("a", 200, 1_000), Ok(200));
        assert_eq!(ledger.apply_daily_profit_cap("a", 200, 1_000), Ok(100));
        assert_eq!(ledger.apply_daily_profit_cap("a", 50, 1_000), Ok(0));

        clock.advance(std::time::Duration::from_millis(DAY_MS));
        assert_eq!(ledger.apply_daily_profit_cap("a", 50, 1_000), Ok(50));
    }

    #[test]
    fn cap_limit_saturates_instead_of_overflowing() {
        let cap = ProfitCap {
            daily: Some(u64::MAX - 5),
            balance_percent: 200,
        };
        assert_eq!(cap.limit(1_000), Some(u64::MAX));
        assert_eq!(cap.limit(u64::MAX), Some(u64::MAX));

        let cap = ProfitCap {
            daily: Some(100),
            balance_percent: 10,
        };
        assert_eq!(cap.limit(1_000), Some(200));
    }

    #[test]
    fn corrupt_balance_is_reported() {
        let store = MemoryStore::new();
        store.save("balance:a", "lots".to_owned()).unwrap();
        let ledger = StoreLedger::new(
            store,
            0,
            ProfitCap::UNCAPPED,
            Arc::new(ManualClock::new(0)),
        );
        assert_eq!(
            ledger.balance("a"),
            Err(LedgerError::Corrupt("balance:a".to_owned()))
        );
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("parlor-ledger-{}.json", std::process::id()));
        {
            let store = FileStore::open(&path).unwrap();
            store.save("balance:a", "42".to_owned()).unwrap();
        }
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("balance:a"), Ok(Some("42".to_owned())));
        let _ = fs::remove_file(&path);
    }
}
