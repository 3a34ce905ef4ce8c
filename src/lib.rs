//! Shared, server-authoritative multiplayer game sessions.
//!
//! The crate hosts long-lived tables that players join over a WebSocket:
//! a blackjack table with escrowed betting against a dealer, a shedding card
//! game ([`StackGame`]), four-in-a-row ([`GridGame`]) and a reaction duel
//! ([`DuelGame`]). Each table is plain synchronous state implementing
//! [`GameSession`]; [`runtime::SessionActor`] owns one table per task and
//! serialises every join, command and timer through its inbox.
//!
//! Money only moves through the [`Ledger`]: a bet is debited when it is
//! placed, held in escrow, and leaves escrow as exactly one payout or
//! refund.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use parlor::registry::ConnectionId;
//! use parlor::{
//!     BlackjackTable, GameCommand, GameSession, ManualClock, MemoryStore, ProfitCap,
//!     StoreLedger, TableOptions,
//! };
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let ledger = Arc::new(StoreLedger::new(
//!     MemoryStore::new(),
//!     1_000,
//!     ProfitCap::UNCAPPED,
//!     clock.clone(),
//! ));
//! let mut table = BlackjackTable::new(TableOptions::default(), 42, ledger, clock);
//!
//! table.join("ann", ConnectionId(1)).unwrap();
//! table.start("ann").unwrap();
//! table.command("ann", GameCommand::Bet { amount: 100 }).unwrap();
//! assert_eq!(table.seat("ann").map(|seat| seat.total_bet()), Some(100));
//! ```

pub mod blackjack;
pub mod broadcast;
pub mod card;
pub mod deck;
pub mod duel;
pub mod error;
pub mod grid;
pub mod hand;
pub mod ledger;
pub mod options;
pub mod registry;
pub mod result;
pub mod runtime;
pub mod server;
pub mod session;
pub mod stack;
mod sync;
pub mod timer;

// Re-export main types
pub use blackjack::{BlackjackTable, Phase, SeatStatus, TableView, TurnPosition};
pub use broadcast::{Broadcast, Envelope, NoticeKind, Outbound, Recorder, TableNotice};
pub use card::{Card, DECK_SIZE, Suit};
pub use deck::Deck;
pub use duel::{DuelGame, DuelPhase, DuelResult};
pub use error::{
    ActionError, BetError, IntegrityError, JoinError, LedgerError, MoveError, Rejection,
    StartError,
};
pub use grid::{Board, GridGame, GridPhase};
pub use hand::{DealerHand, Hand, HandStatus};
pub use ledger::{FileStore, KeyValueStore, Ledger, MemoryStore, ProfitCap, StoreLedger};
pub use options::{DuelOptions, GridOptions, StackOptions, TableOptions};
pub use registry::{ConnectionId, JoinOutcome};
pub use result::{HandOutcome, HandResult, RoundResult, SeatResult};
pub use session::{AbortReason, GameCommand, GameKind, GameSession, RefundReport};
pub use stack::{StackGame, StackPhase};
pub use timer::{Clock, ManualClock, SystemClock, TimerSlot};
