//! Async plumbing around the synchronous sessions: one actor task per
//! session, the connection hub that fans events out to sockets, and the
//! shutdown sequence.

mod actor;
mod hub;
mod shutdown;

pub use actor::{SessionActor, SessionError, SessionEvent, SessionHandle};
pub use hub::ConnectionHub;
pub use shutdown::{ShutdownCoordinator, ShutdownHook, ShutdownReport};

const LOG_TARGET: &str = "parlor::runtime";
