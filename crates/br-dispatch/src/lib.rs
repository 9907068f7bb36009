//! File dispatch for busrelay
//!
//! Reads a message file, checks it against the execution ledger, and sends
//! each non-blank line as one message, pacing the send loop.

pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod pacing;

pub use dispatcher::{DispatchOutcome, Dispatcher, LedgerOrdering};
pub use error::DispatchError;
pub use ledger::{ExecutionLedger, FileLedger};
pub use pacing::{BurstPacer, NoPacing, PacingPolicy, RatePacer};

pub type Result<T> = std::result::Result<T, DispatchError>;
