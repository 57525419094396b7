//! # sqlite-nested-tx
//!
//! Nested transactions on a single SQLite connection. The outermost level is
//! a real transaction; inner levels are named savepoints.
//!
//! ```
//! use sqlite_nested_tx::{BeginMode, TransactionLedger};
//! use sqlite_native::SqliteEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = TransactionLedger::new(SqliteEngine::open_in_memory()?);
//!
//! let mut outer = ledger.begin(BeginMode::Immediate)?; // BEGIN IMMEDIATE
//! let mut inner = ledger.begin(BeginMode::Deferred)?;  // SAVEPOINT sp_1
//! assert_eq!(ledger.depth(), 2);
//!
//! inner.rollback()?; // ROLLBACK TO sp_1
//! outer.commit()?;   // COMMIT
//! assert_eq!(ledger.depth(), 0);
//! # Ok(())
//! # }
//! ```

mod error;
mod ledger;

pub use error::{Error, Result};
pub use ledger::{BeginMode, RollbackOutcome, TransactionContext, TransactionLedger, TransactionPolicy};
