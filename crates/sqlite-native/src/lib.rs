//! # sqlite-native
//!
//! The native call surface used by the provider core, expressed as two traits:
//!
//! - **[`NativeEngine`]**: prepare statements and run control statements
//!   (`BEGIN`, `SAVEPOINT`, `RELEASE`, `ROLLBACK TO`, ...)
//! - **[`NativeStatement`]**: report parameter count and names, bind by
//!   1-based position, step and reset
//!
//! Implementations:
//!
//! - **[`SqliteEngine`]**: a real SQLite connection via `libsqlite3-sys`
//! - **`RecordingEngine`** (feature `recording`): records every call without
//!   touching a database, for asserting exact native call sequences
//!
//! Also here: date/time storage encodings ([`DateTimeFormat`]) and the
//! explicit logging capability ([`ProviderLog`]).
//!
//! ```no_run
//! use sqlite_native::{NativeEngine, NativeStatement, SqliteEngine};
//!
//! # fn main() -> sqlite_native::Result<()> {
//! let mut engine = SqliteEngine::open_in_memory()?;
//! engine.execute("CREATE TABLE t (v)")?;
//!
//! let prepared = engine.prepare("INSERT INTO t VALUES (:v)")?;
//! let mut stmt = prepared.statement.expect("statement");
//! stmt.bind_i64(1, 42)?;
//! stmt.step()?;
//! # Ok(())
//! # }
//! ```

mod datetime;
mod engine;
mod error;
mod log;
#[cfg(feature = "recording")]
pub mod recording;
mod sqlite;

pub use datetime::{DateTimeFormat, StoredDateTime, format_iso8601};
pub use engine::{NativeEngine, NativeStatement, Prepared, Step};
pub use error::Error;
pub use log::{LogEvent, ProviderLog, TracingLog, tracing_log};
pub use sqlite::{SqliteEngine, SqliteStatement};

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
