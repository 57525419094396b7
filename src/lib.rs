//! # sqlite-provider
//!
//! A SQLite provider core: typed parameter binding driven by coercion
//! policies, and nested transactions built from savepoints.
//!
//! The work is split across three crates, re-exported here:
//!
//! - **`sqlite-native`**: the native engine traits, a `libsqlite3-sys`
//!   backed [`SqliteEngine`], date/time storage formats and the
//!   [`ProviderLog`] capability
//! - **`sqlite-param-binder`**: [`Value`], [`Parameter`] and
//!   [`ParameterCollection`], coercion of values to bind operations, the
//!   per-statement parameter directory and the binder
//! - **`sqlite-nested-tx`**: the [`TransactionLedger`] and
//!   [`TransactionContext`]
//!
//! This crate ties them together as a [`Connection`] handing out
//! [`Command`]s and transactions, configured by a [`ProviderConfig`].
//!
//! ```
//! use sqlite_provider::{Connection, DbType, Parameter, ProviderConfig};
//!
//! # fn main() -> sqlite_provider::Result<()> {
//! let conn = Connection::open_in_memory(ProviderConfig::default())?;
//! conn.execute("CREATE TABLE prices (sku TEXT, amount TEXT)")?;
//!
//! let mut outer = conn.begin()?;
//! let mut inner = conn.begin()?; // SAVEPOINT sp_1
//! conn.command("INSERT INTO prices VALUES (:sku, :amount)")?
//!    .with_parameter("sku", "A-1")
//!    .with_param(Parameter::new("amount", 12.5).with_db_type(DbType::Decimal))
//!    .execute()?;
//! inner.rollback()?;
//! outer.commit()?;
//!
//! let rows = conn.command("SELECT count(*) FROM prices")?.execute_scalar()?;
//! assert_eq!(rows, Some(0));
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod connection;
mod error;

pub use command::Command;
pub use config::ProviderConfig;
pub use connection::Connection;
pub use error::{Error, Result};

pub use sqlite_native::{
   DateTimeFormat, LogEvent, NativeEngine, NativeStatement, ProviderLog, SqliteEngine,
   SqliteStatement, Step, TracingLog,
};
pub use sqlite_nested_tx::{
   BeginMode, RollbackOutcome, TransactionContext, TransactionLedger, TransactionPolicy,
};
pub use sqlite_param_binder::{
   BindOp, BindPolicy, BindSettings, BindValueCallback, CustomBind, DbType, Decimal, MappingToken,
   Parameter, ParameterCollection, ResolveReport, StatementBatch, TextCulture, Value,
};
