//! A provider connection: one native engine, its transaction ledger and the
//! settings every binding pass uses.

use std::fmt;
use std::sync::Arc;

use sqlite_native::{NativeEngine, ProviderLog, SqliteEngine, tracing_log};
use sqlite_nested_tx::{BeginMode, TransactionContext, TransactionLedger};
use sqlite_param_binder::{BindSettings, BindValueCallback};
use tracing::debug;

use crate::{Command, ProviderConfig, Result};

/// Owns the native engine (through its [`TransactionLedger`]) and hands out
/// commands and transactions.
///
/// # Example
///
/// ```
/// use sqlite_provider::{Connection, ProviderConfig};
///
/// # fn main() -> sqlite_provider::Result<()> {
/// let conn = Connection::open_in_memory(ProviderConfig::default())?;
/// conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
///
/// let mut tx = conn.begin()?;
/// conn.command("INSERT INTO notes (body) VALUES (:body)")?
///    .with_parameter("body", "hello")
///    .execute()?;
/// tx.commit()?;
///
/// let count = conn.command("SELECT count(*) FROM notes")?.execute_scalar()?;
/// assert_eq!(count, Some(1));
/// # Ok(())
/// # }
/// ```
pub struct Connection<E: NativeEngine> {
   pub(crate) ledger: TransactionLedger<E>,
   pub(crate) settings: BindSettings,
   config: ProviderConfig,
}

impl<E: NativeEngine> fmt::Debug for Connection<E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Connection")
         .field("ledger", &self.ledger)
         .field("settings", &self.settings)
         .field("config", &self.config)
         .finish()
   }
}

impl Connection<SqliteEngine> {
   /// Open (or create) the database file at `path`.
   pub fn open(path: &str, config: ProviderConfig) -> Result<Self> {
      let engine = SqliteEngine::open(path)?;
      debug!(path, "Opened connection");
      Ok(Self::new(engine, config))
   }

   /// Open a private in-memory database.
   pub fn open_in_memory(config: ProviderConfig) -> Result<Self> {
      Ok(Self::new(SqliteEngine::open_in_memory()?, config))
   }
}

impl<E: NativeEngine> Connection<E> {
   /// Wrap an already open engine.
   ///
   /// Diagnostics go to `tracing` until [`with_log`](Self::with_log) installs
   /// another sink.
   pub fn new(engine: E, config: ProviderConfig) -> Self {
      let log = tracing_log();
      let ledger = TransactionLedger::new(engine)
         .with_policy(config.transactions)
         .with_log(Arc::clone(&log));
      let settings = BindSettings::new(config.bind.clone()).with_log(log);

      Self {
         ledger,
         settings,
         config,
      }
   }

   /// Send transaction and bind events to `log` instead of `tracing`.
   pub fn with_log(self, log: Arc<dyn ProviderLog>) -> Self {
      Self {
         ledger: self.ledger.with_log(Arc::clone(&log)),
         settings: self.settings.with_log(log),
         config: self.config,
      }
   }

   pub fn config(&self) -> &ProviderConfig {
      &self.config
   }

   pub fn bind_settings(&self) -> &BindSettings {
      &self.settings
   }

   /// Register a custom bind callback for `type_name` (case-insensitive).
   ///
   /// A later registration for the same name replaces the earlier one.
   pub fn register_callback<C>(&mut self, type_name: &str, callback: C) -> &mut Self
   where
      C: BindValueCallback + 'static,
   {
      self.settings.callbacks.register(type_name, callback);
      self
   }

   /// Remove the callback for `type_name`. Returns `true` if one was registered.
   pub fn unregister_callback(&mut self, type_name: &str) -> bool {
      self.settings.callbacks.unregister(type_name)
   }

   /// Begin a transaction, or a savepoint if one is already open.
   pub fn begin_transaction(&self, mode: BeginMode) -> Result<TransactionContext<E>> {
      Ok(self.ledger.begin(mode)?)
   }

   /// Begin with the configured default mode.
   pub fn begin(&self) -> Result<TransactionContext<E>> {
      Ok(self.ledger.begin_default()?)
   }

   /// Current nesting depth. Zero when no transaction is open.
   pub fn depth(&self) -> u32 {
      self.ledger.depth()
   }

   pub fn is_closed(&self) -> bool {
      self.ledger.is_closed()
   }

   /// Roll back whatever is open and refuse further work.
   ///
   /// Outstanding [`TransactionContext`]s become inert.
   pub fn close(&self) {
      self.ledger.close();
   }

   /// Prepare `text` (one or more statements) as a command.
   pub fn command(&self, text: &str) -> Result<Command<'_, E>> {
      Command::new(self, text)
   }

   /// Prepare and run `text` without parameters.
   pub fn execute(&self, text: &str) -> Result<()> {
      self.command(text)?.execute()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use sqlite_native::recording::{NativeCall, RecordingEngine};
   use sqlite_nested_tx::TransactionPolicy;
   use sqlite_param_binder::{BindOp, BindPolicy, CustomBind, Parameter};

   fn recording(config: ProviderConfig) -> (Connection<RecordingEngine>, RecordingEngine) {
      let engine = RecordingEngine::new();
      (Connection::new(engine.clone(), config), engine)
   }

   #[test]
   fn test_policies_flow_from_config() {
      let config = ProviderConfig::default()
         .with_bind_policy(BindPolicy::default().with_binary_guid(false))
         .with_transaction_policy(TransactionPolicy::default().with_strict_rollback(true));
      let (conn, _) = recording(config);

      assert!(!conn.bind_settings().policy.binary_guid);
      assert!(conn.ledger.policy().strict_rollback);
      assert_eq!(conn.config().transactions.default_mode, BeginMode::Deferred);
   }

   #[test]
   fn test_default_begin_uses_configured_mode() {
      let config = ProviderConfig::default().with_transaction_policy(
         TransactionPolicy::default().with_default_mode(BeginMode::Immediate),
      );
      let (conn, engine) = recording(config);

      let mut tx = conn.begin().unwrap();
      tx.commit().unwrap();

      assert_eq!(engine.log().executed(), vec!["BEGIN IMMEDIATE", "COMMIT"]);
   }

   #[test]
   fn test_register_and_unregister_callback() {
      let (mut conn, _) = recording(ProviderConfig::default());
      conn.register_callback(
         "money",
         |_: &Parameter, _: &str, _: usize, _: &BindPolicy| -> sqlite_param_binder::Result<CustomBind> {
            Ok(CustomBind::Bound(BindOp::Null))
         },
      );

      assert_eq!(conn.bind_settings().callbacks.len(), 1);
      assert!(conn.unregister_callback("MONEY"));
      assert!(!conn.unregister_callback("money"));
   }

   #[test]
   fn test_close_refuses_new_transactions() {
      let (conn, engine) = recording(ProviderConfig::default());
      conn.close();

      assert!(conn.is_closed());
      let err = conn.begin().unwrap_err();
      assert_eq!(err.error_code(), "CONNECTION_CLOSED");
      assert!(
         !engine
            .log()
            .calls()
            .iter()
            .any(|call| matches!(call, NativeCall::Execute(sql) if sql.starts_with("BEGIN")))
      );
   }
}
