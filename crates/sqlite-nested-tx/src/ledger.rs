//! Per-connection transaction ledger.
//!
//! The outermost transaction is a real `BEGIN`/`COMMIT`/`ROLLBACK`. Every
//! transaction begun while another is open becomes a named savepoint
//! (`SAVEPOINT sp_<n>`), released on commit and rolled back to on rollback.
//!
//! The ledger owns the depth (as a stack of frames, one per open level) and
//! the savepoint sequence. Contexts only hold a weak handle plus the level
//! they opened, so an inner context can never keep the connection alive and
//! can never move the depth of an outer one.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlite_native::{LogEvent, NativeEngine, ProviderLog, tracing_log};
use tracing::debug;

use crate::{Error, Result};

/// How the outermost transaction acquires its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeginMode {
   /// `BEGIN`: locks are taken on first read/write.
   #[default]
   Deferred,
   /// `BEGIN IMMEDIATE`: the write lock is taken up front.
   Immediate,
}

impl BeginMode {
   fn sql(self) -> &'static str {
      match self {
         BeginMode::Deferred => "BEGIN",
         BeginMode::Immediate => "BEGIN IMMEDIATE",
      }
   }
}

/// Transaction behaviour configured per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionPolicy {
   /// Surface native rollback failures instead of logging and suppressing
   /// them.
   ///
   /// Default: false
   pub strict_rollback: bool,

   /// Begin mode used when the caller does not pick one.
   ///
   /// Default: deferred
   pub default_mode: BeginMode,
}

impl TransactionPolicy {
   pub fn with_strict_rollback(mut self, enabled: bool) -> Self {
      self.strict_rollback = enabled;
      self
   }

   pub fn with_default_mode(mut self, mode: BeginMode) -> Self {
      self.default_mode = mode;
      self
   }
}

/// What a rollback actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
   /// `ROLLBACK` or `ROLLBACK TO` ran successfully.
   RolledBack,
   /// Nothing to do: an enclosing transaction already ended this one.
   NotActive,
   /// The connection was closed or dropped; the engine discarded the work.
   ConnectionGone,
   /// The native rollback failed and the failure was logged, not returned.
   FailureSuppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
   Root(u64),
   Savepoint(u64),
}

fn savepoint_name(sequence: u64) -> String {
   format!("sp_{}", sequence)
}

struct LedgerState<E> {
   engine: E,
   /// One frame per open level; the depth is `frames.len()`.
   frames: Vec<Frame>,
   roots: u64,
   savepoints: u64,
   generation: u64,
   closed: bool,
}

impl<E: NativeEngine> LedgerState<E> {
   fn depth(&self) -> u32 {
      u32::try_from(self.frames.len()).unwrap_or(u32::MAX)
   }

   /// Run one control statement. Callers report it once the lock is
   /// released, so log sinks may read the ledger.
   fn control(&mut self, sql: &str) -> sqlite_native::Result<()> {
      self.engine.execute(sql)
   }
}

fn report_control(log: &dyn ProviderLog, sql: &str, depth: u32) {
   log.log(&LogEvent::TransactionControl { sql, depth });
}

type Shared<E> = Arc<Mutex<LedgerState<E>>>;

/// Owns a connection's engine, transaction depth and savepoint sequence.
pub struct TransactionLedger<E> {
   state: Shared<E>,
   policy: TransactionPolicy,
   log: Arc<dyn ProviderLog>,
}

impl<E> fmt::Debug for TransactionLedger<E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TransactionLedger")
         .field("policy", &self.policy)
         .finish_non_exhaustive()
   }
}

impl<E: NativeEngine> TransactionLedger<E> {
   pub fn new(engine: E) -> Self {
      Self {
         state: Arc::new(Mutex::new(LedgerState {
            engine,
            frames: Vec::new(),
            roots: 0,
            savepoints: 0,
            generation: 0,
            closed: false,
         })),
         policy: TransactionPolicy::default(),
         log: tracing_log(),
      }
   }

   pub fn with_policy(mut self, policy: TransactionPolicy) -> Self {
      self.policy = policy;
      self
   }

   pub fn with_log(mut self, log: Arc<dyn ProviderLog>) -> Self {
      self.log = log;
      self
   }

   pub fn policy(&self) -> &TransactionPolicy {
      &self.policy
   }

   /// Number of open levels (0 when no transaction is active).
   pub fn depth(&self) -> u32 {
      self.state.lock().depth()
   }

   pub fn is_closed(&self) -> bool {
      self.state.lock().closed
   }

   /// Begin a transaction using the policy's default mode.
   pub fn begin_default(&self) -> Result<TransactionContext<E>> {
      self.begin(self.policy.default_mode)
   }

   /// Begin a transaction: a real one at depth 0, a savepoint otherwise.
   /// `mode` only matters for the outermost transaction.
   pub fn begin(&self, mode: BeginMode) -> Result<TransactionContext<E>> {
      let mut state = self.state.lock();
      if state.closed {
         return Err(Error::ConnectionClosed);
      }

      let begin_level = state.depth();
      let (frame, savepoint, sql) = if begin_level == 0 {
         state.roots += 1;
         (Frame::Root(state.roots), None, mode.sql().to_string())
      } else {
         state.savepoints += 1;
         let name = savepoint_name(state.savepoints);
         let sql = format!("SAVEPOINT {}", name);
         (Frame::Savepoint(state.savepoints), Some(name), sql)
      };

      // The level counts as taken before the native call and is released
      // again if the call fails.
      state.frames.push(frame);
      let depth = state.depth();
      if let Err(source) = state.control(&sql) {
         state.frames.pop();
         return Err(Error::TransactionState {
            operation: "begin",
            source,
         });
      }
      let generation = state.generation;
      drop(state);
      report_control(self.log.as_ref(), &sql, depth);

      Ok(TransactionContext {
         ledger: Arc::downgrade(&self.state),
         log: Arc::clone(&self.log),
         begin_level,
         frame,
         savepoint,
         generation,
         strict_rollback: self.policy.strict_rollback,
         finalized: false,
      })
   }

   /// Run `f` with the engine, e.g. to prepare statements.
   pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
      let mut state = self.state.lock();
      if state.closed {
         return Err(Error::ConnectionClosed);
      }
      Ok(f(&mut state.engine))
   }

   /// Roll back any open transaction (failures are logged, not returned) and
   /// refuse all further work. Every outstanding context becomes inert.
   pub fn close(&self) {
      let mut state = self.state.lock();
      if state.closed {
         return;
      }

      let rollback = if state.frames.is_empty() {
         None
      } else {
         state.frames.clear();
         Some(state.control("ROLLBACK"))
      };

      state.generation += 1;
      state.closed = true;
      let generation = state.generation;
      drop(state);

      match rollback {
         Some(Ok(())) => report_control(self.log.as_ref(), "ROLLBACK", 0),
         Some(Err(error)) => self.log.log(&LogEvent::RollbackSuppressed {
            sql: "ROLLBACK",
            error: &error,
         }),
         None => {}
      }
      debug!(generation, "Transaction ledger closed");
   }
}

/// One level of a (possibly nested) transaction.
///
/// Dropping a context that was neither committed nor rolled back rolls it
/// back leniently, logging rather than returning any failure.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct TransactionContext<E: NativeEngine> {
   ledger: Weak<Mutex<LedgerState<E>>>,
   log: Arc<dyn ProviderLog>,
   begin_level: u32,
   frame: Frame,
   savepoint: Option<String>,
   generation: u64,
   strict_rollback: bool,
   finalized: bool,
}

impl<E: NativeEngine> fmt::Debug for TransactionContext<E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TransactionContext")
         .field("begin_level", &self.begin_level)
         .field("savepoint", &self.savepoint)
         .field("finalized", &self.finalized)
         .finish_non_exhaustive()
   }
}

/// Why a context cannot act on the ledger.
enum Inactive {
   Gone,
   Ended,
}

impl<E: NativeEngine> TransactionContext<E> {
   /// Connection depth when this transaction began.
   pub fn begin_level(&self) -> u32 {
      self.begin_level
   }

   /// Savepoint name, `None` for the outermost transaction.
   pub fn savepoint_name(&self) -> Option<&str> {
      self.savepoint.as_deref()
   }

   pub fn is_finalized(&self) -> bool {
      self.finalized
   }

   /// Override the connection's rollback strictness for this transaction.
   pub fn set_strict_rollback(&mut self, strict: bool) {
      self.strict_rollback = strict;
   }

   /// Whether this transaction is still open on its connection.
   pub fn is_active(&self) -> bool {
      if self.finalized {
         return false;
      }
      match self.ledger.upgrade() {
         Some(shared) => self.check(&shared.lock()).is_ok(),
         None => false,
      }
   }

   fn check(&self, state: &LedgerState<E>) -> std::result::Result<(), Inactive> {
      if state.closed || state.generation != self.generation {
         return Err(Inactive::Gone);
      }
      match state.frames.get(self.begin_level as usize) {
         Some(frame) if *frame == self.frame => Ok(()),
         _ => Err(Inactive::Ended),
      }
   }

   /// `outer` for the outermost transaction, `nested <savepoint>` otherwise.
   fn control_sql(&self, outer: &str, nested: &str) -> Result<String> {
      if self.begin_level == 0 {
         return Ok(outer.to_string());
      }
      let savepoint = self
         .savepoint
         .as_deref()
         .ok_or(Error::UnknownSavepoint(self.begin_level))?;
      Ok(format!("{} {}", nested, savepoint))
   }

   /// Commit this level: `COMMIT` for the outermost transaction, `RELEASE`
   /// of the savepoint otherwise.
   pub fn commit(&mut self) -> Result<()> {
      if self.finalized {
         return Err(Error::TransactionAlreadyFinalized);
      }
      let sql = self.control_sql("COMMIT", "RELEASE")?;
      self.finalized = true;

      let shared = self.ledger.upgrade().ok_or(Error::ConnectionClosed)?;
      let mut state = shared.lock();
      match self.check(&state) {
         Ok(()) => {}
         Err(Inactive::Gone) => return Err(Error::ConnectionClosed),
         Err(Inactive::Ended) => return Err(Error::NoActiveTransaction),
      }

      state.control(&sql).map_err(|source| {
         // Leave the level open so the caller can still roll it back.
         self.finalized = false;
         Error::TransactionState {
            operation: "commit",
            source,
         }
      })?;

      state.frames.truncate(self.begin_level as usize);
      drop(state);
      report_control(self.log.as_ref(), &sql, self.begin_level);
      Ok(())
   }

   /// Roll back this level: `ROLLBACK` for the outermost transaction,
   /// `ROLLBACK TO` the savepoint otherwise.
   ///
   /// Native failures are logged and reported as
   /// [`RollbackOutcome::FailureSuppressed`] unless strict rollback is on.
   pub fn rollback(&mut self) -> Result<RollbackOutcome> {
      if self.finalized {
         return Err(Error::TransactionAlreadyFinalized);
      }
      self.rollback_with(self.strict_rollback)
   }

   fn rollback_with(&mut self, strict: bool) -> Result<RollbackOutcome> {
      self.finalized = true;

      let Some(shared) = self.ledger.upgrade() else {
         return if strict {
            Err(Error::ConnectionClosed)
         } else {
            Ok(RollbackOutcome::ConnectionGone)
         };
      };
      let mut state = shared.lock();

      match self.check(&state) {
         Ok(()) => {}
         Err(Inactive::Gone) if strict => return Err(Error::ConnectionClosed),
         Err(Inactive::Gone) => return Ok(RollbackOutcome::ConnectionGone),
         Err(Inactive::Ended) => return Ok(RollbackOutcome::NotActive),
      }

      let sql = self.control_sql("ROLLBACK", "ROLLBACK TO")?;

      // The level is abandoned whether or not the native call succeeds.
      state.frames.truncate(self.begin_level as usize);

      let result = state.control(&sql);
      drop(state);

      match result {
         Ok(()) => {
            report_control(self.log.as_ref(), &sql, self.begin_level);
            Ok(RollbackOutcome::RolledBack)
         }
         Err(source) if strict => Err(Error::TransactionState {
            operation: "rollback",
            source,
         }),
         Err(error) => {
            self.log.log(&LogEvent::RollbackSuppressed {
               sql: &sql,
               error: &error,
            });
            Ok(RollbackOutcome::FailureSuppressed)
         }
      }
   }
}

impl<E: NativeEngine> Drop for TransactionContext<E> {
   fn drop(&mut self) {
      if self.finalized {
         return;
      }

      match self.rollback_with(false) {
         Ok(RollbackOutcome::ConnectionGone) => {
            debug!(level = self.begin_level, "Transaction dropped after its connection closed")
         }
         Ok(_) => {}
         Err(error) => {
            let message = format!(
               "dropped transaction at level {} could not roll back: {}",
               self.begin_level, error
            );
            self.log.log(&LogEvent::InvariantViolation { message: &message });
         }
      }
   }
}
