//! Explicit logging capability.
//!
//! Components that report bind and transaction activity receive an
//! `Arc<dyn ProviderLog>` when they are constructed. There is no
//! process-wide registration; two connections can log to two different sinks.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::Error;

/// Something worth reporting while binding or controlling transactions.
#[derive(Debug)]
pub enum LogEvent<'a> {
   /// About to bind a parameter.
   PreBind {
      sql: &'a str,
      position: usize,
      name: &'a str,
      declared: &'a str,
      value: &'a dyn Debug,
   },
   /// A native bind call was issued.
   Bound {
      sql: &'a str,
      position: usize,
      operation: &'static str,
   },
   /// A transaction control statement was issued. `depth` is the connection
   /// depth after the transition.
   TransactionControl { sql: &'a str, depth: u32 },
   /// A rollback failed and the failure was not propagated.
   RollbackSuppressed { sql: &'a str, error: &'a Error },
   /// An internal invariant was found broken where no error can be returned.
   InvariantViolation { message: &'a str },
}

/// Receives [`LogEvent`]s.
pub trait ProviderLog: Send + Sync {
   fn log(&self, event: &LogEvent<'_>);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl ProviderLog for TracingLog {
   fn log(&self, event: &LogEvent<'_>) {
      match event {
         LogEvent::PreBind {
            sql,
            position,
            name,
            declared,
            value,
         } => trace!(%sql, position, %name, %declared, ?value, "Binding parameter"),
         LogEvent::Bound {
            sql,
            position,
            operation,
         } => trace!(%sql, position, operation, "Parameter bound"),
         LogEvent::TransactionControl { sql, depth } => {
            debug!(%sql, depth, "Transaction control statement issued")
         }
         LogEvent::RollbackSuppressed { sql, error } => {
            warn!(%sql, %error, "Rollback failed; error suppressed")
         }
         LogEvent::InvariantViolation { message } => error!("{}", message),
      }
   }
}

/// Shorthand for the default sink.
pub fn tracing_log() -> Arc<dyn ProviderLog> {
   Arc::new(TracingLog)
}
