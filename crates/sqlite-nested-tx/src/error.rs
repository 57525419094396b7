/// Result type alias for transaction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for nested transaction control.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// A native `BEGIN`, `SAVEPOINT`, `COMMIT`, `RELEASE` or rollback failed.
   #[error("transaction {operation} failed: {source}")]
   TransactionState {
      operation: &'static str,
      #[source]
      source: sqlite_native::Error,
   },

   /// A nested transaction has no savepoint to release or roll back to.
   #[error("no savepoint recorded for nested transaction at level {0}")]
   UnknownSavepoint(u32),

   /// Commit or rollback was already called on this transaction.
   #[error("transaction already finalized")]
   TransactionAlreadyFinalized,

   /// The transaction ended because an enclosing transaction finished first.
   #[error("no active transaction")]
   NoActiveTransaction,

   /// The connection was closed or dropped.
   #[error("connection is closed")]
   ConnectionClosed,
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::TransactionState { .. } => "TRANSACTION_STATE".to_string(),
         Error::UnknownSavepoint(_) => "UNKNOWN_SAVEPOINT".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::NoActiveTransaction => "NO_ACTIVE_TRANSACTION".to_string(),
         Error::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
      }
   }
}
