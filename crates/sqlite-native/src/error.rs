//! Error types for sqlite-native

use thiserror::Error;

/// Errors reported by the native capability surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
   /// The engine rejected a call. Carries the (extended) result code and the
   /// message reported by `sqlite3_errmsg` at the time of failure.
   #[error("SQLite error {code}: {message}")]
   Sqlite { code: i32, message: String },

   /// SQL text or a bound string contained an interior NUL byte
   #[error("string contains an interior NUL byte at offset {0}")]
   InteriorNul(usize),

   /// A value does not fit the storage class the engine offers for it
   #[error("value {value} is out of range for {target}")]
   ValueOutOfRange { value: String, target: &'static str },

   /// Bind position outside `1..=parameter_count`
   #[error("bind position {index} is out of range (statement has {count} parameters)")]
   IndexOutOfRange { index: usize, count: usize },

   /// A blob or text value is larger than the engine accepts in one call
   #[error("value of {0} bytes is too large to bind")]
   TooLarge(usize),

   /// The database handle has already been closed
   #[error("database handle has been closed")]
   Closed,
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlite { code, .. } => format!("SQLITE_{}", code),
         Error::InteriorNul(_) => "INTERIOR_NUL".to_string(),
         Error::ValueOutOfRange { .. } => "VALUE_OUT_OF_RANGE".to_string(),
         Error::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE".to_string(),
         Error::TooLarge(_) => "TOO_LARGE".to_string(),
         Error::Closed => "DATABASE_CLOSED".to_string(),
      }
   }
}
