use crate::DbType;

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for resolving and binding statement parameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// A slot had no parameter assigned when the statement was bound.
   #[error("insufficient parameters supplied: no value for {name} (position {position})")]
   MissingParameter { position: usize, name: String },

   /// A supplied parameter matched no slot in any statement.
   #[error("parameter {0} does not match any placeholder")]
   UnmatchedParameter(String),

   /// A numeric value does not fit the declared type.
   #[error("value {value} overflows {target}")]
   ConversionOverflow { value: String, target: &'static str },

   /// A value cannot be converted to the declared type at all.
   #[error("cannot convert {value} to {target}")]
   InvalidConversion { value: String, target: &'static str },

   /// Text could not be parsed with the connection's date/time format.
   #[error("invalid date/time text: {0}")]
   InvalidDateTime(String),

   /// The native bind call failed.
   #[error("bind failed at position {position} ({db_type:?}): {source}")]
   BindFailed {
      position: usize,
      db_type: DbType,
      #[source]
      source: sqlite_native::Error,
   },

   /// The parameter collection changed shape (or is a different collection)
   /// since the statement was resolved against it.
   #[error("parameters changed since they were mapped; resolve them again")]
   StaleMapping,

   /// Error from the native engine outside of a bind call.
   #[error(transparent)]
   Native(#[from] sqlite_native::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::MissingParameter { .. } => "MISSING_PARAMETER".to_string(),
         Error::UnmatchedParameter(_) => "UNMATCHED_PARAMETER".to_string(),
         Error::ConversionOverflow { .. } => "CONVERSION_OVERFLOW".to_string(),
         Error::InvalidConversion { .. } => "INVALID_CONVERSION".to_string(),
         Error::InvalidDateTime(_) => "INVALID_DATETIME".to_string(),
         Error::BindFailed { .. } => "BIND_FAILED".to_string(),
         Error::StaleMapping => "STALE_MAPPING".to_string(),
         Error::Native(e) => e.error_code(),
      }
   }
}
