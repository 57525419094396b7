use serde::{Serialize, Serializer};

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for callers that report errors as data.
#[derive(Serialize)]
struct ErrorResponse {
   code: String,
   message: String,
}

/// Error types for the SQLite provider.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from parameter resolution, coercion or binding.
   #[error(transparent)]
   Binding(#[from] sqlite_param_binder::Error),

   /// Error from transaction control.
   #[error(transparent)]
   Transaction(#[from] sqlite_nested_tx::Error),

   /// Error from the native engine.
   #[error(transparent)]
   Native(#[from] sqlite_native::Error),

   /// Configuration text is not valid.
   #[error("invalid configuration: {0}")]
   Config(#[from] serde_json::Error),

   /// I/O error when reading configuration files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// Codes from the component crates pass through unchanged.
   pub fn error_code(&self) -> String {
      match self {
         Error::Binding(e) => e.error_code(),
         Error::Transaction(e) => e.error_code(),
         Error::Native(e) => e.error_code(),
         Error::Config(_) => "INVALID_CONFIG".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }
}

impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      let response = ErrorResponse {
         code: self.error_code(),
         message: self.to_string(),
      };
      response.serialize(serializer)
   }
}
