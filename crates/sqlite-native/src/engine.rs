//! The native capability surface the provider core calls into.
//!
//! Bind positions are 1-based, matching SQLite. Engines only need to supply
//! the storage-class primitives (`bind_null`, `bind_i64`, `bind_double`,
//! `bind_text`, `bind_blob`); the remaining bind calls have default
//! implementations that narrow onto those, and can be overridden by engines
//! that store the wider types natively.

use time::PrimitiveDateTime;

use crate::datetime::{DateTimeFormat, StoredDateTime};
use crate::{Error, Result};

/// Outcome of preparing the first statement of a (possibly multi-statement) text.
#[derive(Debug)]
pub struct Prepared<S> {
   /// The compiled statement, or `None` if the consumed text held only
   /// whitespace or comments.
   pub statement: Option<S>,
   /// Number of bytes of the input consumed. The remaining text starts at
   /// this offset.
   pub tail_offset: usize,
}

/// Result of stepping a statement once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
   Row,
   Done,
}

/// A connection-level native engine.
pub trait NativeEngine: Send {
   type Statement: NativeStatement;

   /// Compile the first statement in `sql`.
   fn prepare(&mut self, sql: &str) -> Result<Prepared<Self::Statement>>;

   /// Run `sql` to completion without parameters. Used for transaction
   /// control statements (`BEGIN`, `SAVEPOINT sp_1`, `RELEASE sp_1`, ...).
   fn execute(&mut self, sql: &str) -> Result<()>;
}

/// A compiled native statement.
pub trait NativeStatement: Send {
   /// The SQL text this statement was compiled from.
   fn sql(&self) -> &str;

   /// Index of the largest bind position.
   fn parameter_count(&self) -> usize;

   /// Name of the parameter at `index`, including its prefix character.
   /// `None` for anonymous `?` placeholders.
   fn parameter_name(&self, index: usize) -> Option<String>;

   fn bind_null(&mut self, index: usize) -> Result<()>;
   fn bind_i64(&mut self, index: usize, value: i64) -> Result<()>;
   fn bind_double(&mut self, index: usize, value: f64) -> Result<()>;
   fn bind_text(&mut self, index: usize, value: &str) -> Result<()>;
   fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()>;

   fn bind_bool(&mut self, index: usize, value: bool) -> Result<()> {
      self.bind_i64(index, i64::from(value))
   }

   fn bind_i32(&mut self, index: usize, value: i32) -> Result<()> {
      self.bind_i64(index, i64::from(value))
   }

   fn bind_u32(&mut self, index: usize, value: u32) -> Result<()> {
      self.bind_i64(index, i64::from(value))
   }

   /// SQLite integers are signed 64-bit; values above `i64::MAX` are refused
   /// rather than wrapped.
   fn bind_u64(&mut self, index: usize, value: u64) -> Result<()> {
      let narrowed = i64::try_from(value).map_err(|_| Error::ValueOutOfRange {
         value: value.to_string(),
         target: "INTEGER",
      })?;
      self.bind_i64(index, narrowed)
   }

   fn bind_datetime(
      &mut self,
      index: usize,
      value: PrimitiveDateTime,
      format: DateTimeFormat,
   ) -> Result<()> {
      match format.encode(value) {
         StoredDateTime::Text(text) => self.bind_text(index, &text),
         StoredDateTime::Integer(i) => self.bind_i64(index, i),
         StoredDateTime::Real(r) => self.bind_double(index, r),
      }
   }

   /// Reset every bind position to NULL.
   fn clear_bindings(&mut self) -> Result<()>;

   fn step(&mut self) -> Result<Step>;

   /// Rewind the statement so it can be stepped again. Bindings are kept.
   fn reset(&mut self) -> Result<()>;

   /// Integer value of column `column` (0-based) of the current row.
   fn column_i64(&self, column: usize) -> i64;
}
