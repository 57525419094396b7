//! A scripted engine that records every native call.
//!
//! `RecordingEngine` never touches a database. It splits SQL text at `;`,
//! locates placeholders the way SQLite names them (`?`, `?NNN`, `:a`, `@a`,
//! `$a`) and appends each call to a shared [`CallLog`]. Clones share the log
//! and the failure script, so a test can keep one clone after moving another
//! into a connection.

use std::sync::{Arc, Mutex, MutexGuard};

use time::PrimitiveDateTime;

use crate::datetime::DateTimeFormat;
use crate::engine::{NativeEngine, NativeStatement, Prepared, Step};
use crate::{Error, Result};

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
   Prepare(String),
   Execute(String),
   BindNull(usize),
   BindBool(usize, bool),
   BindI32(usize, i32),
   BindU32(usize, u32),
   BindI64(usize, i64),
   BindU64(usize, u64),
   BindDouble(usize, f64),
   BindText(usize, String),
   BindBlob(usize, Vec<u8>),
   BindDateTime(usize, PrimitiveDateTime, DateTimeFormat),
   ClearBindings,
   Step,
   Reset,
}

impl NativeCall {
   pub fn is_bind(&self) -> bool {
      !matches!(
         self,
         NativeCall::Prepare(_)
            | NativeCall::Execute(_)
            | NativeCall::ClearBindings
            | NativeCall::Step
            | NativeCall::Reset
      )
   }
}

#[derive(Debug, Default)]
struct Shared {
   calls: Vec<NativeCall>,
   failing_sql: Vec<String>,
   failing_positions: Vec<usize>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
   shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared view of the calls recorded by a [`RecordingEngine`].
#[derive(Debug, Clone, Default)]
pub struct CallLog {
   shared: Arc<Mutex<Shared>>,
}

impl CallLog {
   pub fn calls(&self) -> Vec<NativeCall> {
      lock(&self.shared).calls.clone()
   }

   /// SQL passed to [`NativeEngine::execute`], in order.
   pub fn executed(&self) -> Vec<String> {
      lock(&self.shared)
         .calls
         .iter()
         .filter_map(|call| match call {
            NativeCall::Execute(sql) => Some(sql.clone()),
            _ => None,
         })
         .collect()
   }

   /// Bind calls only, in order.
   pub fn binds(&self) -> Vec<NativeCall> {
      lock(&self.shared)
         .calls
         .iter()
         .filter(|call| call.is_bind())
         .cloned()
         .collect()
   }

   pub fn clear(&self) {
      lock(&self.shared).calls.clear();
   }

   fn push(&self, call: NativeCall) {
      lock(&self.shared).calls.push(call);
   }
}

/// Engine double that records calls and fails on request.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
   log: CallLog,
}

impl RecordingEngine {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn log(&self) -> CallLog {
      self.log.clone()
   }

   /// Make every later `execute` of exactly `sql` fail with `SQLITE_ERROR`.
   pub fn fail_execute(&self, sql: &str) {
      lock(&self.log.shared).failing_sql.push(sql.to_string());
   }

   /// Make every later bind at `position` fail with `SQLITE_RANGE`.
   pub fn fail_bind_at(&self, position: usize) {
      lock(&self.log.shared).failing_positions.push(position);
   }

   pub fn clear_failures(&self) {
      let mut shared = lock(&self.log.shared);
      shared.failing_sql.clear();
      shared.failing_positions.clear();
   }
}

impl NativeEngine for RecordingEngine {
   type Statement = RecordingStatement;

   fn prepare(&mut self, sql: &str) -> Result<Prepared<RecordingStatement>> {
      let (names, tail_offset) = scan_placeholders(sql);
      let text = sql[..tail_offset].trim();

      if text.is_empty() || text == ";" {
         return Ok(Prepared {
            statement: None,
            tail_offset,
         });
      }

      self.log.push(NativeCall::Prepare(text.to_string()));
      Ok(Prepared {
         statement: Some(RecordingStatement {
            sql: text.to_string(),
            names,
            log: self.log.clone(),
         }),
         tail_offset,
      })
   }

   fn execute(&mut self, sql: &str) -> Result<()> {
      self.log.push(NativeCall::Execute(sql.to_string()));
      if lock(&self.log.shared).failing_sql.iter().any(|s| s == sql) {
         return Err(Error::Sqlite {
            code: 1,
            message: format!("scripted failure: {}", sql),
         });
      }
      Ok(())
   }
}

/// Statement produced by [`RecordingEngine`].
#[derive(Debug)]
pub struct RecordingStatement {
   sql: String,
   names: Vec<Option<String>>,
   log: CallLog,
}

impl RecordingStatement {
   fn record(&self, index: usize, call: NativeCall) -> Result<()> {
      let count = self.names.len();
      if index == 0 || index > count {
         return Err(Error::IndexOutOfRange { index, count });
      }
      if lock(&self.log.shared).failing_positions.contains(&index) {
         return Err(Error::Sqlite {
            code: 25,
            message: format!("scripted bind failure at {}", index),
         });
      }
      self.log.push(call);
      Ok(())
   }
}

impl NativeStatement for RecordingStatement {
   fn sql(&self) -> &str {
      &self.sql
   }

   fn parameter_count(&self) -> usize {
      self.names.len()
   }

   fn parameter_name(&self, index: usize) -> Option<String> {
      index
         .checked_sub(1)
         .and_then(|i| self.names.get(i))
         .cloned()
         .flatten()
   }

   fn bind_null(&mut self, index: usize) -> Result<()> {
      self.record(index, NativeCall::BindNull(index))
   }

   fn bind_i64(&mut self, index: usize, value: i64) -> Result<()> {
      self.record(index, NativeCall::BindI64(index, value))
   }

   fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
      self.record(index, NativeCall::BindDouble(index, value))
   }

   fn bind_text(&mut self, index: usize, value: &str) -> Result<()> {
      self.record(index, NativeCall::BindText(index, value.to_string()))
   }

   fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
      self.record(index, NativeCall::BindBlob(index, value.to_vec()))
   }

   fn bind_bool(&mut self, index: usize, value: bool) -> Result<()> {
      self.record(index, NativeCall::BindBool(index, value))
   }

   fn bind_i32(&mut self, index: usize, value: i32) -> Result<()> {
      self.record(index, NativeCall::BindI32(index, value))
   }

   fn bind_u32(&mut self, index: usize, value: u32) -> Result<()> {
      self.record(index, NativeCall::BindU32(index, value))
   }

   fn bind_u64(&mut self, index: usize, value: u64) -> Result<()> {
      self.record(index, NativeCall::BindU64(index, value))
   }

   fn bind_datetime(
      &mut self,
      index: usize,
      value: PrimitiveDateTime,
      format: DateTimeFormat,
   ) -> Result<()> {
      self.record(index, NativeCall::BindDateTime(index, value, format))
   }

   fn clear_bindings(&mut self) -> Result<()> {
      self.log.push(NativeCall::ClearBindings);
      Ok(())
   }

   fn step(&mut self) -> Result<Step> {
      self.log.push(NativeCall::Step);
      Ok(Step::Done)
   }

   fn reset(&mut self) -> Result<()> {
      self.log.push(NativeCall::Reset);
      Ok(())
   }

   fn column_i64(&self, _column: usize) -> i64 {
      0
   }
}

/// Scan the first statement of `sql`, returning its placeholder names by
/// position and the byte offset just past its terminating `;` (or the end of
/// the text).
fn scan_placeholders(sql: &str) -> (Vec<Option<String>>, usize) {
   let bytes = sql.as_bytes();
   let len = bytes.len();
   let mut names: Vec<Option<String>> = Vec::new();
   let mut i = 0;

   while i < len {
      match bytes[i] {
         quote @ (b'\'' | b'"' | b'`') => {
            i += 1;
            while i < len && bytes[i] != quote {
               i += 1;
            }
            i += 1;
         }
         b'[' => {
            while i < len && bytes[i] != b']' {
               i += 1;
            }
            i += 1;
         }
         b'-' if bytes.get(i + 1) == Some(&b'-') => {
            while i < len && bytes[i] != b'\n' {
               i += 1;
            }
         }
         b'/' if bytes.get(i + 1) == Some(&b'*') => {
            i += 2;
            while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
               i += 1;
            }
            i += 2;
         }
         b';' => return (names, i + 1),
         b'?' => {
            i += 1;
            let start = i;
            while i < len && bytes[i].is_ascii_digit() {
               i += 1;
            }
            if start == i {
               names.push(None);
            } else {
               let position: usize = sql[start..i].parse().unwrap_or(0);
               if position > 0 {
                  if position > names.len() {
                     names.resize(position, None);
                  }
                  names[position - 1] = Some(format!("?{}", position));
               }
            }
         }
         b':' | b'@' | b'$' => {
            let start = i;
            i += 1;
            while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
               i += 1;
            }
            if i - start > 1 {
               let name = &sql[start..i];
               if !names.iter().any(|n| n.as_deref() == Some(name)) {
                  names.push(Some(name.to_string()));
               }
            }
         }
         _ => i += 1,
      }
   }

   (names, len.min(i))
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_scan_mixed_placeholders() {
      let (names, tail) = scan_placeholders("SELECT ?, :a, @b, $c, :a");
      assert_eq!(
         names,
         vec![None, Some(":a".into()), Some("@b".into()), Some("$c".into())]
      );
      assert_eq!(tail, 24);
   }

   #[test]
   fn test_scan_stops_at_semicolon() {
      let sql = "INSERT INTO t VALUES (?); SELECT ?";
      let (names, tail) = scan_placeholders(sql);
      assert_eq!(names.len(), 1);
      assert_eq!(&sql[tail..], " SELECT ?");
   }

   #[test]
   fn test_scan_ignores_quoted_and_comments() {
      let (names, _) = scan_placeholders("SELECT '?', \"@x\" -- :y\n, /* $z */ ?");
      assert_eq!(names, vec![None]);
   }

   #[test]
   fn test_scan_numbered() {
      let (names, _) = scan_placeholders("SELECT ?3, ?1");
      assert_eq!(names, vec![Some("?1".into()), None, Some("?3".into())]);
   }

   #[test]
   fn test_clones_share_log() {
      let engine = RecordingEngine::new();
      let mut moved = engine.clone();
      moved.execute("BEGIN").unwrap();
      assert_eq!(engine.log().executed(), vec!["BEGIN".to_string()]);
   }

   #[test]
   fn test_scripted_execute_failure() {
      let mut engine = RecordingEngine::new();
      engine.fail_execute("COMMIT");
      assert!(engine.execute("COMMIT").is_err());
      engine.clear_failures();
      assert!(engine.execute("COMMIT").is_ok());
   }
}
