//! [`NativeEngine`] backed by libsqlite3-sys.
//!
//! Connections are opened in serialized threading mode
//! (`SQLITE_OPEN_FULLMUTEX`) so that statements of one connection can be
//! bound from different threads.

use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::Arc;

use libsqlite3_sys::{
   SQLITE_DONE, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_READWRITE,
   SQLITE_OPEN_URI, SQLITE_ROW, SQLITE_TRANSIENT, sqlite3, sqlite3_bind_blob, sqlite3_bind_double,
   sqlite3_bind_int64, sqlite3_bind_null, sqlite3_bind_parameter_count,
   sqlite3_bind_parameter_name, sqlite3_bind_text, sqlite3_bind_zeroblob, sqlite3_clear_bindings,
   sqlite3_close_v2, sqlite3_column_int64, sqlite3_errmsg, sqlite3_errstr, sqlite3_exec,
   sqlite3_extended_result_codes, sqlite3_finalize, sqlite3_open_v2, sqlite3_prepare_v2,
   sqlite3_reset, sqlite3_step, sqlite3_stmt,
};
use tracing::{debug, trace};

use crate::engine::{NativeEngine, NativeStatement, Prepared, Step};
use crate::{Error, Result};

/// Owned `sqlite3*`. Closed when the engine and every statement compiled
/// from it have been dropped.
struct RawDb {
   db: *mut sqlite3,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX, so SQLite
// serializes all calls made through it.
unsafe impl Send for RawDb {}
unsafe impl Sync for RawDb {}

impl RawDb {
   /// Build an error from `code` and the connection's current message.
   fn error(&self, code: c_int) -> Error {
      // SAFETY: db is a valid open handle; sqlite3_errmsg never returns null
      // for a non-null handle and the string stays valid until the next call.
      let message = unsafe { CStr::from_ptr(sqlite3_errmsg(self.db)) }
         .to_string_lossy()
         .into_owned();
      Error::Sqlite { code, message }
   }

   fn check(&self, code: c_int) -> Result<()> {
      if code == SQLITE_OK {
         Ok(())
      } else {
         Err(self.error(code))
      }
   }
}

/// Check a bind result.
///
/// Binding may run outside the connection lock, where the connection's last
/// error message can belong to another thread's call. The message is taken
/// from the result code alone.
fn check_bind(code: c_int) -> Result<()> {
   if code == SQLITE_OK {
      return Ok(());
   }
   // SAFETY: sqlite3_errstr returns a static string for any code.
   let message = unsafe { CStr::from_ptr(sqlite3_errstr(code)) }
      .to_string_lossy()
      .into_owned();
   Err(Error::Sqlite { code, message })
}

impl Drop for RawDb {
   fn drop(&mut self) {
      // SAFETY: db came from sqlite3_open_v2 and is closed exactly once.
      // close_v2 defers the close if statements are somehow still alive.
      unsafe {
         sqlite3_close_v2(self.db);
      }
      trace!("SQLite handle closed");
   }
}

fn c_string(text: &str) -> Result<CString> {
   CString::new(text).map_err(|e| Error::InteriorNul(e.nul_position()))
}

fn c_len(len: usize) -> Result<c_int> {
   c_int::try_from(len).map_err(|_| Error::TooLarge(len))
}

/// A SQLite connection used as the provider's native engine.
pub struct SqliteEngine {
   db: Arc<RawDb>,
   path: String,
}

impl std::fmt::Debug for SqliteEngine {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("SqliteEngine").field("path", &self.path).finish()
   }
}

impl SqliteEngine {
   /// Open (creating if missing) the database at `path`. URI filenames and
   /// `:memory:` are accepted.
   pub fn open(path: &str) -> Result<Self> {
      let c_path = c_string(path)?;
      let mut db: *mut sqlite3 = ptr::null_mut();
      let flags =
         SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_FULLMUTEX | SQLITE_OPEN_URI;

      // SAFETY: c_path is NUL terminated and db is a valid out pointer.
      let rc = unsafe { sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

      if db.is_null() {
         return Err(Error::Sqlite {
            code: rc,
            message: "unable to allocate database handle".to_string(),
         });
      }

      // Wrap immediately so the handle is released on the error path too.
      let raw = RawDb { db };
      raw.check(rc)?;

      // SAFETY: raw.db is an open handle.
      unsafe {
         sqlite3_extended_result_codes(raw.db, 1);
      }

      debug!("Opened SQLite database at {}", path);
      Ok(Self {
         db: Arc::new(raw),
         path: path.to_string(),
      })
   }

   /// Open a private in-memory database.
   pub fn open_in_memory() -> Result<Self> {
      Self::open(":memory:")
   }

   pub fn path(&self) -> &str {
      &self.path
   }
}

impl NativeEngine for SqliteEngine {
   type Statement = SqliteStatement;

   fn prepare(&mut self, sql: &str) -> Result<Prepared<SqliteStatement>> {
      let len = c_len(sql.len())?;
      let head = sql.as_ptr() as *const c_char;
      let mut stmt: *mut sqlite3_stmt = ptr::null_mut();
      let mut tail: *const c_char = ptr::null();

      // SAFETY: head points at len readable bytes; SQLite does not require a
      // terminator when the byte count is given. tail points into the same
      // buffer on return.
      let rc = unsafe { sqlite3_prepare_v2(self.db.db, head, len, &mut stmt, &mut tail) };
      self.db.check(rc)?;

      let tail_offset = if tail.is_null() {
         sql.len()
      } else {
         (tail as usize).saturating_sub(head as usize).min(sql.len())
      };

      if stmt.is_null() {
         return Ok(Prepared {
            statement: None,
            tail_offset,
         });
      }

      Ok(Prepared {
         statement: Some(SqliteStatement {
            db: Arc::clone(&self.db),
            stmt,
            sql: sql[..tail_offset].trim().to_string(),
         }),
         tail_offset,
      })
   }

   fn execute(&mut self, sql: &str) -> Result<()> {
      let c_sql = c_string(sql)?;

      // SAFETY: c_sql is NUL terminated; no callback or error out pointer.
      let rc = unsafe {
         sqlite3_exec(
            self.db.db,
            c_sql.as_ptr(),
            None,
            ptr::null_mut(),
            ptr::null_mut(),
         )
      };
      self.db.check(rc)
   }
}

/// A statement compiled by [`SqliteEngine`]. Finalized on drop.
pub struct SqliteStatement {
   db: Arc<RawDb>,
   stmt: *mut sqlite3_stmt,
   sql: String,
}

// SAFETY: see RawDb; statement calls are serialized by the connection mutex.
unsafe impl Send for SqliteStatement {}

impl std::fmt::Debug for SqliteStatement {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("SqliteStatement").field("sql", &self.sql).finish()
   }
}

impl SqliteStatement {
   fn position(&self, index: usize) -> Result<c_int> {
      let count = self.parameter_count();
      if index == 0 || index > count {
         return Err(Error::IndexOutOfRange { index, count });
      }
      Ok(index as c_int)
   }
}

impl Drop for SqliteStatement {
   fn drop(&mut self) {
      // SAFETY: stmt came from sqlite3_prepare_v2 and is finalized once.
      unsafe {
         sqlite3_finalize(self.stmt);
      }
   }
}

impl NativeStatement for SqliteStatement {
   fn sql(&self) -> &str {
      &self.sql
   }

   fn parameter_count(&self) -> usize {
      // SAFETY: stmt is a live prepared statement.
      let count = unsafe { sqlite3_bind_parameter_count(self.stmt) };
      count.max(0) as usize
   }

   fn parameter_name(&self, index: usize) -> Option<String> {
      let position = self.position(index).ok()?;

      // SAFETY: position is within range; the returned string lives as long
      // as the statement.
      let name = unsafe { sqlite3_bind_parameter_name(self.stmt, position) };
      if name.is_null() {
         return None;
      }
      Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
   }

   fn bind_null(&mut self, index: usize) -> Result<()> {
      let position = self.position(index)?;
      // SAFETY: live statement, valid position.
      let rc = unsafe { sqlite3_bind_null(self.stmt, position) };
      check_bind(rc)
   }

   fn bind_i64(&mut self, index: usize, value: i64) -> Result<()> {
      let position = self.position(index)?;
      // SAFETY: live statement, valid position.
      let rc = unsafe { sqlite3_bind_int64(self.stmt, position, value) };
      check_bind(rc)
   }

   fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
      let position = self.position(index)?;
      // SAFETY: live statement, valid position.
      let rc = unsafe { sqlite3_bind_double(self.stmt, position, value) };
      check_bind(rc)
   }

   fn bind_text(&mut self, index: usize, value: &str) -> Result<()> {
      let position = self.position(index)?;
      let len = c_len(value.len())?;
      // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
      let rc = unsafe {
         sqlite3_bind_text(
            self.stmt,
            position,
            value.as_ptr() as *const c_char,
            len,
            SQLITE_TRANSIENT(),
         )
      };
      check_bind(rc)
   }

   fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
      let position = self.position(index)?;

      // A null data pointer would bind NULL, so empty blobs go through zeroblob.
      let rc = if value.is_empty() {
         // SAFETY: live statement, valid position.
         unsafe { sqlite3_bind_zeroblob(self.stmt, position, 0) }
      } else {
         let len = c_len(value.len())?;
         // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
         unsafe {
            sqlite3_bind_blob(
               self.stmt,
               position,
               value.as_ptr().cast(),
               len,
               SQLITE_TRANSIENT(),
            )
         }
      };
      check_bind(rc)
   }

   fn clear_bindings(&mut self) -> Result<()> {
      // SAFETY: live statement.
      let rc = unsafe { sqlite3_clear_bindings(self.stmt) };
      check_bind(rc)
   }

   fn step(&mut self) -> Result<Step> {
      // SAFETY: live statement.
      match unsafe { sqlite3_step(self.stmt) } {
         SQLITE_ROW => Ok(Step::Row),
         SQLITE_DONE => Ok(Step::Done),
         rc => Err(self.db.error(rc)),
      }
   }

   fn reset(&mut self) -> Result<()> {
      // SAFETY: live statement.
      let rc = unsafe { sqlite3_reset(self.stmt) };
      self.db.check(rc)
   }

   fn column_i64(&self, column: usize) -> i64 {
      // SAFETY: live statement; out-of-range columns yield 0.
      unsafe { sqlite3_column_int64(self.stmt, column as c_int) }
   }
}
