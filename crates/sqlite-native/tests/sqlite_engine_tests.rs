use sqlite_native::{DateTimeFormat, NativeEngine, NativeStatement, SqliteEngine, Step};
use tempfile::TempDir;
use time::macros::datetime;

fn create_test_db() -> (SqliteEngine, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db_path = temp_dir.path().join("native.db");
   let engine =
      SqliteEngine::open(db_path.to_str().unwrap()).expect("Failed to open test database");

   (engine, temp_dir)
}

fn count(engine: &mut SqliteEngine, sql: &str) -> i64 {
   let mut stmt = engine.prepare(sql).unwrap().statement.unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   stmt.column_i64(0)
}

#[test]
fn test_file_database_persists_rows() {
   let (mut engine, temp) = create_test_db();
   engine.execute("CREATE TABLE t (v INTEGER)").unwrap();
   engine.execute("INSERT INTO t VALUES (1), (2)").unwrap();
   drop(engine);

   let reopened = SqliteEngine::open(temp.path().join("native.db").to_str().unwrap());
   let mut reopened = reopened.unwrap();
   assert_eq!(count(&mut reopened, "SELECT count(*) FROM t"), 2);
}

#[test]
fn test_savepoint_rollback_keeps_outer_work() {
   let (mut engine, _temp) = create_test_db();
   engine.execute("CREATE TABLE t (v INTEGER)").unwrap();

   engine.execute("BEGIN").unwrap();
   engine.execute("INSERT INTO t VALUES (1)").unwrap();
   engine.execute("SAVEPOINT sp_1").unwrap();
   engine.execute("INSERT INTO t VALUES (2)").unwrap();
   engine.execute("ROLLBACK TO sp_1").unwrap();
   engine.execute("COMMIT").unwrap();

   assert_eq!(count(&mut engine, "SELECT count(*) FROM t"), 1);
}

#[test]
fn test_statement_outlives_engine_handle() {
   let (mut engine, _temp) = create_test_db();
   let mut stmt = engine.prepare("SELECT 7").unwrap().statement.unwrap();
   drop(engine);

   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 7);
}

#[test]
fn test_datetime_unix_epoch_binds_integer() {
   let mut engine = SqliteEngine::open_in_memory().unwrap();
   let mut stmt = engine
      .prepare("SELECT typeof(?1) = 'integer' AND ?1 = 86400")
      .unwrap()
      .statement
      .unwrap();
   stmt
      .bind_datetime(1, datetime!(1970-01-02 0:00), DateTimeFormat::UnixEpoch)
      .unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 1);
}

#[test]
fn test_datetime_iso_binds_text() {
   let mut engine = SqliteEngine::open_in_memory().unwrap();
   let mut stmt = engine
      .prepare("SELECT ? = '2020-02-29 12:00:00'")
      .unwrap()
      .statement
      .unwrap();
   stmt
      .bind_datetime(1, datetime!(2020-02-29 12:00), DateTimeFormat::Iso8601)
      .unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 1);
}

#[test]
fn test_empty_blob_is_not_null() {
   let mut engine = SqliteEngine::open_in_memory().unwrap();
   let mut stmt = engine
      .prepare("SELECT typeof(?) = 'blob'")
      .unwrap()
      .statement
      .unwrap();
   stmt.bind_blob(1, &[]).unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 1);
}

#[test]
fn test_clear_bindings_and_reset() {
   let mut engine = SqliteEngine::open_in_memory().unwrap();
   let mut stmt = engine
      .prepare("SELECT ? IS NULL")
      .unwrap()
      .statement
      .unwrap();
   stmt.bind_i64(1, 5).unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 0);

   stmt.reset().unwrap();
   stmt.clear_bindings().unwrap();
   assert_eq!(stmt.step().unwrap(), Step::Row);
   assert_eq!(stmt.column_i64(0), 1);
}
