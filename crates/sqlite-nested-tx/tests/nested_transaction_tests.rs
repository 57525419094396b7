use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, mpsc};
use std::time::Duration;

use sqlite_native::recording::RecordingEngine;
use sqlite_native::{LogEvent, ProviderLog};
use sqlite_nested_tx::{
   BeginMode, Error, RollbackOutcome, TransactionLedger, TransactionPolicy,
};

fn init_tracing() {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ledger() -> (TransactionLedger<RecordingEngine>, RecordingEngine) {
   init_tracing();
   let engine = RecordingEngine::new();
   (TransactionLedger::new(engine.clone()), engine)
}

fn executed(engine: &RecordingEngine) -> Vec<String> {
   engine.log().executed()
}

#[derive(Default)]
struct CaptureLog {
   events: Mutex<Vec<String>>,
}

impl ProviderLog for CaptureLog {
   fn log(&self, event: &LogEvent<'_>) {
      let line = match event {
         LogEvent::TransactionControl { sql, depth } => format!("control {} {}", sql, depth),
         LogEvent::RollbackSuppressed { sql, .. } => format!("suppressed {}", sql),
         LogEvent::InvariantViolation { message } => format!("invariant {}", message),
         other => format!("{:?}", other),
      };
      self.events.lock().unwrap().push(line);
   }
}

// ============================================================================
// Control statement sequences
// ============================================================================

#[test]
fn test_nested_commit_sequence() {
   let (ledger, engine) = ledger();

   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut inner = ledger.begin(BeginMode::Deferred).unwrap();
   assert_eq!(ledger.depth(), 2);
   assert_eq!(outer.savepoint_name(), None);
   assert_eq!(inner.savepoint_name(), Some("sp_1"));
   assert_eq!(inner.begin_level(), 1);

   inner.commit().unwrap();
   assert_eq!(ledger.depth(), 1);
   outer.commit().unwrap();
   assert_eq!(ledger.depth(), 0);

   assert_eq!(executed(&engine), vec!["BEGIN", "SAVEPOINT sp_1", "RELEASE sp_1", "COMMIT"]);
}

#[test]
fn test_inner_rollback_keeps_outer_open() {
   let (ledger, engine) = ledger();

   let mut outer = ledger.begin(BeginMode::Immediate).unwrap();
   let mut inner = ledger.begin(BeginMode::Immediate).unwrap();

   assert_eq!(inner.rollback().unwrap(), RollbackOutcome::RolledBack);
   assert_eq!(ledger.depth(), 1);
   assert!(outer.is_active());

   outer.commit().unwrap();
   assert_eq!(ledger.depth(), 0);
   assert_eq!(
      executed(&engine),
      vec!["BEGIN IMMEDIATE", "SAVEPOINT sp_1", "ROLLBACK TO sp_1", "COMMIT"]
   );
}

#[test]
fn test_savepoint_names_never_repeat() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();

   for _ in 0..3 {
      let mut inner = ledger.begin(BeginMode::Deferred).unwrap();
      inner.rollback().unwrap();
   }
   let mut committed = ledger.begin(BeginMode::Deferred).unwrap();
   committed.commit().unwrap();
   outer.rollback().unwrap();

   let mut second = ledger.begin(BeginMode::Deferred).unwrap();
   let inner = ledger.begin(BeginMode::Deferred).unwrap();
   assert_eq!(inner.savepoint_name(), Some("sp_5"));
   drop(inner);
   second.commit().unwrap();

   let savepoints: Vec<String> = executed(&engine)
      .into_iter()
      .filter(|sql| sql.starts_with("SAVEPOINT"))
      .collect();
   let unique: HashSet<&String> = savepoints.iter().collect();
   assert_eq!(savepoints.len(), 5);
   assert_eq!(unique.len(), 5);
}

#[test]
fn test_default_mode_from_policy() {
   let (ledger, engine) = ledger();
   let ledger =
      ledger.with_policy(TransactionPolicy::default().with_default_mode(BeginMode::Immediate));

   let mut tx = ledger.begin_default().unwrap();
   tx.commit().unwrap();
   assert_eq!(executed(&engine), vec!["BEGIN IMMEDIATE", "COMMIT"]);
}

// ============================================================================
// Finalization and validity
// ============================================================================

#[test]
fn test_second_commit_is_refused() {
   let (ledger, _engine) = ledger();
   let mut tx = ledger.begin(BeginMode::Deferred).unwrap();

   tx.commit().unwrap();
   assert!(tx.is_finalized());
   assert!(matches!(tx.commit(), Err(Error::TransactionAlreadyFinalized)));
   assert!(matches!(tx.rollback(), Err(Error::TransactionAlreadyFinalized)));
}

#[test]
fn test_outer_commit_makes_inner_inert() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut inner = ledger.begin(BeginMode::Deferred).unwrap();
   let mut late = ledger.begin(BeginMode::Deferred).unwrap();

   outer.commit().unwrap();
   assert_eq!(ledger.depth(), 0);
   assert!(!inner.is_active());

   assert!(matches!(inner.commit(), Err(Error::NoActiveTransaction)));
   assert_eq!(late.rollback().unwrap(), RollbackOutcome::NotActive);
   assert_eq!(
      executed(&engine),
      vec!["BEGIN", "SAVEPOINT sp_1", "SAVEPOINT sp_2", "COMMIT"]
   );
}

#[test]
fn test_stale_context_does_not_touch_new_transaction() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut stale = ledger.begin(BeginMode::Deferred).unwrap();
   outer.commit().unwrap();

   // A new transaction at the same depth must not be released by the old
   // savepoint's context.
   let mut fresh_outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut fresh_inner = ledger.begin(BeginMode::Deferred).unwrap();
   assert!(matches!(stale.commit(), Err(Error::NoActiveTransaction)));
   assert_eq!(ledger.depth(), 2);

   fresh_inner.commit().unwrap();
   fresh_outer.commit().unwrap();
   assert!(!executed(&engine).contains(&"RELEASE sp_1".to_string()));
}

#[test]
fn test_drop_rolls_back() {
   let (ledger, engine) = ledger();
   {
      let _outer = ledger.begin(BeginMode::Deferred).unwrap();
      let _inner = ledger.begin(BeginMode::Deferred).unwrap();
      assert_eq!(ledger.depth(), 2);
   }
   assert_eq!(ledger.depth(), 0);
   assert_eq!(
      executed(&engine),
      vec!["BEGIN", "SAVEPOINT sp_1", "ROLLBACK TO sp_1", "ROLLBACK"]
   );
}

#[test]
fn test_dropping_finalized_context_is_silent() {
   let (ledger, engine) = ledger();
   let mut tx = ledger.begin(BeginMode::Deferred).unwrap();
   tx.commit().unwrap();
   drop(tx);
   assert_eq!(executed(&engine), vec!["BEGIN", "COMMIT"]);
}

// ============================================================================
// Native failures
// ============================================================================

#[test]
fn test_failed_begin_restores_depth() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();

   engine.fail_execute("SAVEPOINT sp_1");
   let err = ledger.begin(BeginMode::Deferred).unwrap_err();
   assert!(matches!(err, Error::TransactionState { operation: "begin", .. }));
   assert_eq!(ledger.depth(), 1);

   engine.clear_failures();
   let inner = ledger.begin(BeginMode::Deferred).unwrap();
   assert_eq!(inner.savepoint_name(), Some("sp_2"));
   drop(inner);
   outer.commit().unwrap();
   assert_eq!(ledger.depth(), 0);
}

#[test]
fn test_failed_outer_begin() {
   let (ledger, engine) = ledger();
   engine.fail_execute("BEGIN IMMEDIATE");

   let err = ledger.begin(BeginMode::Immediate).unwrap_err();
   assert_eq!(err.error_code(), "TRANSACTION_STATE");
   assert_eq!(ledger.depth(), 0);
}

#[test]
fn test_failed_commit_leaves_transaction_open() {
   let (ledger, engine) = ledger();
   let mut tx = ledger.begin(BeginMode::Deferred).unwrap();

   engine.fail_execute("COMMIT");
   assert!(matches!(tx.commit(), Err(Error::TransactionState { operation: "commit", .. })));
   assert_eq!(ledger.depth(), 1);
   assert!(tx.is_active());

   assert_eq!(tx.rollback().unwrap(), RollbackOutcome::RolledBack);
   assert_eq!(ledger.depth(), 0);
}

#[test]
fn test_rollback_failure_suppressed_by_default() {
   init_tracing();
   let engine = RecordingEngine::new();
   let capture = Arc::new(CaptureLog::default());
   let ledger = TransactionLedger::new(engine.clone()).with_log(capture.clone());

   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut inner = ledger.begin(BeginMode::Deferred).unwrap();
   engine.fail_execute("ROLLBACK TO sp_1");

   assert_eq!(inner.rollback().unwrap(), RollbackOutcome::FailureSuppressed);
   assert_eq!(ledger.depth(), 1);
   outer.commit().unwrap();

   assert_eq!(
      *capture.events.lock().unwrap(),
      vec![
         "control BEGIN 1".to_string(),
         "control SAVEPOINT sp_1 2".to_string(),
         "suppressed ROLLBACK TO sp_1".to_string(),
         "control COMMIT 0".to_string(),
      ]
   );
}

#[test]
fn test_rollback_failure_surfaces_when_strict() {
   let (ledger, engine) = ledger();
   let ledger = ledger.with_policy(TransactionPolicy::default().with_strict_rollback(true));

   let mut tx = ledger.begin(BeginMode::Deferred).unwrap();
   engine.fail_execute("ROLLBACK");

   let err = tx.rollback().unwrap_err();
   assert!(matches!(err, Error::TransactionState { operation: "rollback", .. }));
   assert!(tx.is_finalized());
   assert_eq!(ledger.depth(), 0);
}

#[test]
fn test_strictness_can_be_set_per_context() {
   let (ledger, engine) = ledger();
   let mut tx = ledger.begin(BeginMode::Deferred).unwrap();
   tx.set_strict_rollback(true);
   engine.fail_execute("ROLLBACK");

   assert!(tx.rollback().is_err());
}

// ============================================================================
// Connection lifetime
// ============================================================================

#[test]
fn test_close_rolls_back_and_refuses_work() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
   let mut inner = ledger.begin(BeginMode::Deferred).unwrap();

   ledger.close();
   assert!(ledger.is_closed());
   assert_eq!(ledger.depth(), 0);

   assert!(matches!(inner.commit(), Err(Error::ConnectionClosed)));
   assert_eq!(outer.rollback().unwrap(), RollbackOutcome::ConnectionGone);
   assert!(matches!(ledger.begin(BeginMode::Deferred), Err(Error::ConnectionClosed)));
   assert!(matches!(ledger.with_engine(|_| ()), Err(Error::ConnectionClosed)));

   assert_eq!(executed(&engine), vec!["BEGIN", "SAVEPOINT sp_1", "ROLLBACK"]);
}

#[test]
fn test_context_outliving_connection() {
   let (ledger, engine) = ledger();
   let mut lenient = ledger.begin(BeginMode::Deferred).unwrap();
   let mut strict = ledger.begin(BeginMode::Deferred).unwrap();
   strict.set_strict_rollback(true);
   let mut committing = ledger.begin(BeginMode::Deferred).unwrap();
   drop(ledger);

   assert_eq!(lenient.rollback().unwrap(), RollbackOutcome::ConnectionGone);
   assert!(matches!(strict.rollback(), Err(Error::ConnectionClosed)));
   assert!(matches!(committing.commit(), Err(Error::ConnectionClosed)));

   // Nothing was issued after the ledger went away.
   assert_eq!(
      executed(&engine),
      vec!["BEGIN", "SAVEPOINT sp_1", "SAVEPOINT sp_2"]
   );
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_nested_transactions_keep_depth_consistent() {
   let (ledger, engine) = ledger();
   let mut outer = ledger.begin(BeginMode::Deferred).unwrap();

   std::thread::scope(|scope| {
      for _ in 0..8 {
         scope.spawn(|| {
            for _ in 0..25 {
               let mut tx = ledger.begin(BeginMode::Deferred).unwrap();
               let outcome = tx.rollback().unwrap();
               assert!(matches!(
                  outcome,
                  RollbackOutcome::RolledBack | RollbackOutcome::NotActive
               ));
            }
         });
      }
   });

   assert_eq!(ledger.depth(), 1);
   outer.commit().unwrap();
   assert_eq!(ledger.depth(), 0);

   let savepoints: Vec<String> = executed(&engine)
      .into_iter()
      .filter(|sql| sql.starts_with("SAVEPOINT"))
      .collect();
   let unique: HashSet<&String> = savepoints.iter().collect();
   assert_eq!(savepoints.len(), 200);
   assert_eq!(unique.len(), 200);
}

// ============================================================================
// Log sinks
// ============================================================================

/// Records the ledger depth seen from inside each event.
#[derive(Default)]
struct DepthLog {
   ledger: OnceLock<Arc<TransactionLedger<RecordingEngine>>>,
   seen: Mutex<Vec<String>>,
}

impl ProviderLog for DepthLog {
   fn log(&self, event: &LogEvent<'_>) {
      let depth = self.ledger.get().map(|ledger| ledger.depth());
      let line = match event {
         LogEvent::TransactionControl { sql, .. } => format!("{} sees {:?}", sql, depth),
         LogEvent::RollbackSuppressed { sql, .. } => format!("suppressed {} sees {:?}", sql, depth),
         other => format!("{:?}", other),
      };
      self.seen.lock().unwrap().push(line);
   }
}

#[test]
fn test_log_sink_can_read_the_ledger() {
   init_tracing();
   let engine = RecordingEngine::new();
   let sink = Arc::new(DepthLog::default());
   let ledger = Arc::new(TransactionLedger::new(engine.clone()).with_log(sink.clone()));
   assert!(sink.ledger.set(Arc::clone(&ledger)).is_ok());

   let (done, finished) = mpsc::channel();
   let worker = std::thread::spawn(move || {
      let mut outer = ledger.begin(BeginMode::Deferred).unwrap();
      let mut inner = ledger.begin(BeginMode::Deferred).unwrap();
      engine.fail_execute("ROLLBACK TO sp_1");
      assert_eq!(inner.rollback().unwrap(), RollbackOutcome::FailureSuppressed);
      outer.commit().unwrap();
      let _open = ledger.begin(BeginMode::Deferred).unwrap();
      ledger.close();
      done.send(()).unwrap();
   });

   finished
      .recv_timeout(Duration::from_secs(10))
      .expect("a log sink reading the depth deadlocked the ledger");
   worker.join().unwrap();

   assert_eq!(
      *sink.seen.lock().unwrap(),
      vec![
         "BEGIN sees Some(1)",
         "SAVEPOINT sp_1 sees Some(2)",
         "suppressed ROLLBACK TO sp_1 sees Some(1)",
         "COMMIT sees Some(0)",
         "BEGIN sees Some(1)",
         "ROLLBACK sees Some(0)",
      ]
   );
}
