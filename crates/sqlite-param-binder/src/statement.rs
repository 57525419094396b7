//! Prepared statements with their slot tables, singly and in batches.

use sqlite_native::{NativeEngine, NativeStatement};
use tracing::{debug, trace};

use crate::{
   BindSettings, Error, ParameterCollection, ParameterDirectory, Result, StatementBinder,
};

/// Outcome of mapping a parameter collection onto statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
   /// Parameters that were assigned to at least one slot.
   pub mapped: usize,
   /// Lookup names of parameters that matched no slot anywhere.
   pub unmatched: Vec<String>,
}

impl ResolveReport {
   pub fn is_complete(&self) -> bool {
      self.unmatched.is_empty()
   }

   /// Turn the first unmatched parameter into an error.
   pub fn require_all_matched(self) -> Result<Self> {
      match self.unmatched.first() {
         Some(name) => Err(Error::UnmatchedParameter(name.clone())),
         None => Ok(self),
      }
   }
}

/// One native statement and its slot table.
///
/// The native handle is finalized when the `Statement` is dropped.
#[derive(Debug)]
pub struct Statement<S> {
   native: S,
   directory: ParameterDirectory,
}

impl<S: NativeStatement> Statement<S> {
   /// Wrap a native statement. `first_unnamed` is the ordinal of its first
   /// anonymous slot (0 unless it follows other statements of a batch).
   pub fn new(native: S, first_unnamed: usize) -> Self {
      let directory = ParameterDirectory::build(&native, first_unnamed);
      Self { native, directory }
   }

   pub fn sql(&self) -> &str {
      self.native.sql()
   }

   pub fn directory(&self) -> &ParameterDirectory {
      &self.directory
   }

   pub fn map_parameter(&mut self, name: &str, parameter: usize) -> bool {
      self.directory.map_parameter(name, parameter)
   }

   /// Map `parameters` onto this statement alone.
   pub fn resolve_parameters(&mut self, parameters: &ParameterCollection) -> Result<ResolveReport> {
      Ok(resolve(std::slice::from_mut(self), parameters))
   }

   /// Bind the mapped parameters. Fails with [`Error::StaleMapping`] if
   /// `parameters` is not the collection (in the same shape) this statement
   /// was resolved against.
   pub fn bind_all(&mut self, parameters: &ParameterCollection, settings: &BindSettings) -> Result<()> {
      StatementBinder::new(settings).bind_all(&mut self.native, &self.directory, parameters)
   }

   pub fn native(&self) -> &S {
      &self.native
   }

   pub fn native_mut(&mut self) -> &mut S {
      &mut self.native
   }
}

/// The statements of one command text, prepared on demand.
///
/// Statements are prepared in order, each starting where the previous one's
/// native tail left off. A statement that depends on an earlier one (a table
/// created by it, say) can only be prepared once that earlier statement has
/// run, so callers that execute use [`prepare_next`](Self::prepare_next) and
/// step each statement before preparing the one after it.
#[derive(Debug)]
pub struct StatementBatch<S> {
   text: String,
   statements: Vec<Statement<S>>,
   /// Byte offset of the first unprepared character of `text`.
   consumed: usize,
   next_unnamed: usize,
}

impl<S: NativeStatement> StatementBatch<S> {
   /// A batch over `text` with nothing prepared yet.
   pub fn new(text: &str) -> Self {
      Self {
         text: text.to_string(),
         statements: Vec::new(),
         consumed: 0,
         next_unnamed: 0,
      }
   }

   /// Prepare all of `text` up front. Whitespace and comment-only fragments
   /// produce no statement.
   pub fn prepare<E>(engine: &mut E, text: &str) -> Result<Self>
   where
      E: NativeEngine<Statement = S> + ?Sized,
   {
      let mut batch = Self::new(text);
      while batch.prepare_next(engine)?.is_some() {}
      debug!(count = batch.len(), "Prepared statement batch");
      Ok(batch)
   }

   /// Prepare the next statement of the text, following the native tail
   /// offset, and return its index. `None` once the text is used up.
   ///
   /// The new statement's anonymous slots continue the ordinals of the
   /// statements before it. Its mapping is empty until the next resolve.
   pub fn prepare_next<E>(&mut self, engine: &mut E) -> Result<Option<usize>>
   where
      E: NativeEngine<Statement = S> + ?Sized,
   {
      while !self.is_exhausted() {
         let rest = &self.text[self.consumed..];
         let prepared = engine.prepare(rest)?;

         if prepared.tail_offset == 0 || prepared.tail_offset > rest.len() {
            self.consumed = self.text.len();
         } else {
            self.consumed += prepared.tail_offset;
         }

         if let Some(native) = prepared.statement {
            let statement = Statement::new(native, self.next_unnamed);
            self.next_unnamed = statement.directory().next_unnamed();
            trace!(
               sql = statement.sql(),
               slots = statement.directory().len(),
               "Prepared statement"
            );
            self.statements.push(statement);
            return Ok(Some(self.statements.len() - 1));
         }
      }
      Ok(None)
   }

   /// Whether nothing but separators is left to prepare.
   ///
   /// A trailing comment still counts as unprepared text until
   /// [`prepare_next`](Self::prepare_next) has consumed it.
   pub fn is_exhausted(&self) -> bool {
      self.text[self.consumed..]
         .chars()
         .all(|c| c.is_whitespace() || c == ';')
   }

   pub fn text(&self) -> &str {
      &self.text
   }

   /// Number of statements prepared so far.
   pub fn len(&self) -> usize {
      self.statements.len()
   }

   pub fn is_empty(&self) -> bool {
      self.statements.is_empty()
   }

   pub fn statements(&self) -> &[Statement<S>] {
      &self.statements
   }

   pub fn statements_mut(&mut self) -> &mut [Statement<S>] {
      &mut self.statements
   }

   /// Map `parameters` onto every statement prepared so far.
   ///
   /// A parameter's lookup name is its own name, or `;<u>` for the u-th
   /// unnamed parameter. It is offered to every statement, so one named
   /// parameter may feed several statements. A parameter that lands nowhere
   /// is retried as `;<k>` (its collection index) so named parameters can
   /// fill anonymous placeholders by position.
   pub fn resolve_parameters(&mut self, parameters: &ParameterCollection) -> Result<ResolveReport> {
      Ok(resolve(&mut self.statements, parameters))
   }

   /// Bind each prepared statement in turn.
   pub fn bind_all(&mut self, parameters: &ParameterCollection, settings: &BindSettings) -> Result<()> {
      for statement in &mut self.statements {
         statement.bind_all(parameters, settings)?;
      }
      Ok(())
   }
}

fn resolve<S>(statements: &mut [Statement<S>], parameters: &ParameterCollection) -> ResolveReport {
   for statement in statements.iter_mut() {
      statement.directory.clear_assignments();
   }

   let mut report = ResolveReport::default();
   let mut unnamed = 0;

   for (index, parameter) in parameters.iter().enumerate() {
      let key = match parameter.name() {
         Some(name) => name.to_string(),
         None => {
            let key = format!(";{}", unnamed);
            unnamed += 1;
            key
         }
      };

      let mut mapped = map_everywhere(statements, &key, index);
      if !mapped {
         mapped = map_everywhere(statements, &format!(";{}", index), index);
      }

      if mapped {
         report.mapped += 1;
      } else {
         report.unmatched.push(key);
      }
   }

   let token = parameters.token();
   for statement in statements.iter_mut() {
      statement.directory.mark_mapped(token);
   }

   report
}

fn map_everywhere<S>(statements: &mut [Statement<S>], key: &str, index: usize) -> bool {
   let mut mapped = false;
   for statement in statements.iter_mut() {
      mapped |= statement.directory.map_parameter(key, index);
   }
   mapped
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::Parameter;
   use sqlite_native::recording::RecordingEngine;

   fn collection(params: Vec<Parameter>) -> ParameterCollection {
      params.into_iter().collect()
   }

   #[test]
   fn test_prepare_splits_batch_and_continues_unnamed_counter() {
      let mut engine = RecordingEngine::new();
      let batch =
         StatementBatch::prepare(&mut engine, "INSERT INTO t VALUES (?, ?); SELECT ? ; ").unwrap();

      assert_eq!(batch.len(), 2);
      let first: Vec<&str> = batch.statements()[0]
         .directory()
         .slots()
         .iter()
         .map(|s| s.name())
         .collect();
      assert_eq!(first, vec![";0", ";1"]);
      assert_eq!(batch.statements()[1].directory().slot(1).unwrap().name(), ";2");
   }

   #[test]
   fn test_prepare_empty_text() {
      let mut engine = RecordingEngine::new();
      let batch = StatementBatch::prepare(&mut engine, "  ;  ").unwrap();
      assert!(batch.is_empty());
   }

   #[test]
   fn test_named_parameter_feeds_every_statement() {
      let mut engine = RecordingEngine::new();
      let mut batch =
         StatementBatch::prepare(&mut engine, "DELETE FROM a WHERE id = :id; DELETE FROM b WHERE id = @id")
            .unwrap();
      let params = collection(vec![Parameter::new("id", 4i64)]);

      let report = batch.resolve_parameters(&params).unwrap();
      assert_eq!(report.mapped, 1);
      assert!(report.is_complete());
      for statement in batch.statements() {
         assert_eq!(statement.directory().slot(1).unwrap().assigned(), Some(0));
      }
   }

   #[test]
   fn test_named_parameter_falls_back_to_position() {
      let mut engine = RecordingEngine::new();
      let mut batch = StatementBatch::prepare(&mut engine, "SELECT ?, ?").unwrap();
      let params = collection(vec![Parameter::new("first", 1i64), Parameter::new("second", 2i64)]);

      let report = batch.resolve_parameters(&params).unwrap();
      assert!(report.is_complete());
      let slots = batch.statements()[0].directory().slots();
      assert_eq!(slots[0].assigned(), Some(0));
      assert_eq!(slots[1].assigned(), Some(1));
   }

   #[test]
   fn test_unmatched_is_reported_not_fatal() {
      let mut engine = RecordingEngine::new();
      let mut batch = StatementBatch::prepare(&mut engine, "SELECT :a").unwrap();
      let params = collection(vec![Parameter::new("a", 1i64), Parameter::new("zzz", 2i64)]);

      let report = batch.resolve_parameters(&params).unwrap();
      assert_eq!(report.unmatched, vec!["zzz".to_string()]);

      let err = report.require_all_matched().unwrap_err();
      assert_eq!(err.error_code(), "UNMATCHED_PARAMETER");
   }

   #[test]
   fn test_bind_requires_fresh_mapping() {
      let mut engine = RecordingEngine::new();
      let mut batch = StatementBatch::prepare(&mut engine, "SELECT :a").unwrap();
      let mut params = collection(vec![Parameter::new("a", 1i64)]);
      let settings = BindSettings::default();

      assert!(matches!(batch.bind_all(&params, &settings), Err(Error::StaleMapping)));

      batch.resolve_parameters(&params).unwrap();
      batch.bind_all(&params, &settings).unwrap();

      params.add_with_value("b", 2i64);
      assert!(matches!(batch.bind_all(&params, &settings), Err(Error::StaleMapping)));

      let other = collection(vec![Parameter::new("a", 1i64)]);
      assert!(matches!(batch.bind_all(&other, &settings), Err(Error::StaleMapping)));
   }

   #[test]
   fn test_value_change_keeps_mapping() {
      let mut engine = RecordingEngine::new();
      let mut batch = StatementBatch::prepare(&mut engine, "SELECT :a").unwrap();
      let mut params = collection(vec![Parameter::new("a", 1i64)]);
      let settings = BindSettings::default();

      batch.resolve_parameters(&params).unwrap();
      params.get_mut(0).unwrap().set_value(5i64);
      assert!(batch.bind_all(&params, &settings).is_ok());
   }

   #[test]
   fn test_prepare_next_walks_text_one_statement_at_a_time() {
      let mut engine = RecordingEngine::new();
      let mut batch = StatementBatch::new("SELECT ?; -- note\n SELECT ?, :b;  ");
      assert!(batch.is_empty());
      assert!(!batch.is_exhausted());

      assert_eq!(batch.prepare_next(&mut engine).unwrap(), Some(0));
      assert_eq!(engine.log().calls().len(), 1);
      assert!(!batch.is_exhausted());

      assert_eq!(batch.prepare_next(&mut engine).unwrap(), Some(1));
      assert_eq!(batch.statements()[1].directory().slot(1).unwrap().name(), ";1");
      assert!(batch.is_exhausted());

      assert_eq!(batch.prepare_next(&mut engine).unwrap(), None);
      assert_eq!(batch.len(), 2);
   }
}
