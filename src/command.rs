//! Commands: statement text, its prepared batch and the parameters bound to it.

use std::fmt;

use sqlite_native::{NativeEngine, NativeStatement, Step};
use sqlite_param_binder::{
   MappingToken, Parameter, ParameterCollection, ResolveReport, StatementBatch, Value,
};
use tracing::{debug, trace};

use crate::{Connection, Result};

/// A command bound to one [`Connection`].
///
/// The text is prepared one statement at a time: the first statement when
/// the command is created, each later one just before it runs, so a batch
/// may use tables its own earlier statements create. Prepared statements are
/// kept for the next run.
///
/// Parameters are mapped onto the placeholders lazily. Any change to the
/// collection after a mapping makes the next [`bind`](Self::bind) map
/// again, so callers never see a stale mapping.
pub struct Command<'c, E: NativeEngine> {
   connection: &'c Connection<E>,
   batch: StatementBatch<E::Statement>,
   parameters: ParameterCollection,
   resolved: Option<MappingToken>,
}

impl<E: NativeEngine> fmt::Debug for Command<'_, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Command")
         .field("text", &self.batch.text())
         .field("statements", &self.batch.len())
         .field("parameters", &self.parameters)
         .field("resolved", &self.resolved)
         .finish()
   }
}

impl<'c, E: NativeEngine> Command<'c, E> {
   pub(crate) fn new(connection: &'c Connection<E>, text: &str) -> Result<Self> {
      let batch = prepare_first(connection, text)?;
      Ok(Self {
         connection,
         batch,
         parameters: ParameterCollection::new(),
         resolved: None,
      })
   }

   pub fn text(&self) -> &str {
      self.batch.text()
   }

   /// Replace the command text. The first statement of the new text is
   /// prepared immediately and the parameter collection is kept.
   pub fn set_text(&mut self, text: &str) -> Result<()> {
      self.batch = prepare_first(self.connection, text)?;
      self.resolved = None;
      Ok(())
   }

   /// The statements prepared so far.
   pub fn batch(&self) -> &StatementBatch<E::Statement> {
      &self.batch
   }

   pub fn parameters(&self) -> &ParameterCollection {
      &self.parameters
   }

   pub fn parameters_mut(&mut self) -> &mut ParameterCollection {
      &mut self.parameters
   }

   /// Add a named parameter.
   pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
      self.parameters.add_with_value(name, value);
      self
   }

   /// Add a fully described parameter (explicit type, type name, ...).
   pub fn with_param(mut self, parameter: Parameter) -> Self {
      self.parameters.add(parameter);
      self
   }

   /// Map the current parameters onto every statement prepared so far.
   ///
   /// Parameters that land nowhere are reported. With
   /// `strict_parameter_mapping` they are refused once the whole text has
   /// been prepared.
   pub fn resolve(&mut self) -> Result<ResolveReport> {
      let strict = self.connection.settings.policy.strict_parameter_mapping;
      map(&mut self.batch, &self.parameters, &mut self.resolved, strict)
   }

   /// Bind every prepared statement, mapping first if the parameters
   /// changed.
   pub fn bind(&mut self) -> Result<()> {
      self.ensure_mapped()?;
      self.batch.bind_all(&self.parameters, &self.connection.settings)?;
      Ok(())
   }

   /// Bind and run every statement to completion.
   pub fn execute(&mut self) -> Result<()> {
      self.run().map(|_| ())
   }

   /// Bind and run every statement, returning the first column of the first
   /// row produced, if any.
   pub fn execute_scalar(&mut self) -> Result<Option<i64>> {
      self.run()
   }

   fn ensure_mapped(&mut self) -> Result<()> {
      if self.resolved != Some(self.parameters.token()) {
         self.resolve()?;
      }
      Ok(())
   }

   /// Prepare, map, bind and step each statement in order. The engine lock
   /// is taken to prepare and to step; binding runs outside it, so log sinks
   /// may call back into the connection.
   fn run(&mut self) -> Result<Option<i64>> {
      let connection = self.connection;
      let strict = connection.settings.policy.strict_parameter_mapping;
      let mut scalar = None;
      let mut index = 0;

      loop {
         if index == self.batch.len() {
            let batch = &mut self.batch;
            if connection
               .ledger
               .with_engine(|engine| batch.prepare_next(engine))??
               .is_none()
            {
               break;
            }
            self.resolved = None;
         }
         self.ensure_mapped()?;

         let statement = &mut self.batch.statements_mut()[index];
         statement.bind_all(&self.parameters, &connection.settings)?;
         let first = connection
            .ledger
            .with_engine(|_| step(statement.native_mut()))??;
         scalar = scalar.or(first);
         index += 1;
      }

      // A trailing comment hid the end of the text from the last mapping.
      if strict {
         self.resolve()?;
      }

      debug!(
         statements = self.batch.len(),
         depth = connection.depth(),
         "Executed command"
      );
      Ok(scalar)
   }
}

fn prepare_first<E: NativeEngine>(
   connection: &Connection<E>,
   text: &str,
) -> Result<StatementBatch<E::Statement>> {
   let mut batch = StatementBatch::new(text);
   connection
      .ledger
      .with_engine(|engine| batch.prepare_next(engine))??;
   Ok(batch)
}

/// Map `parameters` onto the prepared statements and remember the mapping.
/// Unmatched parameters are only final once the text is used up.
fn map<S: NativeStatement>(
   batch: &mut StatementBatch<S>,
   parameters: &ParameterCollection,
   resolved: &mut Option<MappingToken>,
   strict: bool,
) -> Result<ResolveReport> {
   *resolved = None;
   let report = batch.resolve_parameters(parameters)?;
   if !report.is_complete() && batch.is_exhausted() {
      debug!(unmatched = ?report.unmatched, "Parameters matched no placeholder");
   }

   let report = if strict && batch.is_exhausted() {
      report.require_all_matched()?
   } else {
      report
   };

   *resolved = Some(parameters.token());
   Ok(report)
}

/// Step a statement until it is done, then reset it for the next run.
/// The engine lock is held by the caller.
fn step<S: NativeStatement>(native: &mut S) -> sqlite_native::Result<Option<i64>> {
   let mut scalar = None;
   let mut rows = 0usize;
   loop {
      match native.step() {
         Ok(Step::Row) => {
            if scalar.is_none() {
               scalar = Some(native.column_i64(0));
            }
            rows += 1;
         }
         Ok(Step::Done) => break,
         Err(error) => {
            // Keep the statement reusable after a failed step.
            let _ = native.reset();
            return Err(error);
         }
      }
   }
   native.reset()?;
   trace!(sql = native.sql(), rows, "Stepped statement");
   Ok(scalar)
}
