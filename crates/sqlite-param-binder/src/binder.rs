//! Binding passes over a statement's slots.

use std::fmt;
use std::sync::Arc;

use sqlite_native::{LogEvent, NativeStatement, ProviderLog};
use tracing::trace;

use crate::callbacks::resolve_type_name;
use crate::{
   BindOp, BindPolicy, CustomBind, Error, Parameter, ParameterCollection, ParameterDirectory,
   ParameterSlot, Result, TypeCallbackRegistry, coerce,
};

/// Everything a binding pass needs from the connection.
#[derive(Clone, Default)]
pub struct BindSettings {
   pub policy: BindPolicy,
   pub callbacks: TypeCallbackRegistry,
   /// Receives pre-bind and bound events when `policy.log_binds` is set.
   pub log: Option<Arc<dyn ProviderLog>>,
}

impl fmt::Debug for BindSettings {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("BindSettings")
         .field("policy", &self.policy)
         .field("callbacks", &self.callbacks)
         .field("log", &self.log.is_some())
         .finish()
   }
}

impl BindSettings {
   pub fn new(policy: BindPolicy) -> Self {
      Self {
         policy,
         ..Default::default()
      }
   }

   pub fn with_callbacks(mut self, callbacks: TypeCallbackRegistry) -> Self {
      self.callbacks = callbacks;
      self
   }

   pub fn with_log(mut self, log: Arc<dyn ProviderLog>) -> Self {
      self.log = Some(log);
      self
   }

   fn bind_log(&self) -> Option<&dyn ProviderLog> {
      if self.policy.log_binds {
         self.log.as_deref()
      } else {
         None
      }
   }
}

/// Binds the parameters assigned in a [`ParameterDirectory`] to a native
/// statement.
#[derive(Debug, Clone, Copy)]
pub struct StatementBinder<'a> {
   settings: &'a BindSettings,
}

impl<'a> StatementBinder<'a> {
   pub fn new(settings: &'a BindSettings) -> Self {
      Self { settings }
   }

   /// Pick the bind operation for `parameter` at `position`: a registered
   /// callback first, built-in coercion otherwise.
   pub fn select(&self, parameter: &Parameter, position: usize) -> Result<BindOp> {
      let policy = &self.settings.policy;

      if let Some(type_name) = resolve_type_name(parameter, policy)
         && let Some(callback) = self.settings.callbacks.get(&type_name)
         && let CustomBind::Bound(op) = callback.bind(parameter, &type_name, position, policy)?
      {
         return Ok(op);
      }

      coerce(parameter.value(), parameter.declared_db_type(), policy)
   }

   /// Bind every slot of `directory`.
   ///
   /// All slots must be assigned and every value must coerce before anything
   /// is bound. Existing bindings are cleared first, so a pass that fails on
   /// a native call leaves the remaining slots NULL rather than holding
   /// values from an earlier execution.
   pub fn bind_all<S: NativeStatement + ?Sized>(
      &self,
      statement: &mut S,
      directory: &ParameterDirectory,
      parameters: &ParameterCollection,
   ) -> Result<()> {
      if directory.is_empty() {
         return Ok(());
      }

      if directory.mapped_token() != Some(parameters.token()) {
         return Err(Error::StaleMapping);
      }
      directory.require_assigned()?;

      let mut planned = Vec::with_capacity(directory.len());
      for slot in directory.slots() {
         let parameter = slot
            .assigned()
            .and_then(|index| parameters.get(index))
            .ok_or(Error::StaleMapping)?;
         let op = self.select(parameter, slot.position())?;
         planned.push((slot, parameter, op));
      }

      statement.clear_bindings()?;

      for (slot, parameter, op) in &planned {
         self.apply(statement, slot, parameter, op)?;
      }

      trace!(sql = statement.sql(), count = planned.len(), "Bound statement parameters");
      Ok(())
   }

   fn apply<S: NativeStatement + ?Sized>(
      &self,
      statement: &mut S,
      slot: &ParameterSlot,
      parameter: &Parameter,
      op: &BindOp,
   ) -> Result<()> {
      let position = slot.position();
      let log = self.settings.bind_log();

      if let Some(log) = log {
         let declared = format!("{:?}", parameter.db_type());
         log.log(&LogEvent::PreBind {
            sql: statement.sql(),
            position,
            name: slot.name(),
            declared: &declared,
            value: parameter.value(),
         });
      }

      op.apply(statement, position, self.settings.policy.date_time_format)
         .map_err(|source| Error::BindFailed {
            position,
            db_type: parameter.db_type(),
            source,
         })?;

      if let Some(log) = log {
         log.log(&LogEvent::Bound {
            sql: statement.sql(),
            position,
            operation: op.operation(),
         });
      }

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{DbType, Value};

   #[test]
   fn test_select_uses_callback_when_bound() {
      let mut callbacks = TypeCallbackRegistry::new();
      callbacks.register("point", |p: &Parameter, _: &str, _: usize, _: &BindPolicy| -> Result<CustomBind> {
         Ok(CustomBind::Bound(BindOp::Text(format!("POINT({})", p.value()))))
      });
      let settings = BindSettings::default().with_callbacks(callbacks);
      let binder = StatementBinder::new(&settings);

      let p = Parameter::new(":p", 3i64).with_type_name("POINT");
      assert_eq!(binder.select(&p, 1).unwrap(), BindOp::Text("POINT(3)".into()));
   }

   #[test]
   fn test_select_falls_through_on_default() {
      let mut callbacks = TypeCallbackRegistry::new();
      callbacks.register("INT", |_: &Parameter, _: &str, _: usize, _: &BindPolicy| -> Result<CustomBind> {
         Ok(CustomBind::Default)
      });
      let settings = BindSettings::new(BindPolicy::default().with_db_type_as_type_name(true))
         .with_callbacks(callbacks);
      let binder = StatementBinder::new(&settings);

      let p = Parameter::unnamed(9i64).with_db_type(DbType::Int32);
      assert_eq!(binder.select(&p, 1).unwrap(), BindOp::Int32(9));
   }

   #[test]
   fn test_select_callback_error_propagates() {
      let mut callbacks = TypeCallbackRegistry::new();
      callbacks.register("strict", |p: &Parameter, _: &str, _: usize, _: &BindPolicy| -> Result<CustomBind> {
         Err(Error::InvalidConversion {
            value: p.value().to_string(),
            target: "strict",
         })
      });
      let settings = BindSettings::default().with_callbacks(callbacks);
      let binder = StatementBinder::new(&settings);

      let p = Parameter::unnamed(Value::from("x")).with_type_name("STRICT");
      assert!(matches!(
         binder.select(&p, 1),
         Err(Error::InvalidConversion { target: "strict", .. })
      ));
   }

   #[test]
   fn test_settings_debug_hides_log() {
      let settings = BindSettings::default().with_log(sqlite_native::tracing_log());
      let debug = format!("{:?}", settings);
      assert!(debug.contains("log: true"));
   }
}
