//! Per-type bind overrides.
//!
//! A callback registered under a SQL type name takes over binding for every
//! parameter whose resolved type name matches, or hands the parameter back
//! to the built-in coercion.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::{BindOp, BindPolicy, Parameter, Result};

/// What a [`BindValueCallback`] decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomBind {
   /// Bind this instead; built-in coercion is skipped.
   Bound(BindOp),
   /// Continue with built-in coercion.
   Default,
}

/// Custom binding for one SQL type name.
pub trait BindValueCallback: Send + Sync {
   fn bind(
      &self,
      parameter: &Parameter,
      type_name: &str,
      position: usize,
      policy: &BindPolicy,
   ) -> Result<CustomBind>;
}

impl<F> BindValueCallback for F
where
   F: Fn(&Parameter, &str, usize, &BindPolicy) -> Result<CustomBind> + Send + Sync,
{
   fn bind(
      &self,
      parameter: &Parameter,
      type_name: &str,
      position: usize,
      policy: &BindPolicy,
   ) -> Result<CustomBind> {
      self(parameter, type_name, position, policy)
   }
}

/// Callbacks keyed by type name, compared ASCII case-insensitively.
#[derive(Clone, Default)]
pub struct TypeCallbackRegistry {
   callbacks: IndexMap<String, Arc<dyn BindValueCallback>>,
}

impl fmt::Debug for TypeCallbackRegistry {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_set().entries(self.callbacks.keys()).finish()
   }
}

impl TypeCallbackRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register `callback` for `type_name`, replacing any previous one.
   pub fn register<C>(&mut self, type_name: &str, callback: C) -> &mut Self
   where
      C: BindValueCallback + 'static,
   {
      self
         .callbacks
         .insert(type_name.to_ascii_lowercase(), Arc::new(callback));
      self
   }

   /// Returns `true` if a callback was registered for `type_name`.
   pub fn unregister(&mut self, type_name: &str) -> bool {
      self
         .callbacks
         .shift_remove(&type_name.to_ascii_lowercase())
         .is_some()
   }

   pub fn get(&self, type_name: &str) -> Option<&Arc<dyn BindValueCallback>> {
      self.callbacks.get(&type_name.to_ascii_lowercase())
   }

   /// Registered type names in registration order.
   pub fn type_names(&self) -> impl Iterator<Item = &str> {
      self.callbacks.keys().map(String::as_str)
   }

   pub fn len(&self) -> usize {
      self.callbacks.len()
   }

   pub fn is_empty(&self) -> bool {
      self.callbacks.is_empty()
   }
}

/// The type name used to look up a callback for `parameter`: its explicit
/// type name, else its name (when allowed), else its declared type's SQL
/// name (when allowed).
pub fn resolve_type_name<'a>(parameter: &'a Parameter, policy: &BindPolicy) -> Option<Cow<'a, str>> {
   if let Some(type_name) = parameter.type_name().filter(|t| !t.is_empty()) {
      return Some(Cow::Borrowed(type_name));
   }

   if policy.allow_parameter_name_as_type_name
      && let Some(name) = parameter.name()
   {
      return Some(Cow::Borrowed(name));
   }

   if policy.allow_db_type_as_type_name {
      let name = parameter.db_type().type_name();
      if !name.is_empty() {
         return Some(Cow::Borrowed(name));
      }
   }

   None
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::DbType;

   fn upper_text(parameter: &Parameter, _: &str, _: usize, _: &BindPolicy) -> Result<CustomBind> {
      Ok(CustomBind::Bound(BindOp::Text(
         parameter.value().to_string().to_uppercase(),
      )))
   }

   #[test]
   fn test_lookup_is_case_insensitive() {
      let mut registry = TypeCallbackRegistry::new();
      registry.register("Json", upper_text);

      assert!(registry.get("JSON").is_some());
      assert!(registry.get("json").is_some());
      assert!(registry.get("text").is_none());
   }

   #[test]
   fn test_register_replaces_and_unregister_removes() {
      let mut registry = TypeCallbackRegistry::new();
      registry
         .register("a", upper_text)
         .register("b", upper_text)
         .register("A", upper_text);

      assert_eq!(registry.type_names().collect::<Vec<_>>(), vec!["a", "b"]);
      assert!(registry.unregister("A"));
      assert!(!registry.unregister("A"));
      assert_eq!(registry.len(), 1);
   }

   #[test]
   fn test_resolve_prefers_explicit_type_name() {
      let policy = BindPolicy::default()
         .with_parameter_name_as_type_name(true)
         .with_db_type_as_type_name(true);
      let p = Parameter::new(":meta", 1i32).with_type_name("JSON");
      assert_eq!(resolve_type_name(&p, &policy).as_deref(), Some("JSON"));
   }

   #[test]
   fn test_resolve_falls_back_in_order() {
      let p = Parameter::new(":meta", 1i32).with_db_type(DbType::Int32);

      assert_eq!(resolve_type_name(&p, &BindPolicy::default()), None);

      let by_db_type = BindPolicy::default().with_db_type_as_type_name(true);
      assert_eq!(resolve_type_name(&p, &by_db_type).as_deref(), Some("INT"));

      let by_name = by_db_type.with_parameter_name_as_type_name(true);
      assert_eq!(resolve_type_name(&p, &by_name).as_deref(), Some(":meta"));
   }

   #[test]
   fn test_resolve_skips_object_type_name() {
      let policy = BindPolicy::default().with_db_type_as_type_name(true);
      let p = Parameter::unnamed(crate::Value::Null);
      assert_eq!(resolve_type_name(&p, &policy), None);
   }
}
