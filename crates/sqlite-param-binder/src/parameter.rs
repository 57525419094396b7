//! Caller-supplied parameters and the ordered collection they live in.

use uuid::Uuid;

use crate::{DbType, Value};

/// One caller-supplied parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
   name: Option<String>,
   value: Value,
   db_type: Option<DbType>,
   type_name: Option<String>,
}

impl Parameter {
   /// A named parameter. The name may carry a prefix (`:id`, `@id`, `$id`)
   /// or be bare (`id`).
   pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
      let name = name.into();
      Self {
         name: (!name.is_empty()).then_some(name),
         value: value.into(),
         db_type: None,
         type_name: None,
      }
   }

   /// A parameter matched by position.
   pub fn unnamed(value: impl Into<Value>) -> Self {
      Self {
         name: None,
         value: value.into(),
         db_type: None,
         type_name: None,
      }
   }

   pub fn with_db_type(mut self, db_type: DbType) -> Self {
      self.db_type = Some(db_type);
      self
   }

   /// Set a type name used to pick a registered bind callback.
   pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
      self.type_name = Some(type_name.into());
      self
   }

   pub fn name(&self) -> Option<&str> {
      self.name.as_deref()
   }

   pub fn value(&self) -> &Value {
      &self.value
   }

   pub fn set_value(&mut self, value: impl Into<Value>) {
      self.value = value.into();
   }

   /// The explicitly declared type, if any.
   pub fn declared_db_type(&self) -> Option<DbType> {
      self.db_type
   }

   /// The declared type, or the type inferred from the current value when
   /// none was declared. Null values with no declared type read as `Object`.
   pub fn db_type(&self) -> DbType {
      self
         .db_type
         .or_else(|| DbType::infer(&self.value))
         .unwrap_or(DbType::Object)
   }

   /// Declare a type, or pass `None` to go back to inferring it.
   pub fn set_db_type(&mut self, db_type: Option<DbType>) {
      self.db_type = db_type;
   }

   pub fn type_name(&self) -> Option<&str> {
      self.type_name.as_deref()
   }

   pub fn set_type_name(&mut self, type_name: Option<String>) {
      self.type_name = type_name;
   }
}

/// Identifies one shape of one [`ParameterCollection`].
///
/// Statements remember the token they were resolved against; binding with a
/// collection whose token differs is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingToken {
   collection: Uuid,
   revision: u64,
}

/// Ordered parameters for one command.
///
/// Adding, inserting, removing or clearing parameters bumps the revision.
/// Changing a parameter's value or type does not, since slot assignments
/// stay valid.
#[derive(Debug, Clone)]
pub struct ParameterCollection {
   id: Uuid,
   revision: u64,
   items: Vec<Parameter>,
}

impl Default for ParameterCollection {
   fn default() -> Self {
      Self::new()
   }
}

impl ParameterCollection {
   pub fn new() -> Self {
      Self {
         id: Uuid::new_v4(),
         revision: 0,
         items: Vec::new(),
      }
   }

   /// Append a parameter, returning its index.
   pub fn add(&mut self, parameter: Parameter) -> usize {
      self.items.push(parameter);
      self.revision += 1;
      self.items.len() - 1
   }

   pub fn add_with_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> usize {
      self.add(Parameter::new(name, value))
   }

   pub fn add_unnamed(&mut self, value: impl Into<Value>) -> usize {
      self.add(Parameter::unnamed(value))
   }

   /// Insert at `index`, shifting later parameters.
   ///
   /// # Panics
   ///
   /// Panics if `index > len`.
   pub fn insert(&mut self, index: usize, parameter: Parameter) {
      self.items.insert(index, parameter);
      self.revision += 1;
   }

   /// Remove and return the parameter at `index`, if there is one.
   pub fn remove(&mut self, index: usize) -> Option<Parameter> {
      if index >= self.items.len() {
         return None;
      }
      self.revision += 1;
      Some(self.items.remove(index))
   }

   pub fn remove_named(&mut self, name: &str) -> Option<Parameter> {
      let index = self.index_of(name)?;
      self.remove(index)
   }

   pub fn clear(&mut self) {
      self.items.clear();
      self.revision += 1;
   }

   pub fn len(&self) -> usize {
      self.items.len()
   }

   pub fn is_empty(&self) -> bool {
      self.items.is_empty()
   }

   pub fn get(&self, index: usize) -> Option<&Parameter> {
      self.items.get(index)
   }

   pub fn get_mut(&mut self, index: usize) -> Option<&mut Parameter> {
      self.items.get_mut(index)
   }

   /// Index of the parameter named `name`, ignoring ASCII case and a leading
   /// prefix character on either side.
   pub fn index_of(&self, name: &str) -> Option<usize> {
      let wanted = crate::directory::strip_marker(name);
      self.items.iter().position(|p| {
         p.name()
            .is_some_and(|n| crate::directory::strip_marker(n).eq_ignore_ascii_case(wanted))
      })
   }

   pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
      self.items.iter()
   }

   pub fn revision(&self) -> u64 {
      self.revision
   }

   pub fn token(&self) -> MappingToken {
      MappingToken {
         collection: self.id,
         revision: self.revision,
      }
   }
}

impl<'a> IntoIterator for &'a ParameterCollection {
   type Item = &'a Parameter;
   type IntoIter = std::slice::Iter<'a, Parameter>;

   fn into_iter(self) -> Self::IntoIter {
      self.items.iter()
   }
}

impl FromIterator<Parameter> for ParameterCollection {
   fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
      let mut collection = Self::new();
      collection.items.extend(iter);
      collection
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_db_type_inferred_until_declared() {
      let mut p = Parameter::new(":n", 5i64);
      assert_eq!(p.declared_db_type(), None);
      assert_eq!(p.db_type(), DbType::Int64);

      p.set_db_type(Some(DbType::Int16));
      assert_eq!(p.db_type(), DbType::Int16);

      p.set_db_type(None);
      p.set_value("now text");
      assert_eq!(p.db_type(), DbType::String);
   }

   #[test]
   fn test_null_reads_as_object() {
      assert_eq!(Parameter::unnamed(Value::Null).db_type(), DbType::Object);
   }

   #[test]
   fn test_empty_name_is_unnamed() {
      assert_eq!(Parameter::new("", 1i32).name(), None);
   }

   #[test]
   fn test_structural_changes_bump_revision() {
      let mut params = ParameterCollection::new();
      let start = params.token();

      params.add_with_value("a", 1i32);
      let after_add = params.token();
      assert_ne!(start, after_add);

      params.get_mut(0).unwrap().set_value(2i32);
      assert_eq!(params.token(), after_add);

      params.remove(0);
      assert_ne!(params.token(), after_add);
      assert!(params.remove(0).is_none());
   }

   #[test]
   fn test_collections_have_distinct_tokens() {
      let a = ParameterCollection::new();
      let b = ParameterCollection::new();
      assert_ne!(a.token(), b.token());
   }

   #[test]
   fn test_index_of_ignores_prefix_and_case() {
      let params: ParameterCollection = vec![
         Parameter::new(":Id", 1i32),
         Parameter::new("name", "x"),
      ]
      .into_iter()
      .collect();

      assert_eq!(params.index_of("@id"), Some(0));
      assert_eq!(params.index_of("ID"), Some(0));
      assert_eq!(params.index_of("$NAME"), Some(1));
      assert_eq!(params.index_of("missing"), None);
   }
}
