//! Placeholder slots of one prepared statement and the parameters assigned
//! to them.

use sqlite_native::NativeStatement;

use crate::parameter::MappingToken;
use crate::{Error, Result};

/// Prefix characters a parameter name may start with.
pub const NAME_PREFIXES: [char; 5] = [':', '$', '@', ';', '?'];

/// Strip one leading prefix character, if present.
pub(crate) fn strip_marker(name: &str) -> &str {
   match name.chars().next() {
      Some(c) if NAME_PREFIXES.contains(&c) => &name[c.len_utf8()..],
      _ => name,
   }
}

/// `;<n>` lookup keys of unnamed parameters.
fn ordinal_key(key: &str) -> Option<usize> {
   key.strip_prefix(';')?.parse().ok()
}

/// How a slot was written in the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
   /// Bare `?`; holds the synthesized ordinal.
   Anonymous(usize),
   /// `?NNN`.
   Numbered(usize),
   /// `:name`, `@name` or `$name`.
   Named,
}

/// One bind position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
   position: usize,
   name: String,
   kind: SlotKind,
   assigned: Option<usize>,
}

impl ParameterSlot {
   /// 1-based bind position.
   pub fn position(&self) -> usize {
      self.position
   }

   /// Canonical name: the SQL name, or `;<n>` for anonymous slots.
   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn kind(&self) -> SlotKind {
      self.kind
   }

   /// Index into the parameter collection, once mapped.
   pub fn assigned(&self) -> Option<usize> {
      self.assigned
   }

   /// Does the lookup key `key` address this slot?
   ///
   /// One prefix character is ignored on both sides and case is ignored.
   /// Numbered slots also accept the `;<n>` key of the n+1-th unnamed
   /// parameter.
   pub fn matches(&self, key: &str) -> bool {
      let bare = strip_marker(key);
      match self.kind {
         SlotKind::Anonymous(_) | SlotKind::Named => {
            strip_marker(&self.name).eq_ignore_ascii_case(bare)
         }
         SlotKind::Numbered(n) => match ordinal_key(key) {
            Some(ordinal) => ordinal + 1 == n,
            None => bare.parse::<usize>().is_ok_and(|b| b == n),
         },
      }
   }
}

/// The slot table of one statement.
#[derive(Debug, Clone, Default)]
pub struct ParameterDirectory {
   slots: Vec<ParameterSlot>,
   next_unnamed: usize,
   mapped: Option<MappingToken>,
}

impl ParameterDirectory {
   /// Read parameter count and names from a native statement.
   ///
   /// Anonymous slots are named `;<n>`, with `n` starting at `first_unnamed`
   /// so numbering continues across the statements of one batch.
   pub fn build<S: NativeStatement + ?Sized>(statement: &S, first_unnamed: usize) -> Self {
      let count = statement.parameter_count();
      Self::from_names((1..=count).map(|i| statement.parameter_name(i)), first_unnamed)
   }

   /// Build from per-position names, position 1 first.
   pub fn from_names<I>(names: I, first_unnamed: usize) -> Self
   where
      I: IntoIterator<Item = Option<String>>,
   {
      let mut next_unnamed = first_unnamed;
      let slots = names
         .into_iter()
         .enumerate()
         .map(|(i, name)| {
            let position = i + 1;
            let (name, kind) = match name.filter(|n| !n.is_empty()) {
               Some(name) => {
                  let kind = match name.strip_prefix('?').map(str::parse::<usize>) {
                     Some(Ok(n)) => SlotKind::Numbered(n),
                     _ => SlotKind::Named,
                  };
                  (name, kind)
               }
               None => {
                  let ordinal = next_unnamed;
                  next_unnamed += 1;
                  (format!(";{}", ordinal), SlotKind::Anonymous(ordinal))
               }
            };
            ParameterSlot {
               position,
               name,
               kind,
               assigned: None,
            }
         })
         .collect();

      Self {
         slots,
         next_unnamed,
         mapped: None,
      }
   }

   pub fn len(&self) -> usize {
      self.slots.len()
   }

   pub fn is_empty(&self) -> bool {
      self.slots.is_empty()
   }

   /// Slots in position order.
   pub fn slots(&self) -> &[ParameterSlot] {
      &self.slots
   }

   pub fn slot(&self, position: usize) -> Option<&ParameterSlot> {
      position.checked_sub(1).and_then(|i| self.slots.get(i))
   }

   /// The unnamed ordinal the next statement of a batch starts at.
   pub fn next_unnamed(&self) -> usize {
      self.next_unnamed
   }

   /// Assign parameter index `parameter` to the first slot `name` addresses.
   pub fn map_parameter(&mut self, name: &str, parameter: usize) -> bool {
      match self.slots.iter_mut().find(|slot| slot.matches(name)) {
         Some(slot) => {
            slot.assigned = Some(parameter);
            true
         }
         None => false,
      }
   }

   /// Forget every assignment.
   pub fn clear_assignments(&mut self) {
      for slot in &mut self.slots {
         slot.assigned = None;
      }
      self.mapped = None;
   }

   pub(crate) fn mark_mapped(&mut self, token: MappingToken) {
      self.mapped = Some(token);
   }

   pub(crate) fn mapped_token(&self) -> Option<MappingToken> {
      self.mapped
   }

   /// Fail with the first slot, in position order, that has no parameter.
   pub fn require_assigned(&self) -> Result<()> {
      match self.slots.iter().find(|slot| slot.assigned.is_none()) {
         Some(slot) => Err(Error::MissingParameter {
            position: slot.position,
            name: slot.name.clone(),
         }),
         None => Ok(()),
      }
   }
}
