//! Connection-level binding policy.

use serde::{Deserialize, Serialize};
use sqlite_native::DateTimeFormat;

/// Formatting conventions of the "current culture".
///
/// Only the decimal separator varies; invariant formatting always uses `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextCulture {
   /// Default: `.`
   pub decimal_separator: char,
}

impl Default for TextCulture {
   fn default() -> Self {
      Self {
         decimal_separator: '.',
      }
   }
}

impl TextCulture {
   /// The invariant culture.
   pub const INVARIANT: TextCulture = TextCulture {
      decimal_separator: '.',
   };
}

/// Flags that change how parameter values are coerced and bound.
///
/// # Examples
///
/// ```
/// use sqlite_param_binder::BindPolicy;
///
/// let policy = BindPolicy::default()
///    .with_binary_guid(false)
///    .with_log_binds(true);
/// assert!(!policy.binary_guid);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindPolicy {
   /// Bind every non-date/time value as text.
   ///
   /// Default: false
   pub force_all_values_as_text: bool,

   /// Bind decimal values as text even when declared as another type.
   ///
   /// Default: false
   pub decimal_as_text: bool,

   /// Format values as text using the invariant culture instead of
   /// [`BindPolicy::culture`].
   ///
   /// Default: false
   pub use_invariant_text_conversion: bool,

   /// Format decimals as text using the invariant culture.
   ///
   /// Default: false
   pub invariant_decimal_conversion: bool,

   /// Fall back to the parameter name when looking up a bind callback.
   ///
   /// Default: false
   pub allow_parameter_name_as_type_name: bool,

   /// Fall back to the declared type's SQL name when looking up a bind
   /// callback.
   ///
   /// Default: false
   pub allow_db_type_as_type_name: bool,

   /// Store GUIDs as 16-byte blobs rather than text.
   ///
   /// Default: true
   pub binary_guid: bool,

   /// Treat a supplied parameter that matches no placeholder as an error.
   ///
   /// Default: false
   pub strict_parameter_mapping: bool,

   /// Report pre-bind and bound events to the connection's log.
   ///
   /// Default: false
   pub log_binds: bool,

   /// Storage encoding for date/time values.
   ///
   /// Default: ISO-8601 text
   pub date_time_format: DateTimeFormat,

   /// Culture used for non-invariant text conversion.
   pub culture: TextCulture,
}

impl Default for BindPolicy {
   fn default() -> Self {
      Self {
         force_all_values_as_text: false,
         decimal_as_text: false,
         use_invariant_text_conversion: false,
         invariant_decimal_conversion: false,
         allow_parameter_name_as_type_name: false,
         allow_db_type_as_type_name: false,
         binary_guid: true,
         strict_parameter_mapping: false,
         log_binds: false,
         date_time_format: DateTimeFormat::default(),
         culture: TextCulture::default(),
      }
   }
}

impl BindPolicy {
   pub fn with_force_all_values_as_text(mut self, enabled: bool) -> Self {
      self.force_all_values_as_text = enabled;
      self
   }

   pub fn with_decimal_as_text(mut self, enabled: bool) -> Self {
      self.decimal_as_text = enabled;
      self
   }

   pub fn with_invariant_text_conversion(mut self, enabled: bool) -> Self {
      self.use_invariant_text_conversion = enabled;
      self
   }

   pub fn with_invariant_decimal_conversion(mut self, enabled: bool) -> Self {
      self.invariant_decimal_conversion = enabled;
      self
   }

   pub fn with_parameter_name_as_type_name(mut self, enabled: bool) -> Self {
      self.allow_parameter_name_as_type_name = enabled;
      self
   }

   pub fn with_db_type_as_type_name(mut self, enabled: bool) -> Self {
      self.allow_db_type_as_type_name = enabled;
      self
   }

   pub fn with_binary_guid(mut self, enabled: bool) -> Self {
      self.binary_guid = enabled;
      self
   }

   pub fn with_strict_parameter_mapping(mut self, enabled: bool) -> Self {
      self.strict_parameter_mapping = enabled;
      self
   }

   pub fn with_log_binds(mut self, enabled: bool) -> Self {
      self.log_binds = enabled;
      self
   }

   pub fn with_date_time_format(mut self, format: DateTimeFormat) -> Self {
      self.date_time_format = format;
      self
   }

   pub fn with_culture(mut self, culture: TextCulture) -> Self {
      self.culture = culture;
      self
   }

   /// Culture for general text conversion.
   pub(crate) fn text_culture(&self) -> TextCulture {
      if self.use_invariant_text_conversion {
         TextCulture::INVARIANT
      } else {
         self.culture
      }
   }

   /// Culture for decimal-to-text conversion.
   pub(crate) fn decimal_culture(&self) -> TextCulture {
      if self.use_invariant_text_conversion || self.invariant_decimal_conversion {
         TextCulture::INVARIANT
      } else {
         self.culture
      }
   }
}
