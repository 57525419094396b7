//! Runtime parameter values.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// A parameter value as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
   #[default]
   Null,
   Bool(bool),
   I64(i64),
   U64(u64),
   F64(f64),
   Text(String),
   Bytes(Vec<u8>),
   DateTime(PrimitiveDateTime),
   Decimal(Decimal),
   Guid(Uuid),
}

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   /// Short name of the runtime type, for diagnostics.
   pub fn kind(&self) -> &'static str {
      match self {
         Value::Null => "null",
         Value::Bool(_) => "bool",
         Value::I64(_) => "i64",
         Value::U64(_) => "u64",
         Value::F64(_) => "f64",
         Value::Text(_) => "text",
         Value::Bytes(_) => "bytes",
         Value::DateTime(_) => "datetime",
         Value::Decimal(_) => "decimal",
         Value::Guid(_) => "guid",
      }
   }
}

impl fmt::Display for Value {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Value::Null => f.write_str("NULL"),
         Value::Bool(b) => write!(f, "{}", b),
         Value::I64(i) => write!(f, "{}", i),
         Value::U64(u) => write!(f, "{}", u),
         Value::F64(v) => write!(f, "{}", v),
         Value::Text(s) => write!(f, "'{}'", s),
         Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
         Value::DateTime(dt) => write!(f, "{}", sqlite_native::format_iso8601(*dt)),
         Value::Decimal(d) => write!(f, "{}", d),
         Value::Guid(g) => write!(f, "{}", g.hyphenated()),
      }
   }
}

macro_rules! value_from {
   ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
      $(
         impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
               Value::$variant(<$target>::from(v))
            }
         }
      )*
   };
}

value_from! {
   bool => Bool as bool,
   i8 => I64 as i64,
   i16 => I64 as i64,
   i32 => I64 as i64,
   i64 => I64 as i64,
   u8 => U64 as u64,
   u16 => U64 as u64,
   u32 => U64 as u64,
   u64 => U64 as u64,
   f32 => F64 as f64,
   f64 => F64 as f64,
   String => Text as String,
   Vec<u8> => Bytes as Vec<u8>,
   PrimitiveDateTime => DateTime as PrimitiveDateTime,
   Decimal => Decimal as Decimal,
   Uuid => Guid as Uuid,
}

impl From<&str> for Value {
   fn from(v: &str) -> Self {
      Value::Text(v.to_string())
   }
}

impl From<&[u8]> for Value {
   fn from(v: &[u8]) -> Self {
      Value::Bytes(v.to_vec())
   }
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(v: Option<T>) -> Self {
      v.map_or(Value::Null, Into::into)
   }
}

/// JSON values map the way a JSON bind would: integers keep their precision,
/// other numbers become doubles, and arrays/objects are bound as their JSON
/// text.
impl From<JsonValue> for Value {
   fn from(value: JsonValue) -> Self {
      match value {
         JsonValue::Null => Value::Null,
         JsonValue::Bool(b) => Value::Bool(b),
         JsonValue::String(s) => Value::Text(s),
         JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
               Value::I64(i)
            } else if let Some(u) = n.as_u64() {
               Value::U64(u)
            } else {
               Value::F64(n.as_f64().unwrap_or_default())
            }
         }
         other => Value::Text(other.to_string()),
      }
   }
}

/// Fixed-point decimal: `mantissa * 10^-scale`.
///
/// Trailing zeros are significant for display, so `1.50` and `1.5` compare
/// unequal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
   mantissa: i128,
   scale: u32,
}

/// Largest scale accepted; `10^38` is the largest power of ten an `i128` holds.
const MAX_SCALE: u32 = 38;

impl Decimal {
   pub const fn new(mantissa: i128, scale: u32) -> Self {
      Self { mantissa, scale }
   }

   pub fn mantissa(&self) -> i128 {
      self.mantissa
   }

   pub fn scale(&self) -> u32 {
      self.scale
   }

   pub fn to_f64(&self) -> f64 {
      self.mantissa as f64 / 10f64.powi(self.scale as i32)
   }

   /// Round to an integer, ties to even.
   pub fn round_half_even(&self) -> i128 {
      let Some(divisor) = 10i128.checked_pow(self.scale) else {
         return 0;
      };
      let quotient = self.mantissa / divisor;
      let remainder = (self.mantissa % divisor).abs();
      let complement = divisor - remainder;

      if remainder > complement || (remainder == complement && quotient % 2 != 0) {
         quotient + self.mantissa.signum()
      } else {
         quotient
      }
   }

   /// Render with `separator` between the integer and fractional digits.
   pub fn format_with(&self, separator: char) -> String {
      let digits = self.mantissa.unsigned_abs().to_string();
      let scale = self.scale as usize;
      let sign = if self.mantissa < 0 { "-" } else { "" };

      if scale == 0 {
         return format!("{}{}", sign, digits);
      }

      let (whole, fraction) = if digits.len() > scale {
         let split = digits.len() - scale;
         (digits[..split].to_string(), digits[split..].to_string())
      } else {
         ("0".to_string(), format!("{:0>width$}", digits, width = scale))
      };

      format!("{}{}{}{}", sign, whole, separator, fraction)
   }

   /// Parse decimal text using `separator` as the decimal point.
   pub fn parse_with(text: &str, separator: char) -> Result<Self, ParseDecimalError> {
      let text = text.trim();
      let (negative, unsigned) = match text.strip_prefix('-') {
         Some(rest) => (true, rest),
         None => (false, text.strip_prefix('+').unwrap_or(text)),
      };

      let (whole, fraction) = match unsigned.split_once(separator) {
         Some((w, f)) => (w, f),
         None => (unsigned, ""),
      };

      if whole.is_empty() && fraction.is_empty() {
         return Err(ParseDecimalError(text.to_string()));
      }
      if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
         return Err(ParseDecimalError(text.to_string()));
      }

      let scale = u32::try_from(fraction.len())
         .ok()
         .filter(|s| *s <= MAX_SCALE)
         .ok_or_else(|| ParseDecimalError(text.to_string()))?;

      let mut mantissa: i128 = 0;
      for b in whole.bytes().chain(fraction.bytes()) {
         mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(b - b'0')))
            .ok_or_else(|| ParseDecimalError(text.to_string()))?;
      }

      Ok(Self {
         mantissa: if negative { -mantissa } else { mantissa },
         scale,
      })
   }
}

impl fmt::Display for Decimal {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.format_with('.'))
   }
}

impl FromStr for Decimal {
   type Err = ParseDecimalError;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      Self::parse_with(s, '.')
   }
}

impl From<i64> for Decimal {
   fn from(v: i64) -> Self {
      Self::new(i128::from(v), 0)
   }
}

impl From<u64> for Decimal {
   fn from(v: u64) -> Self {
      Self::new(i128::from(v), 0)
   }
}

/// Text that is not a plain decimal number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal: {0}")]
pub struct ParseDecimalError(String);
