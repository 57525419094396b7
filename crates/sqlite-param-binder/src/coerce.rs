//! Value coercion: pick exactly one native bind operation for a value and its
//! declared type.
//!
//! Coercion is pure. The same value, declared type and policy always produce
//! the same [`BindOp`] (or the same error), and nothing is bound until a
//! `BindOp` is applied.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sqlite_native::{DateTimeFormat, NativeStatement, StoredDateTime};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::policy::TextCulture;
use crate::{BindPolicy, DbType, Decimal, Error, Result, Value};

/// A single native bind call, with its argument.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOp {
   Null,
   Bool(bool),
   Int32(i32),
   Int64(i64),
   UInt32(u32),
   UInt64(u64),
   Double(f64),
   Text(String),
   Blob(Vec<u8>),
   DateTime(PrimitiveDateTime),
}

impl BindOp {
   /// Name of the native call this operation issues.
   pub fn operation(&self) -> &'static str {
      match self {
         BindOp::Null => "bind_null",
         BindOp::Bool(_) => "bind_bool",
         BindOp::Int32(_) => "bind_i32",
         BindOp::Int64(_) => "bind_i64",
         BindOp::UInt32(_) => "bind_u32",
         BindOp::UInt64(_) => "bind_u64",
         BindOp::Double(_) => "bind_double",
         BindOp::Text(_) => "bind_text",
         BindOp::Blob(_) => "bind_blob",
         BindOp::DateTime(_) => "bind_datetime",
      }
   }

   /// Issue the native bind call at `position`.
   pub fn apply<S: NativeStatement + ?Sized>(
      &self,
      statement: &mut S,
      position: usize,
      format: DateTimeFormat,
   ) -> sqlite_native::Result<()> {
      match self {
         BindOp::Null => statement.bind_null(position),
         BindOp::Bool(v) => statement.bind_bool(position, *v),
         BindOp::Int32(v) => statement.bind_i32(position, *v),
         BindOp::Int64(v) => statement.bind_i64(position, *v),
         BindOp::UInt32(v) => statement.bind_u32(position, *v),
         BindOp::UInt64(v) => statement.bind_u64(position, *v),
         BindOp::Double(v) => statement.bind_double(position, *v),
         BindOp::Text(v) => statement.bind_text(position, v),
         BindOp::Blob(v) => statement.bind_blob(position, v),
         BindOp::DateTime(v) => statement.bind_datetime(position, *v, format),
      }
   }
}

/// Choose the bind operation for `value`.
///
/// `declared` is the parameter's explicitly declared type; `None` (or
/// `Some(DbType::Object)`) means the type is inferred from the value.
pub fn coerce(value: &Value, declared: Option<DbType>, policy: &BindPolicy) -> Result<BindOp> {
   if value.is_null() {
      return Ok(BindOp::Null);
   }

   if policy.force_all_values_as_text {
      return Ok(match value {
         Value::DateTime(dt) => BindOp::DateTime(*dt),
         other => BindOp::Text(to_text(other, policy)),
      });
   }

   let db_type = match declared {
      None | Some(DbType::Object) => DbType::infer(value).unwrap_or(DbType::Object),
      Some(db_type) => db_type,
   };

   if policy.decimal_as_text
      && let Value::Decimal(d) = value
   {
      return Ok(BindOp::Text(d.format_with(policy.decimal_culture().decimal_separator)));
   }

   let op = match db_type {
      t if t.is_date_time() => BindOp::DateTime(to_datetime(value, policy.date_time_format)?),
      DbType::Boolean => BindOp::Bool(to_bool(value, policy)?),
      DbType::SByte => BindOp::Int32(i32::from(narrow::<i8>(value, "SByte", policy)?)),
      DbType::Int16 => BindOp::Int32(i32::from(narrow::<i16>(value, "Int16", policy)?)),
      DbType::Int32 => BindOp::Int32(narrow::<i32>(value, "Int32", policy)?),
      DbType::Int64 => BindOp::Int64(narrow::<i64>(value, "Int64", policy)?),
      DbType::Byte => BindOp::UInt32(u32::from(narrow::<u8>(value, "Byte", policy)?)),
      DbType::UInt16 => BindOp::UInt32(u32::from(narrow::<u16>(value, "UInt16", policy)?)),
      DbType::UInt32 => BindOp::UInt32(narrow::<u32>(value, "UInt32", policy)?),
      DbType::UInt64 => BindOp::UInt64(narrow::<u64>(value, "UInt64", policy)?),
      DbType::Single | DbType::Double | DbType::Currency => {
         BindOp::Double(to_double(value, db_type_target(db_type), policy)?)
      }
      DbType::Binary => BindOp::Blob(to_bytes(value)?),
      DbType::Guid => {
         let guid = to_guid(value)?;
         if policy.binary_guid {
            BindOp::Blob(guid.as_bytes().to_vec())
         } else {
            BindOp::Text(guid.hyphenated().to_string())
         }
      }
      DbType::Decimal => {
         let decimal = to_decimal(value, policy)?;
         BindOp::Text(decimal.format_with(policy.decimal_culture().decimal_separator))
      }
      _ => BindOp::Text(to_text(value, policy)),
   };

   Ok(op)
}

fn db_type_target(db_type: DbType) -> &'static str {
   match db_type {
      DbType::Single => "Single",
      DbType::Currency => "Currency",
      _ => "Double",
   }
}

fn invalid(value: &Value, target: &'static str) -> Error {
   Error::InvalidConversion {
      value: value.to_string(),
      target,
   }
}

fn overflow(value: &Value, target: &'static str) -> Error {
   Error::ConversionOverflow {
      value: value.to_string(),
      target,
   }
}

/// Text form of a value.
fn to_text(value: &Value, policy: &BindPolicy) -> String {
   let culture = policy.text_culture();
   match value {
      Value::Null => String::new(),
      Value::Bool(b) => b.to_string(),
      Value::I64(i) => i.to_string(),
      Value::U64(u) => u.to_string(),
      Value::F64(f) => format_double(*f, culture),
      Value::Text(s) => s.clone(),
      Value::Bytes(b) => BASE64.encode(b),
      Value::DateTime(dt) => match policy.date_time_format.encode(*dt) {
         StoredDateTime::Text(text) => text,
         StoredDateTime::Integer(i) => i.to_string(),
         StoredDateTime::Real(r) => r.to_string(),
      },
      Value::Decimal(d) => d.format_with(culture.decimal_separator),
      Value::Guid(g) => g.hyphenated().to_string(),
   }
}

fn format_double(value: f64, culture: TextCulture) -> String {
   if value.is_nan() {
      return "NaN".to_string();
   }
   if value.is_infinite() {
      return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
   }

   let text = value.to_string();
   if culture.decimal_separator == '.' {
      text
   } else {
      text.replace('.', &culture.decimal_separator.to_string())
   }
}

/// Parse numeric text written with the culture's separator.
fn parse_decimal_text(text: &str, policy: &BindPolicy) -> Option<Decimal> {
   Decimal::parse_with(text, policy.text_culture().decimal_separator).ok()
}

fn parse_double_text(text: &str, policy: &BindPolicy) -> Option<f64> {
   let separator = policy.text_culture().decimal_separator;
   let text = text.trim();
   if separator == '.' {
      text.parse().ok()
   } else {
      text.replace(separator, ".").parse().ok()
   }
}

/// Widen any numeric value to `i128`, rounding fractions half-to-even.
fn to_integer(value: &Value, target: &'static str, policy: &BindPolicy) -> Result<i128> {
   match value {
      Value::Bool(b) => Ok(i128::from(*b)),
      Value::I64(i) => Ok(i128::from(*i)),
      Value::U64(u) => Ok(i128::from(*u)),
      Value::F64(f) => {
         let rounded = f.round_ties_even();
         // i128 spans roughly +/-1.7e38
         if !rounded.is_finite() || rounded.abs() >= 1.7e38 {
            return Err(overflow(value, target));
         }
         Ok(rounded as i128)
      }
      Value::Decimal(d) => Ok(d.round_half_even()),
      Value::Text(s) => {
         if let Ok(i) = s.trim().parse::<i128>() {
            return Ok(i);
         }
         parse_decimal_text(s, policy)
            .map(|d| d.round_half_even())
            .ok_or_else(|| invalid(value, target))
      }
      Value::Null | Value::Bytes(_) | Value::DateTime(_) | Value::Guid(_) => {
         Err(invalid(value, target))
      }
   }
}

fn narrow<T: TryFrom<i128>>(value: &Value, target: &'static str, policy: &BindPolicy) -> Result<T> {
   let wide = to_integer(value, target, policy)?;
   T::try_from(wide).map_err(|_| overflow(value, target))
}

fn to_double(value: &Value, target: &'static str, policy: &BindPolicy) -> Result<f64> {
   match value {
      Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
      Value::I64(i) => Ok(*i as f64),
      Value::U64(u) => Ok(*u as f64),
      Value::F64(f) => Ok(*f),
      Value::Decimal(d) => Ok(d.to_f64()),
      Value::Text(s) => parse_double_text(s, policy).ok_or_else(|| invalid(value, target)),
      Value::Null | Value::Bytes(_) | Value::DateTime(_) | Value::Guid(_) => {
         Err(invalid(value, target))
      }
   }
}

fn to_bool(value: &Value, policy: &BindPolicy) -> Result<bool> {
   match value {
      Value::Bool(b) => Ok(*b),
      Value::I64(i) => Ok(*i != 0),
      Value::U64(u) => Ok(*u != 0),
      Value::F64(f) => Ok(*f != 0.0),
      Value::Decimal(d) => Ok(d.mantissa() != 0),
      Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
         "true" | "yes" | "on" | "y" | "1" => Ok(true),
         "false" | "no" | "off" | "n" | "0" => Ok(false),
         _ => parse_decimal_text(s, policy)
            .map(|d| d.mantissa() != 0)
            .ok_or_else(|| invalid(value, "Boolean")),
      },
      Value::Null | Value::Bytes(_) | Value::DateTime(_) | Value::Guid(_) => {
         Err(invalid(value, "Boolean"))
      }
   }
}

fn to_decimal(value: &Value, policy: &BindPolicy) -> Result<Decimal> {
   match value {
      Value::Decimal(d) => Ok(*d),
      Value::Bool(b) => Ok(Decimal::new(i128::from(*b), 0)),
      Value::I64(i) => Ok(Decimal::from(*i)),
      Value::U64(u) => Ok(Decimal::from(*u)),
      Value::F64(f) => {
         if !f.is_finite() {
            return Err(invalid(value, "Decimal"));
         }
         // Display for f64 is the shortest round-trip form without exponent
         f.to_string()
            .parse::<Decimal>()
            .map_err(|_| overflow(value, "Decimal"))
      }
      Value::Text(s) => parse_decimal_text(s, policy).ok_or_else(|| invalid(value, "Decimal")),
      Value::Null | Value::Bytes(_) | Value::DateTime(_) | Value::Guid(_) => {
         Err(invalid(value, "Decimal"))
      }
   }
}

fn to_bytes(value: &Value) -> Result<Vec<u8>> {
   match value {
      Value::Bytes(b) => Ok(b.clone()),
      Value::Guid(g) => Ok(g.as_bytes().to_vec()),
      Value::Text(s) => BASE64
         .decode(s.trim())
         .map_err(|_| invalid(value, "Binary")),
      _ => Err(invalid(value, "Binary")),
   }
}

fn to_guid(value: &Value) -> Result<Uuid> {
   match value {
      Value::Guid(g) => Ok(*g),
      Value::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| invalid(value, "Guid")),
      Value::Bytes(b) => Uuid::from_slice(b).map_err(|_| invalid(value, "Guid")),
      _ => Err(invalid(value, "Guid")),
   }
}

/// Numbers are read in the connection's own storage encoding (ticks, epoch
/// seconds, Julian days); text is parsed the same way.
fn to_datetime(value: &Value, format: DateTimeFormat) -> Result<PrimitiveDateTime> {
   let text = match value {
      Value::DateTime(dt) => return Ok(*dt),
      Value::Text(s) => s.clone(),
      Value::I64(_) | Value::U64(_) | Value::F64(_) | Value::Decimal(_) => value.to_string(),
      _ => return Err(invalid(value, "DateTime")),
   };

   format.parse(&text).ok_or(Error::InvalidDateTime(text))
}
