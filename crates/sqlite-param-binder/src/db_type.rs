use serde::{Deserialize, Serialize};

use crate::Value;

/// Declared database type of a parameter.
///
/// `Object` means "whatever the value is": coercion infers the concrete type
/// from the value's runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
   AnsiString,
   Binary,
   Byte,
   Boolean,
   Currency,
   Date,
   DateTime,
   Decimal,
   Double,
   Guid,
   Int16,
   Int32,
   Int64,
   Object,
   SByte,
   Single,
   String,
   Time,
   UInt16,
   UInt32,
   UInt64,
   VarNumeric,
   AnsiStringFixedLength,
   StringFixedLength,
   Xml,
   DateTime2,
   DateTimeOffset,
}

impl DbType {
   /// The type implied by a value's runtime type. `None` for null.
   pub fn infer(value: &Value) -> Option<DbType> {
      let inferred = match value {
         Value::Null => return None,
         Value::Bool(_) => DbType::Boolean,
         Value::I64(_) => DbType::Int64,
         Value::U64(_) => DbType::UInt64,
         Value::F64(_) => DbType::Double,
         Value::Text(_) => DbType::String,
         Value::Bytes(_) => DbType::Binary,
         Value::DateTime(_) => DbType::DateTime,
         Value::Decimal(_) => DbType::Decimal,
         Value::Guid(_) => DbType::Guid,
      };
      Some(inferred)
   }

   /// SQL type name used to look up bind callbacks. Empty for `Object`.
   pub fn type_name(self) -> &'static str {
      match self {
         DbType::AnsiString => "VARCHAR",
         DbType::Binary => "BLOB",
         DbType::Byte => "TINYINT",
         DbType::Boolean => "BIT",
         DbType::Currency => "MONEY",
         DbType::Date => "DATE",
         DbType::DateTime => "DATETIME",
         DbType::Decimal => "DECIMAL",
         DbType::Double => "DOUBLE",
         DbType::Guid => "UNIQUEIDENTIFIER",
         DbType::Int16 => "SMALLINT",
         DbType::Int32 => "INT",
         DbType::Int64 => "INTEGER",
         DbType::Object => "",
         DbType::SByte => "TINYSINT",
         DbType::Single => "REAL",
         DbType::String => "TEXT",
         DbType::Time => "TIME",
         DbType::UInt16 => "SMALLUINT",
         DbType::UInt32 => "UINT",
         DbType::UInt64 => "UNSIGNEDINTEGER",
         DbType::VarNumeric => "NUMERIC",
         DbType::AnsiStringFixedLength => "CHAR",
         DbType::StringFixedLength => "NCHAR",
         DbType::Xml => "XML",
         DbType::DateTime2 => "DATETIME2",
         DbType::DateTimeOffset => "DATETIMEOFFSET",
      }
   }

   pub fn is_date_time(self) -> bool {
      matches!(
         self,
         DbType::Date | DbType::Time | DbType::DateTime | DbType::DateTime2 | DbType::DateTimeOffset
      )
   }

   pub fn is_text(self) -> bool {
      matches!(
         self,
         DbType::String
            | DbType::AnsiString
            | DbType::StringFixedLength
            | DbType::AnsiStringFixedLength
            | DbType::Xml
      )
   }
}
