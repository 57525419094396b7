//! # sqlite-param-binder
//!
//! Maps caller-supplied parameters onto the placeholders of prepared
//! statements and binds them through the native statement interface.
//!
//! - **[`ParameterDirectory`]**: the slot table of one statement, built from
//!   the native parameter count and names
//! - **[`coerce`]**: picks exactly one [`BindOp`] for a value, its declared
//!   [`DbType`] and the connection's [`BindPolicy`]
//! - **[`StatementBinder`]**: runs a binding pass, consulting the
//!   [`TypeCallbackRegistry`] before built-in coercion
//! - **[`StatementBatch`]**: all statements of one command text, with
//!   batch-wide parameter resolution
//!
//! ```no_run
//! use sqlite_native::SqliteEngine;
//! use sqlite_param_binder::{BindSettings, Parameter, ParameterCollection, StatementBatch};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = SqliteEngine::open_in_memory()?;
//! let mut batch = StatementBatch::prepare(&mut engine, "SELECT :id, ?")?;
//!
//! let mut params = ParameterCollection::new();
//! params.add(Parameter::new("id", 7i64));
//! params.add(Parameter::unnamed("text"));
//!
//! batch.resolve_parameters(&params)?.require_all_matched()?;
//! batch.bind_all(&params, &BindSettings::default())?;
//! # Ok(())
//! # }
//! ```

mod binder;
mod callbacks;
mod coerce;
mod db_type;
mod directory;
mod error;
mod parameter;
mod policy;
mod statement;
mod value;

pub use binder::{BindSettings, StatementBinder};
pub use callbacks::{BindValueCallback, CustomBind, TypeCallbackRegistry, resolve_type_name};
pub use coerce::{BindOp, coerce};
pub use db_type::DbType;
pub use directory::{NAME_PREFIXES, ParameterDirectory, ParameterSlot, SlotKind};
pub use error::{Error, Result};
pub use parameter::{MappingToken, Parameter, ParameterCollection};
pub use policy::{BindPolicy, TextCulture};
pub use statement::{ResolveReport, Statement, StatementBatch};
pub use value::{Decimal, ParseDecimalError, Value};
