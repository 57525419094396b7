//! Provider configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlite_nested_tx::TransactionPolicy;
use sqlite_param_binder::BindPolicy;

use crate::Result;

/// Configuration for a provider connection.
///
/// Every field has a default, so a configuration file only needs the
/// settings it changes.
///
/// # Examples
///
/// ```
/// use sqlite_provider::ProviderConfig;
///
/// // Use defaults
/// let config = ProviderConfig::default();
/// assert!(config.bind.binary_guid);
///
/// // Override a few settings from JSON
/// let config = ProviderConfig::from_json_str(
///    r#"{
///       "bind": { "binary_guid": false, "date_time_format": "unix_epoch" },
///       "transactions": { "strict_rollback": true }
///    }"#,
/// )
/// .unwrap();
/// assert!(!config.bind.binary_guid);
/// assert!(config.transactions.strict_rollback);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
   /// Parameter coercion and binding flags.
   pub bind: BindPolicy,

   /// Nested transaction behaviour.
   pub transactions: TransactionPolicy,
}

impl ProviderConfig {
   pub fn new() -> Self {
      Self::default()
   }

   /// Parse a JSON configuration document.
   pub fn from_json_str(json: &str) -> Result<Self> {
      Ok(serde_json::from_str(json)?)
   }

   /// Read and parse a JSON configuration file.
   pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
      let text = std::fs::read_to_string(path)?;
      Self::from_json_str(&text)
   }

   pub fn with_bind_policy(mut self, bind: BindPolicy) -> Self {
      self.bind = bind;
      self
   }

   pub fn with_transaction_policy(mut self, transactions: TransactionPolicy) -> Self {
      self.transactions = transactions;
      self
   }
}
