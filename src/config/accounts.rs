use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Azure storage account names: 3-24 lowercase letters and digits.
static ACCOUNT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{3,24}$").expect("valid account name regex"));

/// Azure table names: a letter, then 2-62 letters or digits.
static TABLE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{2,62}$").expect("valid table name regex"));

/// One storage account and the tables to purge in it.
///
/// ```toml
/// [[storage_accounts]]
/// name = "prodlogs"
/// key = "${PRODLOGS_KEY}"
/// table_names = ["Alerts", "Heartbeats"]
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageAccountConfig {
    /// Account name.
    pub name: String,

    /// Base64 access key. Normally supplied through `${VAR}` expansion.
    pub key: String,

    /// Tables purged in configuration order.
    pub table_names: Vec<String>,

    /// Table service endpoint override (emulators, sovereign clouds).
    /// Default: `https://{name}.table.core.windows.net`
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for StorageAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccountConfig")
            .field("name", &self.name)
            .field("key", &"****")
            .field("table_names", &self.table_names)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl StorageAccountConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage account name cannot be empty".into(),
            ));
        }
        if self.key.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "storage account '{}' has an empty key",
                self.name
            )));
        }
        if self.table_names.is_empty() {
            return Err(ConfigError::Validation(format!(
                "storage account '{}' lists no table_names",
                self.name
            )));
        }
        if !ACCOUNT_NAME_REGEX.is_match(&self.name) {
            return Err(ConfigError::Validation(format!(
                "storage account name {:?} must be 3-24 lowercase letters or digits",
                self.name
            )));
        }
        if let Some(table) = self
            .table_names
            .iter()
            .find(|t| !TABLE_NAME_REGEX.is_match(t))
        {
            return Err(ConfigError::Validation(format!(
                "storage account '{}' has an invalid table name {table:?}: \
                 expected a letter followed by 2-62 letters or digits",
                self.name
            )));
        }
        // Table names are case-insensitive remotely and in the staging database
        let mut seen = HashSet::new();
        if let Some(table) = self
            .table_names
            .iter()
            .find(|t| !seen.insert(t.to_ascii_lowercase()))
        {
            return Err(ConfigError::Validation(format!(
                "storage account '{}' lists table {table:?} more than once",
                self.name
            )));
        }
        if let Some(endpoint) = &self.endpoint
            && url::Url::parse(endpoint).is_err()
        {
            return Err(ConfigError::Validation(format!(
                "storage account '{}' has an invalid endpoint: {endpoint}",
                self.name
            )));
        }
        Ok(())
    }
}
