//! Tenancy configuration for the shared analytical datastore.
//!
//! Every allowed table carries an owning-tenant column. Most tables use the
//! same column name; individual tables may override it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{ConfigError, is_plain_identifier};

/// Configuration for tenant isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Default column name for tenant isolation.
    /// Used when not overridden per-table.
    #[serde(default = "default_tenant_column")]
    pub default_column: String,

    /// Per-table tenant column configuration.
    #[serde(default)]
    pub tables: BTreeMap<String, TableTenancyConfig>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            default_column: default_tenant_column(),
            tables: BTreeMap::new(),
        }
    }
}

/// Per-table tenancy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTenancyConfig {
    /// The column name used for tenant isolation in this table.
    #[serde(default)]
    pub tenant_column: Option<String>,

    /// Column name alias (for compatibility).
    #[serde(default)]
    pub column: Option<String>,
}

impl TableTenancyConfig {
    /// Get the effective tenant column name.
    pub fn get_column(&self) -> Option<&str> {
        self.tenant_column.as_deref().or(self.column.as_deref())
    }
}

impl TenancyConfig {
    /// Load tenancy configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse tenancy configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the tenant column for a given table (case-insensitive).
    pub fn tenant_column(&self, table_name: &str) -> &str {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table_name))
            .and_then(|(_, table)| table.get_column())
            .unwrap_or(&self.default_column)
    }

    /// Column names end up as identifiers in rewritten SQL, so they must be
    /// plain identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_plain_identifier(&self.default_column) {
            return Err(ConfigError::Config(format!(
                "tenant column '{}' is not a plain identifier",
                self.default_column
            )));
        }

        for (table, config) in &self.tables {
            if !is_plain_identifier(table) {
                return Err(ConfigError::Config(format!(
                    "tenancy table '{table}' is not a plain identifier"
                )));
            }
            if let Some(column) = config.get_column() {
                if !is_plain_identifier(column) {
                    return Err(ConfigError::Config(format!(
                        "tenant column '{column}' for table '{table}' is not a plain identifier"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_tenant_column() -> String {
    "tenant_id".to_string()
}
