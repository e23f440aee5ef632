//! Configuration types for the SQL Guard.
//!
//! Configuration is loaded from a single YAML file (`sqlguard.yaml`) and is
//! resolved once at startup. After loading it is treated as immutable
//! process-wide state: every guard invocation reads it, nothing writes it.
//!
//! # Sections
//!
//! - **dialect**: SQL dialect used for tokenizing and parsing
//! - **allowed_tables**: registry of logical tables queries may touch
//! - **tenancy**: tenant column names per table
//! - **guardrails**: row cap applied to every query
//! - **audit**: where guard outcomes are recorded

pub mod allowlist;
pub mod audit;
pub mod tenancy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use allowlist::AllowedTables;
pub use audit::{AuditConfig, StorageBackend};
pub use tenancy::{TableTenancyConfig, TenancyConfig};

/// Complete SQL Guard configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlGuardConfig {
    /// SQL dialect of the downstream executor.
    #[serde(default)]
    pub dialect: SqlDialectKind,

    /// Logical tables a query may reference.
    #[serde(default)]
    pub allowed_tables: AllowedTables,

    /// Tenant isolation configuration.
    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Global guardrails.
    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// SQL dialects the guard knows how to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialectKind {
    /// ANSI-ish dialect accepting the broadest syntax.
    #[default]
    Generic,
    /// PostgreSQL.
    #[serde(alias = "postgres")]
    PostgreSql,
    /// Columnar analytics engine used in production.
    ClickHouse,
    /// Embedded analytical database used in development and tests.
    DuckDb,
}

impl std::fmt::Display for SqlDialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::PostgreSql => write!(f, "postgresql"),
            Self::ClickHouse => write!(f, "clickhouse"),
            Self::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Global guardrails configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Maximum rows any single query may return, unless a caller passes a
    /// per-call override.
    #[serde(default = "default_max_rows")]
    pub max_rows_per_query: u64,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_rows_per_query: default_max_rows(),
        }
    }
}

fn default_max_rows() -> u64 {
    100
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SqlGuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content and validate it.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tenancy.validate()?;

        for table in self.tenancy.tables.keys() {
            if !self.allowed_tables.contains(table) {
                return Err(ConfigError::Config(format!(
                    "tenancy override for '{table}' does not name an allowed table"
                )));
            }
        }

        Ok(())
    }
}

/// Returns true for a bare SQL identifier: ASCII letter or underscore
/// followed by ASCII letters, digits or underscores.
pub(crate) fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
