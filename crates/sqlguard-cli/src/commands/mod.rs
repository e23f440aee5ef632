//! CLI command implementations for the SQL Guard.

pub mod check;
pub mod guard;

/// Configuration file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "sqlguard.yaml";
