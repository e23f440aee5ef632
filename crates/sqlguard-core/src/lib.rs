// Configuration types shared across all SQL Guard crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    AllowedTables, AuditConfig, ConfigError, GuardrailsConfig, SqlDialectKind, SqlGuardConfig,
    StorageBackend, TableTenancyConfig, TenancyConfig,
};
