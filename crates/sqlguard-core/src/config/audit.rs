//! Audit logging configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for audit logging of guard outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Storage backend type.
    #[serde(default)]
    pub backend: StorageBackend,

    /// File path (for file backend).
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Whether accepted queries are recorded too. Rejections are always recorded.
    #[serde(default)]
    pub log_accepted: bool,
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Log to stderr.
    #[default]
    Console,
    /// Append JSON lines to a file.
    File,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: StorageBackend::default(),
            file_path: None,
            log_accepted: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}
