//! Audit storage backends.

use sqlguard_core::{AuditConfig, StorageBackend};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::AuditError;
use crate::event::GuardAuditEvent;
use crate::logger::AuditFilter;

/// File written by the file backend when no path is configured.
pub const DEFAULT_AUDIT_FILE: &str = "audit.jsonl";

/// Trait for audit storage backends.
pub trait AuditStorage: Send + Sync {
    /// Store an audit event.
    fn store(&self, event: &GuardAuditEvent) -> Result<(), AuditError>;

    /// Query stored events. Write-only backends return nothing.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError>;
}

/// Create a storage backend based on configuration.
pub fn create_storage(config: &AuditConfig) -> Result<Box<dyn AuditStorage>, AuditError> {
    if !config.enabled {
        return Ok(Box::new(NullStorage));
    }
    match config.backend {
        StorageBackend::Console => Ok(Box::new(ConsoleStorage)),
        StorageBackend::File => {
            let path = config
                .file_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_FILE));
            Ok(Box::new(FileStorage::new(path)?))
        }
    }
}

/// Console storage (one JSON line per event on stderr).
pub struct ConsoleStorage;

impl AuditStorage for ConsoleStorage {
    fn store(&self, event: &GuardAuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;
        eprintln!("{}", json);
        Ok(())
    }

    fn query(&self, _filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError> {
        Ok(vec![])
    }
}

/// File storage (appends JSON Lines to a file).
pub struct FileStorage {
    path: PathBuf,
    // Serializes appends from concurrent callers.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a file storage, creating the parent directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuditError::InitializationFailed(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStorage for FileStorage {
    fn store(&self, event: &GuardAuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| AuditError::StorageError(format!("Failed to acquire write lock: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<GuardAuditEvent>(&line)?);
        }
        Ok(filter.apply(events))
    }
}

/// In-memory storage, for tests and embedding callers that inspect events.
#[derive(Default)]
pub struct MemoryStorage {
    events: RwLock<Vec<GuardAuditEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStorage for MemoryStorage {
    fn store(&self, event: &GuardAuditEvent) -> Result<(), AuditError> {
        self.events
            .write()
            .map_err(|e| AuditError::StorageError(format!("Failed to acquire write lock: {}", e)))?
            .push(event.clone());
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError> {
        let events = self
            .events
            .read()
            .map_err(|e| AuditError::StorageError(format!("Failed to acquire read lock: {}", e)))?;
        Ok(filter.apply(events.iter().cloned()))
    }
}

/// Null storage (discards all events).
pub struct NullStorage;

impl AuditStorage for NullStorage {
    fn store(&self, _event: &GuardAuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    fn query(&self, _filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError> {
        Ok(vec![])
    }
}
