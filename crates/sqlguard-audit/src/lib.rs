//! # sqlguard-audit
//!
//! Audit trail of guard outcomes for security monitoring.
//!
//! Every rejection is recorded; acceptances are recorded when
//! `audit.log_accepted` is set. Events carry the tenant id, the error kind
//! and offending identifier, and a masked query shape. The submitted SQL
//! itself is never stored.
//!
//! ## Backends
//!
//! | Backend | Output |
//! |---------|--------|
//! | `console` | One JSON object per line on stderr |
//! | `file` | JSON Lines appended to `audit.file_path` |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sqlguard_audit::AuditLogger;
//! use sqlguard_core::AuditConfig;
//! use sqlguard_engine::{GuardRequest, SqlGuard};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = AuditLogger::new(AuditConfig::default())?;
//! let guard = SqlGuard::default();
//!
//! let sql = "SELECT * FROM users";
//! if let Err(err) = guard.guard(&GuardRequest::new(sql, "client_a")) {
//!     logger.record_rejected("client_a", &guard.analyzer().query_shape(sql), &err)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod logger;
pub mod storage;

pub use error::AuditError;
pub use event::{AuditEventType, GuardAuditEvent};
pub use logger::{AuditFilter, AuditLogger};
pub use storage::{
    AuditStorage, ConsoleStorage, FileStorage, MemoryStorage, NullStorage, create_storage,
};
