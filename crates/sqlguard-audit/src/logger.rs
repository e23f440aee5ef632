//! Audit logger implementation.
//!
//! Provides the main `AuditLogger` type with helper methods for recording
//! guard outcomes.

use chrono::{DateTime, Utc};
use sqlguard_core::AuditConfig;
use sqlguard_engine::{GuardError, GuardResult};
use std::sync::Arc;

use crate::error::AuditError;
use crate::event::{AuditEventType, GuardAuditEvent};
use crate::storage::{AuditStorage, NullStorage, create_storage};

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Filter by tenant ID.
    pub tenant_id: Option<String>,
    /// Filter by event type.
    pub event_type: Option<AuditEventType>,
    /// Filter by error kind.
    pub error_kind: Option<String>,
    /// Start time (inclusive).
    pub start_time: Option<DateTime<Utc>>,
    /// End time (inclusive).
    pub end_time: Option<DateTime<Utc>>,
    /// Number of matching events to skip.
    pub offset: Option<usize>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Whether `event` passes every set criterion.
    pub fn matches(&self, event: &GuardAuditEvent) -> bool {
        if let Some(ref tenant) = self.tenant_id {
            if &event.tenant_id != tenant {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(ref kind) = self.error_kind {
            if event.error_kind.as_ref() != Some(kind) {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if event.occurred_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.occurred_at > end {
                return false;
            }
        }
        true
    }

    /// Keep matching events, then apply offset and limit.
    pub fn apply(
        &self,
        events: impl IntoIterator<Item = GuardAuditEvent>,
    ) -> Vec<GuardAuditEvent> {
        events
            .into_iter()
            .filter(|event| self.matches(event))
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// The main audit logger.
///
/// Rejections are always recorded while the logger is enabled; acceptances
/// only when `log_accepted` is set.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage: Arc<dyn AuditStorage> = Arc::from(create_storage(&config)?);
        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage),
        }
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Log an audit event.
    pub fn log(&self, event: GuardAuditEvent) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            kind = event.error_kind.as_deref().unwrap_or_default(),
            "Audit event"
        );

        self.storage.store(&event)
    }

    /// Record an accepted query. A no-op unless `log_accepted` is set.
    pub fn record_accepted(
        &self,
        tenant_id: &str,
        query_shape: &str,
        result: &GuardResult,
    ) -> Result<(), AuditError> {
        if !self.config.log_accepted {
            return Ok(());
        }
        self.log(GuardAuditEvent::accepted(tenant_id, query_shape, result))
    }

    /// Record a rejected query.
    pub fn record_rejected(
        &self,
        tenant_id: &str,
        query_shape: &str,
        error: &GuardError,
    ) -> Result<(), AuditError> {
        self.log(GuardAuditEvent::rejected(tenant_id, query_shape, error))
    }

    /// Query stored audit events.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<GuardAuditEvent>, AuditError> {
        self.storage.query(filter)
    }
}
