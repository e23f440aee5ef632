//! Audit event types.
//!
//! One event per guard invocation. Events carry the masked query shape,
//! never the submitted or rewritten SQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlguard_engine::{GuardError, GuardResult};
use uuid::Uuid;

/// Outcome recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// The guard produced rewritten SQL.
    GuardAccepted,
    /// The guard refused the query.
    GuardRejected,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GuardAccepted => write!(f, "GUARD_ACCEPTED"),
            Self::GuardRejected => write!(f, "GUARD_REJECTED"),
        }
    }
}

/// An audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardAuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Event type.
    pub event_type: AuditEventType,

    /// Tenant the caller claimed.
    pub tenant_id: String,

    /// Masked shape of the submitted query.
    pub query_shape: String,

    // ===== Rejections =====
    /// Stable error label, e.g. `disallowed_table`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Table or statement keyword that caused the rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending: Option<String>,

    // ===== Acceptances =====
    /// Base tables the query reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,

    /// LIMIT written into the rewritten query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit_applied: Option<u64>,

    /// Whether tenant predicates were added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_filter_injected: Option<bool>,
}

impl GuardAuditEvent {
    /// Create a new audit event with the given type and core fields.
    pub fn new(
        event_type: AuditEventType,
        tenant_id: impl Into<String>,
        query_shape: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type,
            tenant_id: tenant_id.into(),
            query_shape: query_shape.into(),
            error_kind: None,
            offending: None,
            tables: None,
            row_limit_applied: None,
            tenant_filter_injected: None,
        }
    }

    /// Event for an accepted query.
    pub fn accepted(
        tenant_id: impl Into<String>,
        query_shape: impl Into<String>,
        result: &GuardResult,
    ) -> Self {
        Self {
            tables: Some(result.tables_used.clone()),
            row_limit_applied: Some(result.row_limit_applied),
            tenant_filter_injected: Some(result.tenant_filter_injected),
            ..Self::new(AuditEventType::GuardAccepted, tenant_id, query_shape)
        }
    }

    /// Event for a rejected query.
    pub fn rejected(
        tenant_id: impl Into<String>,
        query_shape: impl Into<String>,
        error: &GuardError,
    ) -> Self {
        Self {
            error_kind: Some(error.kind().to_string()),
            offending: error.offending().map(str::to_string),
            ..Self::new(AuditEventType::GuardRejected, tenant_id, query_shape)
        }
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] EVENT_TYPE tenant=... [kind=...] shape="..."`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} tenant={}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.tenant_id,
        );

        if let Some(ref kind) = self.error_kind {
            line.push_str(&format!(" kind={}", kind));
        }
        if let Some(ref offending) = self.offending {
            line.push_str(&format!(" offending={}", offending));
        }
        if let Some(ref tables) = self.tables {
            line.push_str(&format!(" tables=[{}]", tables.join(",")));
        }
        if let Some(limit) = self.row_limit_applied {
            line.push_str(&format!(" limit={}", limit));
        }

        line.push_str(&format!(" shape=\"{}\"", self.query_shape.replace('"', "'")));
        line
    }
}
