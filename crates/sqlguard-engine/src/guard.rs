//! The guard pipeline: parse, validate, resolve, enforce, rewrite, serialize.

use serde::{Deserialize, Serialize};
use sqlguard_core::{AllowedTables, SqlGuardConfig, TenancyConfig};
use sqlparser::ast::Statement;

use crate::allowlist::enforce_allow_list;
use crate::error::GuardError;
use crate::injector::TenantFilterInjector;
use crate::limit::enforce_row_cap;
use crate::parser::{SqlAnalyzer, statement_keyword};
use crate::resolver::resolve_tables;
use crate::validator::validate_shape;

/// Default row cap when neither configuration nor caller provides one.
pub const DEFAULT_MAX_ROWS: u64 = 100;

/// One guard invocation.
#[derive(Debug, Clone, Copy)]
pub struct GuardRequest<'a> {
    /// Exactly one SQL statement.
    pub sql: &'a str,
    /// Tenant the caller is authorized to see.
    pub expected_tenant_id: &'a str,
    /// Per-call row cap; `None` uses the configured default.
    pub max_rows: Option<u64>,
}

impl<'a> GuardRequest<'a> {
    pub fn new(sql: &'a str, expected_tenant_id: &'a str) -> Self {
        Self {
            sql,
            expected_tenant_id,
            max_rows: None,
        }
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Options for the [`guard`] convenience function.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    pub expected_tenant_id: String,
    pub max_rows: u64,
    pub allowed_tables: AllowedTables,
}

impl GuardOptions {
    pub fn new(expected_tenant_id: impl Into<String>) -> Self {
        Self {
            expected_tenant_id: expected_tenant_id.into(),
            max_rows: DEFAULT_MAX_ROWS,
            allowed_tables: AllowedTables::default(),
        }
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_allowed_tables(mut self, allowed_tables: AllowedTables) -> Self {
        self.allowed_tables = allowed_tables;
        self
    }
}

/// Guarded SQL plus what the guard did to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardResult {
    /// The rewritten statement, safe to hand to an executor.
    pub sql: String,
    /// Whether at least one tenant predicate was added.
    pub tenant_filter_injected: bool,
    /// The LIMIT written into `sql`.
    pub row_limit_applied: u64,
    /// Distinct base tables, in first-seen order.
    pub tables_used: Vec<String>,
}

/// A guard result together with the predicates that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardExplanation {
    #[serde(flatten)]
    pub result: GuardResult,
    /// The predicates that were added, rendered as SQL.
    pub predicates_added: Vec<String>,
}

/// Validates and rewrites untrusted SQL before execution.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of threads concurrently.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    analyzer: SqlAnalyzer,
    allowed_tables: AllowedTables,
    tenancy: TenancyConfig,
    default_max_rows: u64,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self {
            analyzer: SqlAnalyzer::default(),
            allowed_tables: AllowedTables::default(),
            tenancy: TenancyConfig::default(),
            default_max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl SqlGuard {
    /// Create a guard from loaded configuration.
    pub fn new(config: &SqlGuardConfig) -> Self {
        Self {
            analyzer: SqlAnalyzer::new(config.dialect),
            allowed_tables: config.allowed_tables.clone(),
            tenancy: config.tenancy.clone(),
            default_max_rows: config.guardrails.max_rows_per_query,
        }
    }

    /// Replace the table registry.
    pub fn with_allowed_tables(mut self, allowed_tables: AllowedTables) -> Self {
        self.allowed_tables = allowed_tables;
        self
    }

    /// Replace the tenancy configuration.
    pub fn with_tenancy(mut self, tenancy: TenancyConfig) -> Self {
        self.tenancy = tenancy;
        self
    }

    pub fn analyzer(&self) -> &SqlAnalyzer {
        &self.analyzer
    }

    pub fn allowed_tables(&self) -> &AllowedTables {
        &self.allowed_tables
    }

    /// Validate and rewrite `request.sql`.
    ///
    /// On success the returned SQL is read-only, touches only allowed tables,
    /// carries a tenant predicate for every base table reference and has a
    /// LIMIT no larger than the effective row cap.
    pub fn guard(&self, request: &GuardRequest<'_>) -> Result<GuardResult, GuardError> {
        self.explain(request).map(|explanation| explanation.result)
    }

    /// Like [`SqlGuard::guard`], also reporting the predicates that were added.
    pub fn explain(&self, request: &GuardRequest<'_>) -> Result<GuardExplanation, GuardError> {
        match self.run(request) {
            Ok(explanation) => {
                tracing::debug!(
                    tables = ?explanation.result.tables_used,
                    tenant_filter_injected = explanation.result.tenant_filter_injected,
                    row_limit = explanation.result.row_limit_applied,
                    "Query accepted by guard"
                );
                Ok(explanation)
            }
            Err(err) => {
                tracing::warn!(
                    kind = err.kind(),
                    offending = err.offending().unwrap_or_default(),
                    error = %err,
                    shape = %self.analyzer.query_shape(request.sql),
                    "Query rejected by guard"
                );
                Err(err)
            }
        }
    }

    fn run(&self, request: &GuardRequest<'_>) -> Result<GuardExplanation, GuardError> {
        validate_tenant_id(request.expected_tenant_id)?;

        let mut statement = self.analyzer.parse(request.sql)?;
        validate_shape(&statement)?;

        let references = resolve_tables(&statement)?;
        let tables_used = enforce_allow_list(&references, &self.allowed_tables)?;

        let predicates_added =
            TenantFilterInjector::new(&self.tenancy, request.expected_tenant_id)
                .inject(&mut statement);

        // Last mutation before serialization.
        let max_rows = request.max_rows.unwrap_or(self.default_max_rows);
        let row_limit_applied = match &mut statement {
            Statement::Query(query) => enforce_row_cap(query, max_rows),
            other => {
                return Err(GuardError::disallowed_statement(statement_keyword(&*other)));
            }
        };

        Ok(GuardExplanation {
            result: GuardResult {
                sql: statement.to_string(),
                tenant_filter_injected: !predicates_added.is_empty(),
                row_limit_applied,
                tables_used,
            },
            predicates_added,
        })
    }
}

/// Validate and rewrite `sql` with the default dialect and tenancy layout.
pub fn guard(sql: &str, options: &GuardOptions) -> Result<GuardResult, GuardError> {
    SqlGuard::default()
        .with_allowed_tables(options.allowed_tables.clone())
        .guard(&GuardRequest {
            sql,
            expected_tenant_id: &options.expected_tenant_id,
            max_rows: Some(options.max_rows),
        })
}

/// Some engines read a backslash inside a string literal as an escape, so
/// the tenant id is limited to characters every dialect renders verbatim.
fn validate_tenant_id(tenant_id: &str) -> Result<(), GuardError> {
    if tenant_id.trim().is_empty()
        || tenant_id.chars().any(|c| c.is_control() || c == '\\')
    {
        return Err(GuardError::InvalidTenantId);
    }
    Ok(())
}
