//! Error types for the guard engine.

use thiserror::Error;

/// Generic message callers show to end users for any guard failure.
pub const PUBLIC_ERROR_MESSAGE: &str = "query validation failed";

/// Errors that abort a guard invocation. Every variant is terminal for the
/// call and no SQL is produced alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The SQL text is empty, whitespace or comments only.
    #[error("empty SQL input")]
    EmptyInput,

    /// The tenant id cannot be rendered safely as a string literal.
    #[error("tenant id is empty or contains disallowed characters")]
    InvalidTenantId,

    /// SQL parsing failed.
    #[error("failed to parse SQL: {0}")]
    ParseError(String),

    /// More than one statement was supplied.
    #[error("expected exactly one statement, found {count}")]
    MultipleStatements { count: usize },

    /// The statement is not a read-only SELECT.
    #[error("statement not allowed: {statement}")]
    DisallowedStatement { statement: String },

    /// A referenced table is outside the allow-list.
    #[error("access to table {table} is not allowed")]
    DisallowedTable { table: String },
}

impl GuardError {
    /// Stable label for logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::InvalidTenantId => "invalid_tenant_id",
            Self::ParseError(_) => "parse_error",
            Self::MultipleStatements { .. } => "multiple_statements",
            Self::DisallowedStatement { .. } => "disallowed_statement",
            Self::DisallowedTable { .. } => "disallowed_table",
        }
    }

    /// The identifier that caused the rejection, if there is one.
    pub fn offending(&self) -> Option<&str> {
        match self {
            Self::DisallowedStatement { statement } => Some(statement),
            Self::DisallowedTable { table } => Some(table),
            _ => None,
        }
    }

    /// The only text that may be shown to an untrusted end user.
    pub fn public_message(&self) -> &'static str {
        PUBLIC_ERROR_MESSAGE
    }

    pub(crate) fn disallowed_statement(statement: impl Into<String>) -> Self {
        Self::DisallowedStatement {
            statement: statement.into(),
        }
    }

    pub(crate) fn disallowed_table(table: impl Into<String>) -> Self {
        Self::DisallowedTable {
            table: table.into(),
        }
    }
}
