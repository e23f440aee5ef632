//! SQL parsing.

use sqlguard_core::SqlDialectKind;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    ClickHouseDialect, Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect,
};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::fmt::Display;

use crate::error::GuardError;

/// Maximum length of a query shape recorded in logs.
pub const QUERY_SHAPE_MAX_CHARS: usize = 160;

/// Parses SQL text for one dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlAnalyzer {
    dialect: SqlDialectKind,
}

impl SqlAnalyzer {
    /// Create a new SQL analyzer.
    pub fn new(dialect: SqlDialectKind) -> Self {
        Self { dialect }
    }

    pub fn dialect_kind(&self) -> SqlDialectKind {
        self.dialect
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.dialect {
            SqlDialectKind::Generic => Box::new(GenericDialect {}),
            SqlDialectKind::PostgreSql => Box::new(PostgreSqlDialect {}),
            SqlDialectKind::ClickHouse => Box::new(ClickHouseDialect {}),
            SqlDialectKind::DuckDb => Box::new(DuckDbDialect {}),
        }
    }

    /// Parse exactly one statement.
    ///
    /// Statement separators are counted on the token stream first, so a
    /// `;` inside a string literal or a comment never splits a statement,
    /// and a second statement is rejected even when it would not parse.
    pub fn parse(&self, sql: &str) -> Result<Statement, GuardError> {
        if sql.trim().is_empty() {
            return Err(GuardError::EmptyInput);
        }

        let dialect = self.dialect();
        let tokens = Tokenizer::new(&*dialect, sql)
            .tokenize()
            .map_err(|e| GuardError::ParseError(e.to_string()))?;

        match count_statements(&tokens) {
            0 => return Err(GuardError::EmptyInput),
            1 => {}
            count => return Err(GuardError::MultipleStatements { count }),
        }

        let mut statements = Parser::parse_sql(&*dialect, sql)
            .map_err(|e| GuardError::ParseError(e.to_string()))?;

        if statements.len() > 1 {
            return Err(GuardError::MultipleStatements {
                count: statements.len(),
            });
        }
        statements.pop().ok_or(GuardError::EmptyInput)
    }

    /// Render a loggable shape of `sql`: literals masked as `?`, comments
    /// dropped, whitespace collapsed and the result truncated.
    pub fn query_shape(&self, sql: &str) -> String {
        let dialect = self.dialect();
        let Ok(tokens) = Tokenizer::new(&*dialect, sql).tokenize() else {
            return format!("<untokenizable, {} bytes>", sql.len());
        };

        let mut shape = String::new();
        let mut pending_space = false;
        for token in &tokens {
            match token {
                Token::Whitespace(_) => pending_space = true,
                Token::EOF => {}
                other => {
                    if pending_space && !shape.is_empty() {
                        shape.push(' ');
                    }
                    pending_space = false;
                    if is_literal(other) {
                        shape.push('?');
                    } else {
                        shape.push_str(&other.to_string());
                    }
                }
            }
        }

        if shape.chars().count() > QUERY_SHAPE_MAX_CHARS {
            let mut truncated: String = shape.chars().take(QUERY_SHAPE_MAX_CHARS).collect();
            truncated.push_str("...");
            truncated
        } else {
            shape
        }
    }
}

/// Number of non-empty `;`-separated segments in a token stream.
fn count_statements(tokens: &[Token]) -> usize {
    let mut count = 0;
    let mut in_statement = false;
    for token in tokens {
        match token {
            Token::SemiColon => in_statement = false,
            Token::Whitespace(_) | Token::EOF => {}
            _ => {
                if !in_statement {
                    in_statement = true;
                    count += 1;
                }
            }
        }
    }
    count
}

fn is_literal(token: &Token) -> bool {
    matches!(
        token,
        Token::Number(..)
            | Token::SingleQuotedString(_)
            | Token::DoubleQuotedString(_)
            | Token::NationalStringLiteral(_)
            | Token::EscapedStringLiteral(_)
            | Token::HexStringLiteral(_)
            | Token::DollarQuotedString(_)
    )
}

/// Leading keyword of a rendered statement or query body, e.g. `INSERT`.
pub(crate) fn statement_keyword(node: &impl Display) -> String {
    node.to_string()
        .split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
