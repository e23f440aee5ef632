//! Statement-shape validation: only read-only queries get past this point.

use sqlparser::ast::{LimitClause, Query, SetExpr, Statement, Visit, Visitor};
use std::ops::ControlFlow;

use crate::error::GuardError;
use crate::parser::statement_keyword;

/// Accept a `SELECT` (optionally preceded by `WITH`) and nothing else.
///
/// The whole tree is checked, not just the top level: a data-modifying CTE
/// body, `SELECT ... INTO`, row locks, `SETTINGS` overrides and pipe
/// operators are rejected wherever they appear. A top-level `LIMIT n BY`
/// caps rows per group rather than in total, so it is rejected too.
pub fn validate_shape(statement: &Statement) -> Result<(), GuardError> {
    let Statement::Query(query) = statement else {
        return Err(GuardError::disallowed_statement(statement_keyword(
            statement,
        )));
    };

    if !is_select_body(&query.body) {
        return Err(GuardError::disallowed_statement(statement_keyword(
            &query.body,
        )));
    }

    if let Some(LimitClause::LimitOffset { limit_by, .. }) = &query.limit_clause {
        if !limit_by.is_empty() {
            return Err(GuardError::disallowed_statement("LIMIT BY"));
        }
    }

    match query.visit(&mut ReadOnlyChecker) {
        ControlFlow::Break(err) => Err(err),
        ControlFlow::Continue(()) => Ok(()),
    }
}

/// The terminal body of the top-level query must be a select, a set
/// operation over selects, or a parenthesized query of the same kind.
fn is_select_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(_) => true,
        SetExpr::Query(query) => is_select_body(&query.body),
        SetExpr::SetOperation { left, right, .. } => is_select_body(left) && is_select_body(right),
        _ => false,
    }
}

struct ReadOnlyChecker;

impl Visitor for ReadOnlyChecker {
    type Break = GuardError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if !query.locks.is_empty() {
            return ControlFlow::Break(GuardError::disallowed_statement("SELECT FOR UPDATE"));
        }
        if query.settings.is_some() {
            return ControlFlow::Break(GuardError::disallowed_statement("SETTINGS"));
        }
        // Rendered after LIMIT and outside every select block.
        if !query.pipe_operators.is_empty() {
            return ControlFlow::Break(GuardError::disallowed_statement("|>"));
        }
        check_set_expr(&query.body)
    }

    // Statements only occur below a query as data-modifying bodies.
    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        ControlFlow::Break(GuardError::disallowed_statement(statement_keyword(
            statement,
        )))
    }
}

fn check_set_expr(body: &SetExpr) -> ControlFlow<GuardError> {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                ControlFlow::Break(GuardError::disallowed_statement("SELECT INTO"))
            } else {
                ControlFlow::Continue(())
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        // Visited on its own by `pre_visit_query`.
        SetExpr::Query(_) | SetExpr::Values(_) => ControlFlow::Continue(()),
        other => ControlFlow::Break(GuardError::disallowed_statement(statement_keyword(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlAnalyzer;
    use sqlguard_core::SqlDialectKind;

    fn validate(sql: &str) -> Result<(), GuardError> {
        validate_with(SqlDialectKind::Generic, sql)
    }

    fn validate_with(dialect: SqlDialectKind, sql: &str) -> Result<(), GuardError> {
        let stmt = SqlAnalyzer::new(dialect).parse(sql).unwrap();
        validate_shape(&stmt)
    }

    fn rejected_as(sql: &str) -> String {
        match validate(sql) {
            Err(GuardError::DisallowedStatement { statement }) => statement,
            other => panic!("expected DisallowedStatement for {sql}, got {other:?}"),
        }
    }

    #[test]
    fn test_select_accepted() {
        assert!(validate("SELECT * FROM projects").is_ok());
        assert!(validate("SELECT 1").is_ok());
        assert!(validate("WITH p AS (SELECT * FROM projects) SELECT * FROM p").is_ok());
        assert!(validate("SELECT id FROM projects UNION ALL SELECT id FROM companies").is_ok());
        assert!(validate("(SELECT id FROM projects)").is_ok());
    }

    #[test]
    fn test_writes_rejected() {
        assert_eq!(rejected_as("INSERT INTO projects (id) VALUES (1)"), "INSERT");
        assert_eq!(rejected_as("UPDATE projects SET name = 'x'"), "UPDATE");
        assert_eq!(rejected_as("DELETE FROM projects"), "DELETE");
        assert_eq!(rejected_as("DROP TABLE projects"), "DROP");
        assert_eq!(rejected_as("ALTER TABLE projects ADD COLUMN x INT"), "ALTER");
        assert_eq!(rejected_as("CREATE TABLE x (id INT)"), "CREATE");
        assert_eq!(rejected_as("TRUNCATE TABLE projects"), "TRUNCATE");
        assert_eq!(rejected_as("GRANT SELECT ON projects TO bob"), "GRANT");
    }

    #[test]
    fn test_top_level_values_rejected() {
        assert_eq!(rejected_as("VALUES (1), (2)"), "VALUES");
    }

    #[test]
    fn test_select_into_rejected() {
        assert_eq!(rejected_as("SELECT * INTO backup FROM projects"), "SELECT INTO");
    }

    #[test]
    fn test_row_locks_rejected() {
        let err = validate_with(SqlDialectKind::PostgreSql, "SELECT * FROM projects FOR UPDATE")
            .unwrap_err();
        assert_eq!(err, GuardError::disallowed_statement("SELECT FOR UPDATE"));
    }

    #[test]
    fn test_data_modifying_cte_rejected() {
        for sql in [
            "WITH gone AS (DELETE FROM projects RETURNING *) SELECT * FROM gone",
            "WITH added AS (INSERT INTO projects (id) VALUES (1) RETURNING id) SELECT * FROM added",
        ] {
            // Either the grammar refuses it or the shape check does; it never passes.
            let outcome = SqlAnalyzer::new(SqlDialectKind::PostgreSql)
                .parse(sql)
                .and_then(|stmt| validate_shape(&stmt));
            assert!(
                matches!(
                    outcome,
                    Err(GuardError::DisallowedStatement { .. } | GuardError::ParseError(_))
                ),
                "{sql} was not rejected: {outcome:?}"
            );
        }
    }

    #[test]
    fn test_clickhouse_settings_rejected() {
        let err = validate_with(
            SqlDialectKind::ClickHouse,
            "SELECT * FROM projects SETTINGS max_result_rows = 0",
        )
        .unwrap_err();
        assert_eq!(err, GuardError::disallowed_statement("SETTINGS"));
    }

    #[test]
    fn test_values_inside_subquery_accepted() {
        assert!(validate("SELECT * FROM (VALUES (1), (2)) AS v (n)").is_ok());
    }

    #[test]
    fn test_top_level_limit_by_rejected() {
        for dialect in [SqlDialectKind::Generic, SqlDialectKind::ClickHouse] {
            let err = validate_with(dialect, "SELECT * FROM projects LIMIT 1 BY id").unwrap_err();
            assert_eq!(err, GuardError::disallowed_statement("LIMIT BY"));
        }
    }

    #[test]
    fn test_nested_limit_by_accepted() {
        // The outer query still receives a total LIMIT.
        let sql = "SELECT * FROM (SELECT * FROM projects LIMIT 1 BY company_id) AS p";
        assert!(validate_with(SqlDialectKind::ClickHouse, sql).is_ok());
    }

    #[test]
    fn test_pipe_operators_rejected() {
        for sql in [
            "SELECT * FROM projects |> JOIN companies USING (id)",
            "SELECT * FROM projects |> WHERE id > 3",
            "SELECT * FROM (SELECT * FROM projects |> LIMIT 5000) AS p",
        ] {
            assert_eq!(rejected_as(sql), "|>", "{sql}");
        }
    }
}
