//! Behavioral tests for the guard as seen by a caller.
//!
//! Organized by the guarantees the guard makes:
//! - read-only: anything but a single SELECT is refused
//! - allow-list: only registered tables are reachable, wherever they appear
//! - tenant scoping: every base table reference is filtered
//! - row cap: the outer query never returns more than the cap
//! - stability: output is deterministic and guarding it again is a no-op
//! - rewritten output: re-parsed, every guarantee holds in the emitted SQL

use pretty_assertions::assert_eq;
use sqlguard_core::{
    AllowedTables, SqlDialectKind, SqlGuardConfig, TableTenancyConfig, TenancyConfig,
};
use sqlguard_engine::{
    GuardError, GuardOptions, GuardRequest, GuardResult, PUBLIC_ERROR_MESSAGE, SqlAnalyzer,
    SqlGuard, guard,
};
use sqlparser::ast::{
    BinaryOperator, Expr, LimitClause, Query, Select, SetExpr, Statement, TableFactor,
    TableWithJoins, Value, ValueWithSpan, Visit, Visitor,
};
use std::convert::Infallible;
use std::ops::ControlFlow;

const TENANT: &str = "test-org-123";

fn options() -> GuardOptions {
    GuardOptions::new(TENANT)
}

fn accept(sql: &str) -> GuardResult {
    match guard(sql, &options()) {
        Ok(result) => result,
        Err(err) => panic!("expected {sql:?} to be accepted, got {err:?}"),
    }
}

fn reject(sql: &str) -> GuardError {
    match guard(sql, &options()) {
        Ok(result) => panic!("expected {sql:?} to be rejected, got {:?}", result.sql),
        Err(err) => err,
    }
}

fn disallowed_table(table: &str) -> GuardError {
    GuardError::DisallowedTable {
        table: table.to_string(),
    }
}

// =============================================================================
// READ-ONLY
// =============================================================================

#[test]
fn test_writes_rejected() {
    for sql in [
        "INSERT INTO projects (id) VALUES (1)",
        "UPDATE projects SET name = 'x'",
        "DELETE FROM projects",
        "DROP TABLE projects",
        "CREATE TABLE evil (id INT)",
        "ALTER TABLE projects ADD COLUMN x INT",
        "TRUNCATE TABLE projects",
        "GRANT SELECT ON projects TO mallory",
    ] {
        let err = reject(sql);
        assert!(
            matches!(err, GuardError::DisallowedStatement { .. }),
            "{sql}: {err:?}"
        );
    }
}

#[test]
fn test_multiple_statements_rejected() {
    assert_eq!(
        reject("SELECT 1; DROP TABLE projects"),
        GuardError::MultipleStatements { count: 2 }
    );
    assert_eq!(
        reject("SELECT * FROM projects; SELECT * FROM companies"),
        GuardError::MultipleStatements { count: 2 }
    );
}

#[test]
fn test_trailing_semicolon_accepted() {
    assert_eq!(accept("SELECT 1;").sql, "SELECT 1 LIMIT 100");
}

#[test]
fn test_semicolon_in_literal_is_not_a_separator() {
    let result = accept("SELECT * FROM projects WHERE name = 'a; DROP TABLE projects'");
    assert!(result.sql.contains("name = 'a; DROP TABLE projects'"));
}

#[test]
fn test_empty_input_rejected() {
    assert_eq!(reject(""), GuardError::EmptyInput);
    assert_eq!(reject("   \n\t"), GuardError::EmptyInput);
    assert_eq!(reject("-- just a comment"), GuardError::EmptyInput);
    assert_eq!(reject(";"), GuardError::EmptyInput);
}

#[test]
fn test_garbage_is_parse_error() {
    assert!(matches!(reject("SELEKT * FROM projects"), GuardError::ParseError(_)));
    assert!(matches!(reject("SELECT * FROM"), GuardError::ParseError(_)));
}

#[test]
fn test_public_message_is_generic() {
    for err in [
        reject("DROP TABLE projects"),
        reject("SELECT * FROM users"),
        reject(""),
    ] {
        assert_eq!(err.public_message(), PUBLIC_ERROR_MESSAGE);
        assert!(!err.public_message().contains("users"));
    }
}

// =============================================================================
// ALLOW-LIST
// =============================================================================

#[test]
fn test_unregistered_table_rejected() {
    assert_eq!(reject("SELECT * FROM users"), disallowed_table("users"));
}

#[test]
fn test_catalog_tables_rejected() {
    assert_eq!(
        reject("SELECT * FROM system.tables"),
        disallowed_table("system.tables")
    );
    assert_eq!(
        reject("SELECT table_name FROM information_schema.tables"),
        disallowed_table("information_schema.tables")
    );
    assert_eq!(
        reject("SELECT * FROM pg_catalog.pg_user"),
        disallowed_table("pg_catalog.pg_user")
    );
}

#[test]
fn test_unregistered_table_in_join_rejected() {
    assert_eq!(
        reject("SELECT * FROM projects AS p JOIN users AS u ON p.owner_id = u.id"),
        disallowed_table("users")
    );
}

#[test]
fn test_unregistered_table_in_subquery_rejected() {
    assert_eq!(
        reject("SELECT * FROM projects WHERE owner_id IN (SELECT id FROM users)"),
        disallowed_table("users")
    );
    assert_eq!(
        reject(
            "SELECT * FROM projects \
             WHERE EXISTS (SELECT 1 FROM users WHERE users.id = projects.owner_id)"
        ),
        disallowed_table("users")
    );
    assert_eq!(
        reject("SELECT (SELECT count(*) FROM users) AS n FROM projects"),
        disallowed_table("users")
    );
}

#[test]
fn test_unregistered_table_in_derived_table_rejected() {
    assert_eq!(
        reject("SELECT * FROM (SELECT * FROM users) AS sub"),
        disallowed_table("users")
    );
}

#[test]
fn test_unregistered_table_in_union_rejected() {
    assert_eq!(
        reject("SELECT id FROM projects UNION ALL SELECT id FROM users"),
        disallowed_table("users")
    );
}

#[test]
fn test_cte_cannot_shadow_into_unregistered_table() {
    assert_eq!(
        reject("WITH projects AS (SELECT * FROM users) SELECT * FROM projects"),
        disallowed_table("users")
    );
}

#[test]
fn test_custom_allow_list() {
    let allowed = AllowedTables::new(["tasks"]).unwrap();
    let options = options().with_allowed_tables(allowed);

    let result = guard("SELECT * FROM tasks", &options).unwrap();
    assert_eq!(result.tables_used, vec!["tasks".to_string()]);
    assert_eq!(
        guard("SELECT * FROM projects", &options).unwrap_err(),
        disallowed_table("projects")
    );
}

#[test]
fn test_table_names_are_case_insensitive() {
    let result = accept("SELECT * FROM PROJECTS");
    assert_eq!(result.tables_used, vec!["projects".to_string()]);
    assert!(result.sql.contains("PROJECTS.tenant_id = 'test-org-123'"));
}

// =============================================================================
// TENANT SCOPING
// =============================================================================

#[test]
fn test_simple_select_scoped() {
    let result = accept("SELECT * FROM projects");
    assert_eq!(
        result.sql,
        "SELECT * FROM projects WHERE projects.tenant_id = 'test-org-123' LIMIT 100"
    );
    assert!(result.tenant_filter_injected);
    assert_eq!(result.tables_used, vec!["projects".to_string()]);
}

#[test]
fn test_existing_where_kept() {
    let result = accept("SELECT * FROM projects WHERE status = 'active'");
    assert_eq!(
        result.sql,
        "SELECT * FROM projects WHERE status = 'active' AND projects.tenant_id = 'test-org-123' LIMIT 100"
    );
}

#[test]
fn test_or_condition_cannot_escape_filter() {
    let result = accept("SELECT * FROM projects WHERE status = 'active' OR 1 = 1");
    assert_eq!(
        result.sql,
        "SELECT * FROM projects WHERE (status = 'active' OR 1 = 1) AND projects.tenant_id = 'test-org-123' LIMIT 100"
    );
}

#[test]
fn test_join_scopes_each_table_by_alias() {
    let result = accept(
        "SELECT p.name, c.name FROM projects AS p JOIN companies AS c ON p.company_id = c.id",
    );
    assert_eq!(
        result.sql,
        "SELECT p.name, c.name FROM projects AS p JOIN companies AS c ON p.company_id = c.id \
         WHERE p.tenant_id = 'test-org-123' AND c.tenant_id = 'test-org-123' LIMIT 100"
    );
    assert_eq!(
        result.tables_used,
        vec!["projects".to_string(), "companies".to_string()]
    );
}

#[test]
fn test_self_join_scopes_both_sides() {
    let result = accept("SELECT a.id FROM projects AS a JOIN projects AS b ON a.parent_id = b.id");
    assert!(result.sql.contains("a.tenant_id = 'test-org-123'"));
    assert!(result.sql.contains("b.tenant_id = 'test-org-123'"));
    assert_eq!(result.tables_used, vec!["projects".to_string()]);
}

#[test]
fn test_subquery_scoped() {
    let result = accept("SELECT * FROM projects WHERE company_id IN (SELECT id FROM companies)");
    assert!(
        result
            .sql
            .contains("(SELECT id FROM companies WHERE companies.tenant_id = 'test-org-123')")
    );
    assert!(result.sql.contains("projects.tenant_id = 'test-org-123'"));
}

#[test]
fn test_derived_table_scoped_inside() {
    let result = accept("SELECT * FROM (SELECT id FROM projects) AS sub");
    assert_eq!(
        result.sql,
        "SELECT * FROM (SELECT id FROM projects WHERE projects.tenant_id = 'test-org-123') AS sub LIMIT 100"
    );
}

#[test]
fn test_cte_body_scoped_and_reference_skipped() {
    let result = accept("WITH recent AS (SELECT * FROM projects) SELECT * FROM recent");
    assert_eq!(
        result.sql,
        "WITH recent AS (SELECT * FROM projects WHERE projects.tenant_id = 'test-org-123') SELECT * FROM recent LIMIT 100"
    );
    assert_eq!(result.tables_used, vec!["projects".to_string()]);
}

#[test]
fn test_cte_named_like_its_base_table() {
    let result = accept("WITH projects AS (SELECT * FROM projects) SELECT * FROM projects");
    assert_eq!(
        result.sql,
        "WITH projects AS (SELECT * FROM projects WHERE projects.tenant_id = 'test-org-123') SELECT * FROM projects LIMIT 100"
    );
}

#[test]
fn test_union_branches_scoped() {
    let result = accept("SELECT id FROM projects UNION SELECT id FROM companies");
    assert_eq!(
        result.sql,
        "SELECT id FROM projects WHERE projects.tenant_id = 'test-org-123' \
         UNION SELECT id FROM companies WHERE companies.tenant_id = 'test-org-123' LIMIT 100"
    );
}

#[test]
fn test_no_tables_no_filter() {
    let result = accept("SELECT 1");
    assert_eq!(result.sql, "SELECT 1 LIMIT 100");
    assert!(!result.tenant_filter_injected);
    assert!(result.tables_used.is_empty());
}

#[test]
fn test_tenant_literal_cannot_break_out() {
    let result = guard(
        "SELECT * FROM projects",
        &GuardOptions::new("x' OR '1'='1"),
    )
    .unwrap();
    assert_eq!(
        result.sql,
        "SELECT * FROM projects WHERE projects.tenant_id = 'x'' OR ''1''=''1' LIMIT 100"
    );
}

#[test]
fn test_per_table_tenant_column() {
    let mut tables = std::collections::BTreeMap::new();
    tables.insert(
        "companies".to_string(),
        TableTenancyConfig {
            tenant_column: Some("org_id".to_string()),
            column: None,
        },
    );
    let tenancy = TenancyConfig {
        tables,
        ..TenancyConfig::default()
    };

    let result = SqlGuard::default()
        .with_tenancy(tenancy)
        .guard(&GuardRequest::new(
            "SELECT * FROM projects AS p JOIN companies AS c ON p.company_id = c.id",
            TENANT,
        ))
        .unwrap();
    assert!(result.sql.contains("p.tenant_id = 'test-org-123'"));
    assert!(result.sql.contains("c.org_id = 'test-org-123'"));
}

// =============================================================================
// ROW CAP
// =============================================================================

#[test]
fn test_default_cap_applied() {
    let result = accept("SELECT * FROM companies");
    assert_eq!(result.row_limit_applied, 100);
    assert!(result.sql.ends_with("LIMIT 100"));
}

#[test]
fn test_large_limit_clamped() {
    let result = accept("SELECT * FROM projects LIMIT 1000");
    assert_eq!(result.row_limit_applied, 100);
    assert!(result.sql.ends_with("LIMIT 100"));
    assert!(!result.sql.contains("1000"));
}

#[test]
fn test_small_limit_kept() {
    let result = accept("SELECT * FROM projects LIMIT 50");
    assert_eq!(result.row_limit_applied, 50);
    assert!(result.sql.ends_with("LIMIT 50"));
}

#[test]
fn test_custom_cap() {
    let result = guard("SELECT * FROM projects LIMIT 50", &options().with_max_rows(10)).unwrap();
    assert_eq!(result.row_limit_applied, 10);
    assert!(result.sql.ends_with("LIMIT 10"));
}

// =============================================================================
// STABILITY
// =============================================================================

#[test]
fn test_output_is_deterministic() {
    let sql = "SELECT p.id FROM projects AS p JOIN companies AS c ON p.company_id = c.id WHERE c.name LIKE 'A%' LIMIT 20";
    let first = accept(sql);
    for _ in 0..10 {
        assert_eq!(accept(sql), first);
    }
}

#[test]
fn test_reguard_is_idempotent() {
    for sql in [
        "SELECT * FROM projects",
        "SELECT * FROM projects WHERE status = 'active' OR archived",
        "SELECT p.name FROM projects AS p JOIN companies AS c ON p.company_id = c.id LIMIT 500",
        "WITH recent AS (SELECT * FROM projects) SELECT * FROM recent",
        "SELECT * FROM projects WHERE company_id IN (SELECT id FROM companies)",
    ] {
        let once = accept(sql);
        let twice = accept(&once.sql);
        assert_eq!(twice.sql, once.sql, "re-guarding {sql}");
        assert_eq!(twice.row_limit_applied, once.row_limit_applied);
        assert_eq!(twice.tables_used, once.tables_used);
    }
}

#[test]
fn test_concurrent_guarding() {
    let guard = SqlGuard::default();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = &guard;
                scope.spawn(move || {
                    let tenant = format!("tenant-{i}");
                    let result = guard.guard(&GuardRequest::new("SELECT * FROM projects", &tenant));
                    (tenant, result)
                })
            })
            .collect();

        for handle in handles {
            let (tenant, result) = handle.join().unwrap();
            let result = result.unwrap();
            assert_eq!(
                result.sql,
                format!("SELECT * FROM projects WHERE projects.tenant_id = '{tenant}' LIMIT 100")
            );
        }
    });
}

#[test]
fn test_limit_by_rejected() {
    assert_eq!(
        reject("SELECT * FROM projects LIMIT 1 BY id"),
        GuardError::DisallowedStatement {
            statement: "LIMIT BY".to_string()
        }
    );
}

#[test]
fn test_pipe_syntax_rejected() {
    for sql in [
        "SELECT * FROM projects |> JOIN companies USING (id)",
        "SELECT * FROM projects |> UNION ALL (SELECT * FROM companies)",
    ] {
        let err = reject(sql);
        assert!(
            matches!(err, GuardError::DisallowedStatement { .. } | GuardError::ParseError(_)),
            "{sql}: {err:?}"
        );
    }
}

#[test]
fn test_clickhouse_alias_cannot_stand_in_for_tenant_column() {
    let result = guard_with(
        SqlDialectKind::ClickHouse,
        "SELECT 'test-org-123' AS tenant_id, name FROM projects WHERE tenant_id = 'test-org-123'",
    );
    assert!(result.tenant_filter_injected);
    assert!(result.sql.contains("AND projects.tenant_id = 'test-org-123'"));
}

// =============================================================================
// REWRITTEN OUTPUT
// =============================================================================

const MAX_ROWS: u64 = 25;

fn guard_with(dialect: SqlDialectKind, sql: &str) -> GuardResult {
    let config = SqlGuardConfig {
        dialect,
        ..SqlGuardConfig::default()
    };
    let request = GuardRequest::new(sql, TENANT).with_max_rows(MAX_ROWS);
    match SqlGuard::new(&config).guard(&request) {
        Ok(result) => result,
        Err(err) => panic!("expected {sql:?} to be accepted under {dialect}, got {err:?}"),
    }
}

fn accepted_corpus() -> Vec<(SqlDialectKind, &'static str)> {
    use SqlDialectKind::*;
    vec![
        (Generic, "SELECT * FROM projects"),
        (Generic, "SELECT * FROM projects WHERE tenant_id = 'test-org-123'"),
        (Generic, "SELECT * FROM projects WHERE status = 'open' OR archived"),
        (Generic, "SELECT * FROM projects, companies WHERE projects.company_id = companies.id"),
        (Generic, "SELECT * FROM projects p LEFT JOIN companies c ON p.company_id = c.id"),
        (Generic, "SELECT * FROM projects a JOIN projects b ON a.parent_id = b.id"),
        (Generic, "SELECT * FROM (projects p JOIN companies c ON p.company_id = c.id)"),
        (Generic, "SELECT (SELECT count(*) FROM companies) AS n FROM projects"),
        (Generic, "SELECT * FROM projects WHERE EXISTS (SELECT 1 FROM addresses a WHERE a.id = 1)"),
        (Generic, "SELECT * FROM (SELECT * FROM companies) AS sub LIMIT 5000"),
        (Generic, "SELECT id FROM projects UNION ALL SELECT id FROM companies"),
        (
            Generic,
            "WITH a AS (SELECT * FROM addresses), b AS (SELECT * FROM a JOIN companies c ON a.company_id = c.id) SELECT * FROM b",
        ),
        (Generic, "(SELECT * FROM projects LIMIT 500)"),
        (
            ClickHouse,
            "SELECT 'test-org-123' AS tenant_id, name FROM projects WHERE tenant_id = 'test-org-123'",
        ),
        (ClickHouse, "SELECT * FROM (SELECT * FROM projects LIMIT 1 BY company_id) AS p"),
        (ClickHouse, "SELECT name FROM projects PREWHERE status = 'open'"),
        (PostgreSql, "SELECT * FROM projects FETCH FIRST 5 ROWS ONLY"),
        (PostgreSql, "SELECT DISTINCT ON (company_id) * FROM projects ORDER BY company_id"),
        (DuckDb, "SELECT p.id FROM projects p WHERE p.id IN (SELECT id FROM companies) LIMIT 5"),
    ]
}

/// Finds select blocks whose base tables lack a qualified tenant conjunct.
#[derive(Default)]
struct UnscopedReferences {
    cte_names: Vec<String>,
    found: Vec<String>,
}

impl UnscopedReferences {
    fn check_body(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => self.check_select(select),
            SetExpr::SetOperation { left, right, .. } => {
                self.check_body(left);
                self.check_body(right);
            }
            _ => {}
        }
    }

    fn check_select(&mut self, select: &Select) {
        let mut qualifiers = Vec::new();
        for table_with_joins in &select.from {
            self.base_tables(table_with_joins, &mut qualifiers);
        }

        let mut conjuncts = Vec::new();
        if let Some(selection) = &select.selection {
            flatten_and(selection, &mut conjuncts);
        }
        for qualifier in qualifiers {
            if !conjuncts.iter().any(|expr| is_scoping(expr, &qualifier)) {
                self.found.push(format!("{qualifier} in `{select}`"));
            }
        }
    }

    fn base_tables(&self, table_with_joins: &TableWithJoins, out: &mut Vec<String>) {
        let factors = std::iter::once(&table_with_joins.relation)
            .chain(table_with_joins.joins.iter().map(|join| &join.relation));
        for factor in factors {
            match factor {
                TableFactor::Table { name, alias, .. } => {
                    let written = name.to_string().to_lowercase();
                    if name.0.len() == 1 && self.cte_names.contains(&written) {
                        continue;
                    }
                    let qualifier = match alias {
                        Some(alias) => alias.name.value.clone(),
                        None => written.rsplit('.').next().unwrap_or_default().to_string(),
                    };
                    out.push(qualifier);
                }
                TableFactor::NestedJoin {
                    table_with_joins, ..
                } => self.base_tables(table_with_joins, out),
                _ => {}
            }
        }
    }
}

impl Visitor for UnscopedReferences {
    type Break = Infallible;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            self.cte_names.extend(
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase()),
            );
        }
        self.check_body(&query.body);
        ControlFlow::Continue(())
    }
}

fn flatten_and<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            flatten_and(left, out);
            flatten_and(right, out);
        }
        Expr::Nested(inner) => flatten_and(inner, out),
        other => out.push(other),
    }
}

/// `<qualifier>.tenant_id = '<TENANT>'`
fn is_scoping(expr: &Expr, qualifier: &str) -> bool {
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return false;
    };
    let column = matches!(
        &**left,
        Expr::CompoundIdentifier(parts)
            if parts.len() == 2 && parts[0].value == qualifier && parts[1].value == "tenant_id"
    );
    let literal = matches!(
        &**right,
        Expr::Value(ValueWithSpan { value: Value::SingleQuotedString(v), .. }) if v == TENANT
    );
    column && literal
}

fn top_level_limit(statement: &Statement) -> Option<u64> {
    let Statement::Query(query) = statement else {
        return None;
    };
    if query.fetch.is_some() || !query.pipe_operators.is_empty() {
        return None;
    }
    match &query.limit_clause {
        Some(LimitClause::LimitOffset {
            limit: Some(Expr::Value(ValueWithSpan {
                value: Value::Number(n, _),
                ..
            })),
            limit_by,
            ..
        }) if limit_by.is_empty() => n.parse().ok(),
        _ => None,
    }
}

#[test]
fn test_every_base_table_reference_scoped_in_output() {
    for (dialect, sql) in accepted_corpus() {
        let result = guard_with(dialect, sql);
        let statement = SqlAnalyzer::new(dialect).parse(&result.sql).unwrap();

        let mut unscoped = UnscopedReferences::default();
        let ControlFlow::Continue(()) = statement.visit(&mut unscoped);
        assert!(
            unscoped.found.is_empty(),
            "{dialect}: {sql}\n  -> {}\n  unscoped: {:?}",
            result.sql,
            unscoped.found
        );
    }
}

#[test]
fn test_output_limit_is_total_cap() {
    for (dialect, sql) in accepted_corpus() {
        let result = guard_with(dialect, sql);
        let statement = SqlAnalyzer::new(dialect).parse(&result.sql).unwrap();

        let limit = top_level_limit(&statement);
        assert_eq!(limit, Some(result.row_limit_applied), "{dialect}: {}", result.sql);
        assert!(result.row_limit_applied <= MAX_ROWS, "{dialect}: {}", result.sql);
    }
}
