//! Tenant predicate injection.
//!
//! Each select block gets one `<qualifier>.<tenant_column> = '<tenant>'`
//! conjunct per base table reference in its FROM clause, unless an equal
//! qualified conjunct is already present. An unqualified `tenant_id = '...'`
//! never counts: ClickHouse resolves it to a same-named SELECT alias first.
//! The tenant id enters the tree as a string literal node; the serializer
//! quotes and escapes it.

use sqlguard_core::TenancyConfig;
use sqlparser::ast::{
    BinaryOperator, Expr, Ident, Query, Select, SelectItem, SetExpr, Statement, Value,
    ValueWithSpan, VisitMut, VisitorMut,
};
use std::convert::Infallible;
use std::ops::ControlFlow;

use crate::resolver::{CteScope, TableReference, select_references};

/// Injects tenant predicates into a parsed statement.
pub struct TenantFilterInjector<'a> {
    tenancy: &'a TenancyConfig,
    tenant_id: &'a str,
}

impl<'a> TenantFilterInjector<'a> {
    pub fn new(tenancy: &'a TenancyConfig, tenant_id: &'a str) -> Self {
        Self { tenancy, tenant_id }
    }

    /// Scope every select block of `statement` to the tenant.
    ///
    /// Returns the predicates that were added, rendered as SQL.
    pub fn inject(&self, statement: &mut Statement) -> Vec<String> {
        let mut visitor = InjectionVisitor {
            injector: self,
            scope: CteScope::default(),
            added: Vec::new(),
        };
        match statement.visit(&mut visitor) {
            ControlFlow::Continue(()) => visitor.added,
            ControlFlow::Break(never) => match never {},
        }
    }

    fn scope_select(&self, select: &mut Select, scope: &CteScope, added: &mut Vec<String>) {
        for reference in &select_references(select, scope) {
            let column = self.tenancy.tenant_column(&reference.name);
            let selection = select.selection.as_ref();
            if !projection_aliases_column(&select.projection, reference, column)
                && has_tenant_predicate(selection, reference, column, self.tenant_id)
            {
                continue;
            }

            let predicate = tenant_predicate(reference, column, self.tenant_id);
            added.push(predicate.to_string());
            conjoin(&mut select.selection, predicate);
        }
    }

    fn scope_set_expr(&self, body: &mut SetExpr, scope: &CteScope, added: &mut Vec<String>) {
        match body {
            SetExpr::Select(select) => self.scope_select(select, scope, added),
            SetExpr::SetOperation { left, right, .. } => {
                self.scope_set_expr(left, scope, added);
                self.scope_set_expr(right, scope, added);
            }
            // Nested queries are reached by the visitor.
            _ => {}
        }
    }
}

struct InjectionVisitor<'i, 'a> {
    injector: &'i TenantFilterInjector<'a>,
    scope: CteScope,
    added: Vec<String>,
}

impl VisitorMut for InjectionVisitor<'_, '_> {
    type Break = Infallible;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        self.scope.enter(query);
        self.injector
            .scope_set_expr(&mut query.body, &self.scope, &mut self.added);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<Self::Break> {
        self.scope.exit();
        ControlFlow::Continue(())
    }
}

/// `<qualifier>.<column> = '<tenant_id>'`
fn tenant_predicate(reference: &TableReference, column: &str, tenant_id: &str) -> Expr {
    Expr::BinaryOp {
        left: Box::new(Expr::CompoundIdentifier(vec![
            reference.qualifier().clone(),
            Ident::new(column),
        ])),
        op: BinaryOperator::Eq,
        right: Box::new(Expr::Value(
            Value::SingleQuotedString(tenant_id.to_string()).with_empty_span(),
        )),
    }
}

/// AND `predicate` onto `selection`, creating the WHERE clause if needed.
fn conjoin(selection: &mut Option<Expr>, predicate: Expr) {
    *selection = Some(match selection.take() {
        None => predicate,
        Some(existing) => Expr::BinaryOp {
            left: Box::new(parenthesize_for_and(existing)),
            op: BinaryOperator::And,
            right: Box::new(predicate),
        },
    });
}

/// Rendering does not add parentheses, so anything but an AND chain or an
/// already parenthesized expression is wrapped to keep `a OR b` from
/// absorbing the new conjunct.
fn parenthesize_for_and(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::And,
            ..
        }
        | Expr::Nested(_) => expr,
        other => Expr::Nested(Box::new(other)),
    }
}

/// Whether a SELECT item is aliased to the tenant column, bare or qualified.
fn projection_aliases_column(
    projection: &[SelectItem],
    reference: &TableReference,
    column: &str,
) -> bool {
    let qualified = format!("{}.{}", reference.qualifier().value, column);
    projection.iter().any(|item| match item {
        SelectItem::ExprWithAlias { alias, .. } => {
            alias.value.eq_ignore_ascii_case(column)
                || alias.value.eq_ignore_ascii_case(&qualified)
        }
        _ => false,
    })
}

/// Whether `selection` has a top-level conjunct equating the reference's
/// qualified tenant column with `tenant_id`.
fn has_tenant_predicate(
    selection: Option<&Expr>,
    reference: &TableReference,
    column: &str,
    tenant_id: &str,
) -> bool {
    let Some(selection) = selection else {
        return false;
    };

    let mut conjuncts = Vec::new();
    collect_conjuncts(selection, &mut conjuncts);

    conjuncts.into_iter().any(|expr| {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = expr
        else {
            return false;
        };
        let column_matches = |side: &Expr| is_tenant_column(side, reference, column);
        (column_matches(&**left) && is_tenant_literal(right, tenant_id))
            || (column_matches(&**right) && is_tenant_literal(left, tenant_id))
    })
}

fn collect_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        Expr::Nested(inner) => collect_conjuncts(inner, out),
        other => out.push(other),
    }
}

fn is_tenant_column(expr: &Expr, reference: &TableReference, column: &str) -> bool {
    match expr {
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [qualifier, name] => {
                qualifier
                    .value
                    .eq_ignore_ascii_case(&reference.qualifier().value)
                    && name.value.eq_ignore_ascii_case(column)
            }
            _ => false,
        },
        _ => false,
    }
}

fn is_tenant_literal(expr: &Expr, tenant_id: &str) -> bool {
    matches!(
        expr,
        Expr::Value(ValueWithSpan {
            value: Value::SingleQuotedString(value),
            ..
        }) if value == tenant_id
    )
}
