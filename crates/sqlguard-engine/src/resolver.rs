//! Table resolution: which base tables does a query actually scan?
//!
//! Every query block in the tree is walked: the outer query, CTE bodies,
//! derived tables and sub-queries inside expressions. A relation whose name
//! is a CTE visible at that point is a lexical alias and is skipped; every
//! other relation is a base table.

use sqlparser::ast::{
    Ident, ObjectName, Query, Select, Statement, TableFactor, TableWithJoins, Visit, Visitor,
};
use std::ops::ControlFlow;

use crate::error::GuardError;

/// A base table scanned by a query, under one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    /// Lowercase qualified name, parts joined with `.`.
    pub name: String,
    /// Alias the query uses for this reference, if any.
    pub alias: Option<Ident>,
    /// Last part of the name as written.
    table: Ident,
}

impl TableReference {
    fn new(name: &ObjectName, alias: Option<&Ident>) -> Self {
        let table = name
            .0
            .last()
            .and_then(|part| part.as_ident())
            .cloned()
            .unwrap_or_else(|| Ident::new(name.to_string()));

        Self {
            name: qualified_name(name),
            alias: alias.cloned(),
            table,
        }
    }

    /// How columns of this reference are qualified: the alias, else the table name.
    pub fn qualifier(&self) -> &Ident {
        self.alias.as_ref().unwrap_or(&self.table)
    }
}

/// Lowercase, `.`-joined form of a possibly qualified name.
fn qualified_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part.as_ident() {
            Some(ident) => ident.value.to_lowercase(),
            None => part.to_string().to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Collect every base table reference in `statement`, in the order the
/// relations appear.
///
/// Relations that cannot carry a tenant predicate (table functions, `UNNEST`,
/// `PIVOT`, ...) are rejected.
pub fn resolve_tables(statement: &Statement) -> Result<Vec<TableReference>, GuardError> {
    let mut collector = TableCollector::default();
    match statement.visit(&mut collector) {
        ControlFlow::Break(err) => Err(err),
        ControlFlow::Continue(()) => Ok(collector.references),
    }
}

#[derive(Default)]
struct TableCollector {
    scope: CteScope,
    references: Vec<TableReference>,
}

impl Visitor for TableCollector {
    type Break = GuardError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.scope.enter(query);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.scope.exit();
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                if args.is_some() {
                    return ControlFlow::Break(GuardError::disallowed_table(qualified_name(name)));
                }
                if !self.scope.is_cte(name) {
                    self.references
                        .push(TableReference::new(name, alias.as_ref().map(|a| &a.name)));
                }
                ControlFlow::Continue(())
            }
            // Their contents are visited separately.
            TableFactor::Derived { .. } | TableFactor::NestedJoin { .. } => {
                ControlFlow::Continue(())
            }
            other => ControlFlow::Break(GuardError::disallowed_table(other.to_string())),
        }
    }
}

/// Base table references in the FROM clause of a single select block.
pub(crate) fn select_references(select: &Select, scope: &CteScope) -> Vec<TableReference> {
    let mut references = Vec::new();
    for table_with_joins in &select.from {
        collect_table_with_joins(table_with_joins, scope, &mut references);
    }
    references
}

fn collect_table_with_joins(
    table_with_joins: &TableWithJoins,
    scope: &CteScope,
    references: &mut Vec<TableReference>,
) {
    collect_factor(&table_with_joins.relation, scope, references);
    for join in &table_with_joins.joins {
        collect_factor(&join.relation, scope, references);
    }
}

fn collect_factor(factor: &TableFactor, scope: &CteScope, references: &mut Vec<TableReference>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            if !scope.is_cte(name) {
                references.push(TableReference::new(name, alias.as_ref().map(|a| &a.name)));
            }
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, scope, references),
        // Derived tables are scoped as queries of their own.
        _ => {}
    }
}

/// Tracks which CTE names are visible while a tree is traversed.
///
/// A CTE body sees the CTEs declared before it in the same `WITH` list (and
/// itself under `RECURSIVE`), plus those of enclosing queries. The query body
/// sees all of them. The `WITH` list is visited before anything else in a
/// query, so the first child queries entered below an owner are its CTE
/// bodies, in declaration order.
#[derive(Debug, Default)]
pub(crate) struct CteScope {
    depth: usize,
    frames: Vec<CteFrame>,
}

#[derive(Debug)]
struct CteFrame {
    /// Nesting depth of the query owning the `WITH` list.
    depth: usize,
    names: Vec<String>,
    recursive: bool,
    bodies_entered: usize,
    active: Option<usize>,
}

impl CteFrame {
    fn visible(&self) -> &[String] {
        match self.active {
            Some(index) if self.recursive => &self.names[..=index],
            Some(index) => &self.names[..index],
            None => &self.names,
        }
    }
}

impl CteScope {
    /// Call before the contents of `query` are visited.
    pub(crate) fn enter(&mut self, query: &Query) {
        self.depth += 1;

        if let Some(frame) = self.frames.last_mut() {
            if frame.depth + 1 == self.depth && frame.bodies_entered < frame.names.len() {
                frame.active = Some(frame.bodies_entered);
                frame.bodies_entered += 1;
            }
        }

        if let Some(with) = &query.with {
            self.frames.push(CteFrame {
                depth: self.depth,
                names: with
                    .cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase())
                    .collect(),
                recursive: with.recursive,
                bodies_entered: 0,
                active: None,
            });
        }
    }

    /// Call after the contents of the query last entered were visited.
    pub(crate) fn exit(&mut self) {
        if self.frames.last().is_some_and(|frame| frame.depth == self.depth) {
            self.frames.pop();
        }

        if let Some(frame) = self.frames.last_mut() {
            if frame.depth + 1 == self.depth {
                frame.active = None;
            }
        }

        self.depth = self.depth.saturating_sub(1);
    }

    /// Whether `name` refers to a CTE at the current position.
    pub(crate) fn is_cte(&self, name: &ObjectName) -> bool {
        let [part] = name.0.as_slice() else {
            return false;
        };
        let Some(ident) = part.as_ident() else {
            return false;
        };
        let wanted = ident.value.to_lowercase();
        self.frames
            .iter()
            .any(|frame| frame.visible().iter().any(|name| *name == wanted))
    }
}
