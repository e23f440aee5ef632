//! Row cap enforcement on the top-level query.

use sqlparser::ast::{Expr, LimitClause, Query, Value, ValueWithSpan};

/// Clamp (or insert) the LIMIT of `query` so it never exceeds `max_rows`.
///
/// A literal limit at or below the cap is kept; anything else, including
/// non-literal expressions, becomes `max_rows`. A `FETCH FIRST n ROWS` clause
/// is folded into the LIMIT. Returns the limit written into the tree.
pub fn enforce_row_cap(query: &mut Query, max_rows: u64) -> u64 {
    let applied = match requested_limit(query) {
        Some(requested) if requested <= max_rows => requested,
        _ => max_rows,
    };

    query.fetch = None;
    let clause = query
        .limit_clause
        .get_or_insert_with(|| LimitClause::LimitOffset {
            limit: None,
            offset: None,
            limit_by: Vec::new(),
        });
    let limit = Expr::Value(Value::Number(applied.to_string(), false).with_empty_span());
    match clause {
        LimitClause::LimitOffset { limit: current, .. } => *current = Some(limit),
        LimitClause::OffsetCommaLimit { limit: current, .. } => *current = limit,
    }

    applied
}

/// The row count the query asks for, when every limiting clause is a plain
/// literal. `None` means no usable limit was requested.
fn requested_limit(query: &Query) -> Option<u64> {
    let from_limit = match &query.limit_clause {
        Some(LimitClause::LimitOffset {
            limit: Some(expr), ..
        })
        | Some(LimitClause::OffsetCommaLimit { limit: expr, .. }) => Some(literal_row_count(expr)?),
        _ => None,
    };

    let from_fetch = match &query.fetch {
        Some(fetch) if fetch.percent => return None,
        Some(fetch) => match &fetch.quantity {
            Some(expr) => Some(literal_row_count(expr)?),
            // `FETCH FIRST ROW ONLY`
            None => Some(1),
        },
        None => None,
    };

    match (from_limit, from_fetch) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn literal_row_count(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::Value(ValueWithSpan {
            value: Value::Number(raw, _),
            ..
        }) => raw.parse().ok(),
        Expr::Nested(inner) => literal_row_count(inner),
        _ => None,
    }
}
