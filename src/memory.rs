//! In-memory plan executor
//!
//! Runs a [`QueryPlan`](crate::planner::QueryPlan) over a JSON row set. This
//! is the reference executor: a storage engine translates the same plan into
//! its own query language, this one interprets it directly. Rows are plain
//! JSON objects; relations are expected to be embedded (an eager-load plan
//! entry is a fetch instruction for the storage engine, already satisfied
//! here).
//!
//! Execution order mirrors SQL semantics: restrict (tree link, predicate,
//! permitted ids), annotate, sort, then de-duplicate.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{EngineResult, TaxonomyError};
use crate::expr;
use crate::filter::{self, PATH_SEPARATOR};
use crate::planner::{OrderKey, QueryPlan};

/// Execute a plan against a set of JSON rows
pub fn execute(plan: &QueryPlan, rows: &[Value]) -> EngineResult<Vec<Value>> {
    let mut out: Vec<Value> = Vec::with_capacity(rows.len());

    for row in rows {
        if let Some((parent_field, root_value)) = &plan.tree_restriction {
            let actual = row.get(parent_field).unwrap_or(&Value::Null);
            if !filter::loose_eq(actual, root_value) {
                continue;
            }
        }
        if let Some(predicate) = &plan.predicate {
            if !predicate.matches(row) {
                continue;
            }
        }
        if let Some(ids) = &plan.permitted_ids {
            let id = row.get("id").unwrap_or(&Value::Null);
            if !ids.iter().any(|granted| filter::loose_eq(granted, id)) {
                continue;
            }
        }
        out.push(annotate(plan, row)?);
    }

    // sort_by is stable: equal keys keep input order
    out.sort_by(|a, b| order_rows(a, b, &plan.ordering));

    if plan.distinct {
        let mut seen = HashSet::new();
        out.retain(|row| seen.insert(row.to_string()));
    }

    debug!(collection = %plan.collection, rows = out.len(), "plan executed in memory");
    Ok(out)
}

/// Attach annotation values, evaluating each expression with the row itself
/// as the context object
fn annotate(plan: &QueryPlan, row: &Value) -> EngineResult<Value> {
    let mut row = row.clone();
    if plan.annotations.is_empty() {
        return Ok(row);
    }
    let ctx = row.clone();
    let Value::Object(map) = &mut row else {
        return Ok(row);
    };
    for ann in &plan.annotations {
        let value = expr::resolve(&ann.expression, &ctx).map_err(|err| match err {
            TaxonomyError::Evaluation { function, message } => TaxonomyError::Evaluation {
                function,
                message: format!("annotation '{}': {message}", ann.name),
            },
            other => other,
        })?;
        map.insert(ann.name.clone(), value);
    }
    Ok(row)
}

fn order_rows(a: &Value, b: &Value, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let va = lookup(a, &key.path);
        let vb = lookup(b, &key.path);
        // Nulls sort as greatest: last ascending, first descending
        let ord = match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) if x.is_null() && y.is_null() => Ordering::Equal,
            (Some(x), Some(_)) if x.is_null() => Ordering::Greater,
            (Some(_), Some(y)) if y.is_null() => Ordering::Less,
            (Some(x), Some(y)) => filter::order(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Resolve an order key against a row; accepts dotted or `__` separators
fn lookup<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = row;
    for segment in path.split('.').flat_map(|s| s.split(PATH_SEPARATOR)) {
        current = current.get(segment)?;
    }
    Some(current)
}
