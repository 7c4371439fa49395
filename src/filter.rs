//! Condition compiler
//!
//! Turns a recursive boolean filter tree into a [`Predicate`]: containers
//! fold their compiled children with AND/OR, leaves map a dotted field path
//! plus a textual operator to a native comparison.
//!
//! Negated operators (`!=`, `!==`, `<>`) compile to the logical negation of
//! an equality predicate *in place*, so negation stays local to its leaf and
//! combines correctly under De Morgan when nested inside an OR container.
//! (The legacy behavior of hoisting negated leaves into a top-level exclude
//! bucket is wrong for arbitrary nesting and is deliberately not
//! implemented.)
//!
//! Leaves missing `field` or `operator` are skipped, not rejected: partially
//! specified filters from older clients still compile.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::definition::FilterNode;
use crate::error::TaxonomyError;
use crate::expr;

/// Join-path separator used by the storage layer
pub const PATH_SEPARATOR: &str = "__";

/// Executable filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Cmp(Comparison),
}

/// One leaf comparison against a (possibly joined) field path
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Dotted path segments, already split
    pub path: Vec<String>,
    pub op: CompareOp,
    pub value: Value,
}

impl Comparison {
    /// Path in the storage layer's join syntax (`a__b__c`)
    pub fn storage_path(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }

    /// First path segment: the field on the base collection
    pub fn root(&self) -> &str {
        &self.path[0]
    }
}

/// Native comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    StartsWith,
    EndsWith,
    Contains,
    IContains,
    Between,
    IsNull,
    Has,
    HasAny,
    HasAll,
}

impl CompareOp {
    /// Textual operator to native op; negated forms report `negated = true`
    fn parse(text: &str) -> Option<(Self, bool)> {
        let op = match text {
            "=" | "==" | "eq" => Self::Eq,
            "!=" | "!==" | "<>" => return Some((Self::Eq, true)),
            ">" | "gt" => Self::Gt,
            ">=" | "gte" => Self::Gte,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" => Self::Lte,
            "in" => Self::In,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "contains" => Self::Contains,
            "icontains" => Self::IContains,
            "between" => Self::Between,
            "isnull" => Self::IsNull,
            "has" => Self::Has,
            "has_any" => Self::HasAny,
            "has_all" => Self::HasAll,
            _ => return None,
        };
        Some((op, false))
    }
}

/// Compile a filter tree into a predicate
///
/// `None` means "no restriction" — an empty filter list matches everything,
/// never nothing. `caller_ctx` feeds `expression` leaves.
pub fn compile(
    nodes: &[FilterNode],
    caller_ctx: &Value,
) -> Result<Option<Predicate>, TaxonomyError> {
    fold_children(nodes, false, caller_ctx)
}

fn compile_node(
    node: &FilterNode,
    caller_ctx: &Value,
) -> Result<Option<Predicate>, TaxonomyError> {
    match node {
        FilterNode::Container { operator, children } => {
            let is_or = operator
                .as_deref()
                .is_some_and(|o| o.eq_ignore_ascii_case("or"));
            fold_children(children, is_or, caller_ctx)
        }
        FilterNode::Leaf {
            field,
            operator,
            value,
            expression,
        } => {
            // Leniency: partially-specified leaves have no effect
            let (Some(field), Some(operator)) = (field, operator) else {
                return Ok(None);
            };
            let Some((op, negated)) = CompareOp::parse(operator) else {
                return Err(TaxonomyError::Malformed {
                    fragment: operator.clone(),
                    message: format!("unknown filter operator on field '{field}'"),
                });
            };

            let resolved = match (value, expression) {
                (_, Some(source)) => expr::resolve(source, caller_ctx)?,
                (Some(v), None) => v.clone(),
                (None, None) => Value::Null,
            };

            let cmp = Predicate::Cmp(Comparison {
                path: field.split('.').map(str::to_string).collect(),
                op,
                value: resolved,
            });
            Ok(Some(if negated {
                Predicate::Not(Box::new(cmp))
            } else {
                cmp
            }))
        }
    }
}

fn fold_children(
    children: &[FilterNode],
    is_or: bool,
    caller_ctx: &Value,
) -> Result<Option<Predicate>, TaxonomyError> {
    let mut compiled = Vec::with_capacity(children.len());
    for child in children {
        if let Some(p) = compile_node(child, caller_ctx)? {
            compiled.push(p);
        }
    }
    Ok(match compiled.len() {
        0 => None,
        1 => Some(compiled.into_iter().next().expect("one element")),
        _ if is_or => Some(Predicate::Or(compiled)),
        _ => Some(Predicate::And(compiled)),
    })
}

/// Root fields touched by effective leaves, for the planner's
/// to-many-join/distinct detection
pub fn touched_roots(nodes: &[FilterNode]) -> BTreeSet<String> {
    let mut roots = BTreeSet::new();
    collect_roots(nodes, &mut roots);
    roots
}

fn collect_roots(nodes: &[FilterNode], roots: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            FilterNode::Container { children, .. } => collect_roots(children, roots),
            FilterNode::Leaf {
                field: Some(field),
                operator: Some(_),
                ..
            } => {
                let root = field.split('.').next().unwrap_or(field);
                roots.insert(root.to_string());
            }
            FilterNode::Leaf { .. } => {}
        }
    }
}

// ============================================================================
// In-memory evaluation
// ============================================================================

impl Predicate {
    /// Evaluate against one JSON row
    ///
    /// Paths crossing an array use any-match semantics, mirroring how a
    /// to-many join multiplies rows in the storage engine.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::And(ps) => ps.iter().all(|p| p.matches(row)),
            Predicate::Or(ps) => ps.iter().any(|p| p.matches(row)),
            Predicate::Not(p) => !p.matches(row),
            Predicate::Cmp(cmp) => {
                let mut candidates = Vec::new();
                collect_path_values(row, &cmp.path, &mut candidates);
                if candidates.is_empty() {
                    // Missing field behaves as null
                    return compare(&Value::Null, cmp.op, &cmp.value);
                }
                candidates.iter().any(|v| compare(v, cmp.op, &cmp.value))
            }
        }
    }
}

fn collect_path_values<'a>(current: &'a Value, path: &[String], out: &mut Vec<&'a Value>) {
    if path.is_empty() {
        out.push(current);
        return;
    }
    match current {
        Value::Object(map) => {
            if let Some(next) = map.get(&path[0]) {
                collect_path_values(next, &path[1..], out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_path_values(item, path, out);
            }
        }
        _ => {}
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(actual, expected),
        CompareOp::Gt => order(actual, expected).is_some_and(|o| o.is_gt()),
        CompareOp::Gte => order(actual, expected).is_some_and(|o| o.is_ge()),
        CompareOp::Lt => order(actual, expected).is_some_and(|o| o.is_lt()),
        CompareOp::Lte => order(actual, expected).is_some_and(|o| o.is_le()),
        CompareOp::In => match expected {
            Value::Array(items) => items.iter().any(|i| loose_eq(actual, i)),
            _ => false,
        },
        CompareOp::StartsWith => str_pair(actual, expected)
            .is_some_and(|(a, e)| a.starts_with(e)),
        CompareOp::EndsWith => str_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
        CompareOp::Contains => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
            (Value::Array(items), e) => items.iter().any(|i| loose_eq(i, e)),
            _ => false,
        },
        CompareOp::IContains => str_pair(actual, expected)
            .is_some_and(|(a, e)| a.to_lowercase().contains(&e.to_lowercase())),
        CompareOp::Between => match expected {
            Value::Array(bounds) if bounds.len() == 2 => {
                order(actual, &bounds[0]).is_some_and(|o| o.is_ge())
                    && order(actual, &bounds[1]).is_some_and(|o| o.is_le())
            }
            _ => false,
        },
        CompareOp::IsNull => {
            let want_null = crate::expr::truthy(expected);
            actual.is_null() == want_null
        }
        CompareOp::Has => json_has(actual, expected),
        CompareOp::HasAny => match expected {
            Value::Array(keys) => keys.iter().any(|k| json_has(actual, k)),
            single => json_has(actual, single),
        },
        CompareOp::HasAll => match expected {
            Value::Array(keys) => keys.iter().all(|k| json_has(actual, k)),
            single => json_has(actual, single),
        },
    }
}

/// Postgres-style containment test: object has key, array has element
fn json_has(actual: &Value, key: &Value) -> bool {
    match actual {
        Value::Object(map) => key.as_str().is_some_and(|k| map.contains_key(k)),
        Value::Array(items) => items.iter().any(|i| loose_eq(i, key)),
        _ => false,
    }
}

fn str_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub(crate) fn order(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nodes(v: serde_json::Value) -> Vec<FilterNode> {
        serde_json::from_value(v).unwrap()
    }

    fn compile_ok(v: serde_json::Value) -> Predicate {
        compile(&nodes(v), &json!({})).unwrap().unwrap()
    }

    #[test]
    fn empty_filter_means_no_restriction() {
        assert_eq!(compile(&[], &json!({})).unwrap(), None);
    }

    #[test]
    fn leaves_fold_with_and_by_default() {
        let p = compile_ok(json!([
            {"field": "age", "operator": ">", "value": 18},
            {"field": "city", "operator": "=", "value": "NYC"}
        ]));
        assert!(p.matches(&json!({"age": 30, "city": "NYC"})));
        assert!(!p.matches(&json!({"age": 30, "city": "LA"})));
        assert!(!p.matches(&json!({"age": 10, "city": "NYC"})));
    }

    #[test]
    fn or_container_is_case_insensitive() {
        let p = compile_ok(json!([
            {"operator": "OR", "children": [
                {"field": "city", "operator": "=", "value": "NYC"},
                {"field": "city", "operator": "=", "value": "LA"}
            ]}
        ]));
        assert!(p.matches(&json!({"city": "LA"})));
        assert!(!p.matches(&json!({"city": "SF"})));
    }

    #[test]
    fn negation_is_local_to_its_leaf() {
        // OR(field != v, X): rows satisfying neither arm are rejected,
        // which only holds when the negation stays inside the OR
        let p = compile_ok(json!([
            {"operator": "or", "children": [
                {"field": "status", "operator": "!=", "value": "closed"},
                {"field": "priority", "operator": "=", "value": "high"}
            ]}
        ]));
        assert!(p.matches(&json!({"status": "open", "priority": "low"})));
        assert!(p.matches(&json!({"status": "closed", "priority": "high"})));
        assert!(!p.matches(&json!({"status": "closed", "priority": "low"})));
    }

    #[test]
    fn negated_forms_compile_to_not_eq() {
        for op in ["!=", "!==", "<>"] {
            let p = compile_ok(json!([{"field": "x", "operator": op, "value": 1}]));
            assert!(matches!(p, Predicate::Not(ref inner)
                if matches!(**inner, Predicate::Cmp(ref c) if c.op == CompareOp::Eq)));
        }
    }

    #[test]
    fn incomplete_leaves_are_skipped_silently() {
        // Missing operator and missing field: both tolerated, no restriction
        let out = compile(
            &nodes(json!([
                {"field": "age"},
                {"operator": ">", "value": 3},
                {"value": 9}
            ])),
            &json!({}),
        )
        .unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn expression_leaves_use_caller_context() {
        let p = compile(
            &nodes(json!([
                {"field": "age", "operator": ">=", "expression": "add(min_age, 3)"}
            ])),
            &json!({"min_age": 15}),
        )
        .unwrap()
        .unwrap();
        assert!(p.matches(&json!({"age": 18})));
        assert!(!p.matches(&json!({"age": 17})));
    }

    #[test]
    fn unknown_operator_is_taxonomy_error() {
        let err = compile(
            &nodes(json!([{"field": "x", "operator": "~~", "value": 1}])),
            &json!({}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "taxonomy.malformed");
    }

    #[test]
    fn dotted_paths_map_to_storage_separator() {
        let p = compile_ok(json!([
            {"field": "author.profile.age", "operator": ">", "value": 21}
        ]));
        let Predicate::Cmp(cmp) = p else { panic!() };
        assert_eq!(cmp.storage_path(), "author__profile__age");
        assert_eq!(cmp.root(), "author");
    }

    #[test]
    fn path_across_array_uses_any_match() {
        let p = compile_ok(json!([
            {"field": "tags.name", "operator": "=", "value": "x"}
        ]));
        assert!(p.matches(&json!({"tags": [{"name": "a"}, {"name": "x"}]})));
        assert!(!p.matches(&json!({"tags": [{"name": "a"}]})));
        assert!(!p.matches(&json!({"tags": []})));
    }

    #[test]
    fn operator_coverage() {
        let row = json!({
            "name": "Grace Hopper",
            "age": 85,
            "meta": {"unit": "navy"},
            "tags": ["pioneer", "compiler"],
            "deleted_at": null
        });

        for (field, op, value, expected) in [
            ("name", "startswith", json!("Grace"), true),
            ("name", "endswith", json!("Hopper"), true),
            ("name", "contains", json!("ce Ho"), true),
            ("name", "icontains", json!("grace"), true),
            ("age", "between", json!([80, 90]), true),
            ("age", "between", json!([90, 99]), false),
            ("age", "in", json!([1, 85]), true),
            ("deleted_at", "isnull", json!(true), true),
            ("name", "isnull", json!(true), false),
            ("name", "isnull", json!(false), true),
            ("meta", "has", json!("unit"), true),
            ("tags", "has_any", json!(["x", "pioneer"]), true),
            ("tags", "has_all", json!(["pioneer", "compiler"]), true),
            ("tags", "has_all", json!(["pioneer", "x"]), false),
        ] {
            let p = compile_ok(json!([{"field": field, "operator": op, "value": value}]));
            assert_eq!(p.matches(&row), expected, "{field} {op}");
        }
    }

    #[test]
    fn touched_roots_skips_incomplete_leaves() {
        let roots = touched_roots(&nodes(json!([
            {"field": "tags.name", "operator": "=", "value": "x"},
            {"operator": "or", "children": [
                {"field": "author.name", "operator": "=", "value": "a"}
            ]},
            {"field": "ghost"}
        ])));
        assert_eq!(
            roots.into_iter().collect::<Vec<_>>(),
            vec!["author".to_string(), "tags".to_string()]
        );
    }
}
