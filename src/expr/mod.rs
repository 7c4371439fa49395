//! Expression mini-language
//!
//! A tiny `func(arg, arg)` language used to compute dynamic values inside
//! stored filter definitions and schema annotations: timestamps, arithmetic,
//! comparisons, attribute lookups against the caller-supplied context.
//!
//! ## Pipeline
//!
//! ```text
//! Source -> Parser (nom) -> Expr AST -> Interpreter (fixed builtin registry)
//! ```
//!
//! There is no dynamic code execution: the registry is a closed set of
//! builtins, and an unknown name is a [`TaxonomyError`] — a corrupt stored
//! definition, not bad user input.
//!
//! Dotted attribute paths are sugar: `a.b` parses as
//! `getattr(getattr(context(), "a"), "b")`.

mod eval;
mod parser;

pub use eval::evaluate;
pub(crate) use eval::truthy;
pub use parser::parse_expression;

use serde_json::Value;

use crate::error::TaxonomyError;

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// JSON literal: string, number, boolean, null
    Literal(Value),
    /// Array of sub-expressions
    Array(Vec<Expr>),
    /// Builtin call `name(arg, ...)`
    Call { name: String, args: Vec<Expr> },
}

/// Parse and evaluate an expression against a caller-supplied context
///
/// Pure function of its two inputs; no external state beyond the clock
/// consulted by `now()`.
pub fn resolve(source: &str, context: &Value) -> Result<Value, TaxonomyError> {
    let expr = parse_expression(source)?;
    evaluate(&expr, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arithmetic_folds_left() {
        let ctx = json!({});
        assert_eq!(resolve("add(1, 2, 3)", &ctx).unwrap(), json!(6));
        assert_eq!(resolve("sub(10, 3, 2)", &ctx).unwrap(), json!(5));
        assert_eq!(resolve("mul(2, 3, 4)", &ctx).unwrap(), json!(24));
        assert_eq!(resolve("pow(2, 10)", &ctx).unwrap(), json!(1024));
        assert_eq!(resolve("mod(17, 5)", &ctx).unwrap(), json!(2));
    }

    #[test]
    fn comparison_chains_short_circuit() {
        let ctx = json!({});
        assert_eq!(resolve("lt(1, 2, 3)", &ctx).unwrap(), json!(true));
        assert_eq!(resolve("lt(1, 3, 2)", &ctx).unwrap(), json!(false));
        assert_eq!(resolve("gte(3, 3, 2)", &ctx).unwrap(), json!(true));
        assert_eq!(resolve("eq(1, 1, 1)", &ctx).unwrap(), json!(true));
        assert_eq!(resolve("eq(1, 1, 2)", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn dotted_path_reads_context() {
        let ctx = json!({"user": {"profile": {"age": 41}}});
        assert_eq!(resolve("user.profile.age", &ctx).unwrap(), json!(41));
        // Missing attributes resolve to null rather than erroring
        assert_eq!(resolve("user.missing", &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn variables_returns_whole_context() {
        let ctx = json!({"a": 1});
        assert_eq!(resolve("__variables__()", &ctx).unwrap(), ctx);
        assert_eq!(resolve("context()", &ctx).unwrap(), ctx);
    }

    #[test]
    fn nested_calls_and_quoting() {
        let ctx = json!({"n": 4});
        assert_eq!(resolve("add(mul(n, 2), 1)", &ctx).unwrap(), json!(9));
        // Commas and parens inside string literals do not split arguments
        assert_eq!(
            resolve("contains(\"a,b(c\", \"a,b\")", &ctx).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn if_is_lazy() {
        let ctx = json!({});
        // The dead branch divides by zero; laziness means it never runs
        assert_eq!(
            resolve("if(gt(2, 1), \"yes\", div(1, 0))", &ctx).unwrap(),
            json!("yes")
        );
    }

    #[test]
    fn contains_requires_all_keys() {
        let ctx = json!({});
        assert_eq!(
            resolve("contains([1, 2, 3], 1, 3)", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            resolve("contains([1, 2, 3], 1, 9)", &ctx).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn slice_and_getitem() {
        let ctx = json!({"xs": [10, 20, 30, 40]});
        assert_eq!(resolve("slice(xs, 1, 3)", &ctx).unwrap(), json!([20, 30]));
        assert_eq!(resolve("getitem(xs, 2)", &ctx).unwrap(), json!(30));
        assert_eq!(resolve("slice(\"hello\", 0, 2)", &ctx).unwrap(), json!("he"));
    }

    #[test]
    fn unknown_function_is_taxonomy_error() {
        let err = resolve("frobnicate(1)", &json!({})).unwrap_err();
        assert_eq!(err.code(), "taxonomy.unknown_function");
    }

    #[test]
    fn malformed_nesting_is_taxonomy_error() {
        let err = resolve("add(1, 2", &json!({})).unwrap_err();
        assert_eq!(err.code(), "taxonomy.malformed");
    }

    #[test]
    fn now_returns_timestamp() {
        let out = resolve("now()", &json!({})).unwrap();
        let s = out.as_str().unwrap();
        assert!(s.contains('T'), "expected RFC 3339 timestamp, got {s}");
    }
}
