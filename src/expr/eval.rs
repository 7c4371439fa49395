//! Interpreter over the fixed builtin registry
//!
//! Special forms (`if`, `and`, `or`, `context`) are handled in the
//! interpreter because they need laziness or the context object; everything
//! else is an eager builtin dispatched by name. Unknown names are a
//! [`TaxonomyError`]: the stored definition references a function that does
//! not exist.

use chrono::Utc;
use serde_json::{Number, Value};
use std::cmp::Ordering;

use super::Expr;
use crate::error::TaxonomyError;

/// Evaluate a parsed expression against the caller-supplied context
pub fn evaluate(expr: &Expr, context: &Value) -> Result<Value, TaxonomyError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|e| evaluate(e, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
        Expr::Call { name, args } => call(name, args, context),
    }
}

fn call(name: &str, args: &[Expr], context: &Value) -> Result<Value, TaxonomyError> {
    // Special forms first: these must not evaluate all arguments up front
    match name {
        "context" | "__variables__" => {
            expect_arity(name, args.len(), 0)?;
            return Ok(context.clone());
        }
        "if" => {
            expect_arity(name, args.len(), 3)?;
            let cond = evaluate(&args[0], context)?;
            let branch = if truthy(&cond) { &args[1] } else { &args[2] };
            return evaluate(branch, context);
        }
        "and" => {
            let mut last = Value::Bool(true);
            for arg in args {
                last = evaluate(arg, context)?;
                if !truthy(&last) {
                    return Ok(Value::Bool(false));
                }
            }
            return Ok(Value::Bool(truthy(&last)));
        }
        "or" => {
            for arg in args {
                let v = evaluate(arg, context)?;
                if truthy(&v) {
                    return Ok(Value::Bool(true));
                }
            }
            return Ok(Value::Bool(false));
        }
        _ => {}
    }

    let values = args
        .iter()
        .map(|e| evaluate(e, context))
        .collect::<Result<Vec<_>, _>>()?;

    match name {
        "add" => fold_numeric(name, &values, |a, b| a + b, |a, b| a.checked_add(b)),
        "sub" => fold_numeric(name, &values, |a, b| a - b, |a, b| a.checked_sub(b)),
        "mul" => fold_numeric(name, &values, |a, b| a * b, |a, b| a.checked_mul(b)),
        "div" => divide(name, &values),
        "mod" => modulo(name, &values),
        "pow" => power(name, &values),
        "lt" => compare_chain(name, &values, |o| o == Ordering::Less),
        "lte" => compare_chain(name, &values, |o| o != Ordering::Greater),
        "gt" => compare_chain(name, &values, |o| o == Ordering::Greater),
        "gte" => compare_chain(name, &values, |o| o != Ordering::Less),
        "eq" => equal_chain(name, &values),
        "not" => {
            expect_arity(name, values.len(), 1)?;
            Ok(Value::Bool(!truthy(&values[0])))
        }
        "contains" => contains(name, &values),
        "slice" => slice(name, &values),
        "getitem" => getitem(name, &values),
        "getattr" => getattr(name, &values),
        "now" => {
            expect_arity(name, values.len(), 0)?;
            Ok(Value::String(Utc::now().to_rfc3339()))
        }
        other => Err(TaxonomyError::UnknownFunction {
            function: other.to_string(),
        }),
    }
}

// ============================================================================
// Builtins
// ============================================================================

fn fold_numeric(
    name: &str,
    values: &[Value],
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    let mut acc = values[0].clone();
    for v in &values[1..] {
        acc = numeric_binop(name, &acc, v, float_op, int_op)?;
    }
    Ok(acc)
}

/// Integer arithmetic when both sides are integers and it does not overflow;
/// floats otherwise
fn numeric_binop(
    name: &str,
    a: &Value,
    b: &Value,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, TaxonomyError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(out) = int_op(x, y) {
            return Ok(Value::Number(out.into()));
        }
    }
    let x = as_f64(name, a)?;
    let y = as_f64(name, b)?;
    number_from_f64(name, float_op(x, y))
}

fn divide(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    let mut acc = as_f64(name, &values[0])?;
    for v in &values[1..] {
        let d = as_f64(name, v)?;
        if d == 0.0 {
            return Err(TaxonomyError::Evaluation {
                function: name.to_string(),
                message: "division by zero".to_string(),
            });
        }
        acc /= d;
    }
    if acc.fract() == 0.0 && acc.abs() < i64::MAX as f64 {
        return Ok(Value::Number((acc as i64).into()));
    }
    number_from_f64(name, acc)
}

fn modulo(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    let mut acc = values[0].clone();
    for v in &values[1..] {
        if v.as_i64() == Some(0) || v.as_f64() == Some(0.0) {
            return Err(TaxonomyError::Evaluation {
                function: name.to_string(),
                message: "modulo by zero".to_string(),
            });
        }
        acc = numeric_binop(name, &acc, v, |a, b| a % b, |a, b| a.checked_rem(b))?;
    }
    Ok(acc)
}

fn power(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    let mut acc = values[0].clone();
    for v in &values[1..] {
        acc = if let (Some(base), Some(exp)) = (acc.as_i64(), v.as_u64()) {
            match u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)) {
                Some(out) => Value::Number(out.into()),
                None => number_from_f64(name, (base as f64).powf(exp as f64))?,
            }
        } else {
            let base = as_f64(name, &acc)?;
            let exp = as_f64(name, v)?;
            number_from_f64(name, base.powf(exp))?
        };
    }
    Ok(acc)
}

/// Pairwise comparison chain; stops and returns false at the first pair
/// failing the predicate
fn compare_chain(
    name: &str,
    values: &[Value],
    accept: fn(Ordering) -> bool,
) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    for pair in values.windows(2) {
        let ord = order(name, &pair[0], &pair[1])?;
        if !accept(ord) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn equal_chain(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    for pair in values.windows(2) {
        if !loose_eq(&pair[0], &pair[1]) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn contains(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_at_least(name, values.len(), 2)?;
    let container = &values[0];
    let all = values[1..].iter().all(|key| match container {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, key)),
        Value::Object(map) => key.as_str().is_some_and(|k| map.contains_key(k)),
        Value::String(s) => key.as_str().is_some_and(|k| s.contains(k)),
        _ => false,
    });
    Ok(Value::Bool(all))
}

fn slice(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    if values.len() != 2 && values.len() != 3 {
        return Err(TaxonomyError::Arity {
            function: name.to_string(),
            expected: "2 or 3".to_string(),
            found: values.len(),
        });
    }
    let start = index_arg(name, &values[1])?;
    let end = values.get(2).map(|v| index_arg(name, v)).transpose()?;

    match &values[0] {
        Value::Array(items) => {
            let (a, b) = clamp_range(start, end, items.len());
            Ok(Value::Array(items[a..b].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = clamp_range(start, end, chars.len());
            Ok(Value::String(chars[a..b].iter().collect()))
        }
        other => Err(TaxonomyError::Evaluation {
            function: name.to_string(),
            message: format!("cannot slice {other}"),
        }),
    }
}

fn getitem(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_arity(name, values.len(), 2)?;
    match (&values[0], &values[1]) {
        (Value::Array(items), idx) => {
            let i = index_arg(name, idx)?;
            Ok(items.get(i).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (container, _) => Err(TaxonomyError::Evaluation {
            function: name.to_string(),
            message: format!("cannot index into {container}"),
        }),
    }
}

/// Attribute access; missing attributes resolve to null so dotted paths over
/// sparse contexts do not abort filter compilation
fn getattr(name: &str, values: &[Value]) -> Result<Value, TaxonomyError> {
    expect_arity(name, values.len(), 2)?;
    let attr = values[1].as_str().ok_or_else(|| TaxonomyError::Evaluation {
        function: name.to_string(),
        message: "attribute name must be a string".to_string(),
    })?;
    match &values[0] {
        Value::Object(map) => Ok(map.get(attr).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

// ============================================================================
// Value helpers
// ============================================================================

pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Number equality is numeric (1 == 1.0); everything else is structural
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order(name: &str, a: &Value, b: &Value) -> Result<Ordering, TaxonomyError> {
    let ord = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ord.ok_or_else(|| TaxonomyError::Evaluation {
        function: name.to_string(),
        message: format!("cannot compare {a} with {b}"),
    })
}

fn as_f64(name: &str, v: &Value) -> Result<f64, TaxonomyError> {
    v.as_f64().ok_or_else(|| TaxonomyError::Evaluation {
        function: name.to_string(),
        message: format!("expected a number, got {v}"),
    })
}

fn number_from_f64(name: &str, f: f64) -> Result<Value, TaxonomyError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TaxonomyError::Evaluation {
            function: name.to_string(),
            message: format!("non-finite result {f}"),
        })
}

fn index_arg(name: &str, v: &Value) -> Result<usize, TaxonomyError> {
    v.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| TaxonomyError::Evaluation {
            function: name.to_string(),
            message: format!("expected a non-negative index, got {v}"),
        })
}

fn clamp_range(start: usize, end: Option<usize>, len: usize) -> (usize, usize) {
    let a = start.min(len);
    let b = end.unwrap_or(len).min(len).max(a);
    (a, b)
}

fn expect_arity(name: &str, found: usize, expected: usize) -> Result<(), TaxonomyError> {
    if found != expected {
        return Err(TaxonomyError::Arity {
            function: name.to_string(),
            expected: expected.to_string(),
            found,
        });
    }
    Ok(())
}

fn expect_at_least(name: &str, found: usize, min: usize) -> Result<(), TaxonomyError> {
    if found < min {
        return Err(TaxonomyError::Arity {
            function: name.to_string(),
            expected: format!("at least {min}"),
            found,
        });
    }
    Ok(())
}
