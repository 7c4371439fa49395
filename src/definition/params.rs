//! Caller parameter typing
//!
//! Validates and coerces a live request's parameter map against the
//! definition's parameter tree: required/default handling, array unwrapping,
//! per-type coercion, and recursive descent into JSON-typed parameters whose
//! children describe the payload's fields.

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use super::rules::ParamType;
use super::{ParamArena, ParamSpec};
use crate::error::ParameterError;

/// Coerce the caller's parameters against the definition's tree
///
/// Returns a new map containing only declared parameters, each coerced to
/// its declared type. Unknown caller keys are ignored.
pub fn coerce_parameters(
    arena: &ParamArena,
    caller: &Map<String, Value>,
) -> Result<Map<String, Value>, ParameterError> {
    let mut out = Map::new();
    for &root in arena.root_ids() {
        let spec = arena.get(root);
        if let Some(value) = coerce_one(arena, root, caller.get(&spec.name))? {
            out.insert(spec.name.clone(), value);
        }
    }
    Ok(out)
}

fn coerce_one(
    arena: &ParamArena,
    id: usize,
    supplied: Option<&Value>,
) -> Result<Option<Value>, ParameterError> {
    let spec = arena.get(id);
    let value = match supplied {
        Some(v) if !v.is_null() => v.clone(),
        _ => match &spec.default {
            Some(d) => d.clone(),
            None if spec.required => {
                return Err(ParameterError::MissingRequired {
                    parameter: spec.name.clone(),
                })
            }
            None => return Ok(None),
        },
    };

    if spec.is_array {
        let Value::Array(items) = value else {
            return Err(ParameterError::ExpectedArray {
                parameter: spec.name.clone(),
            });
        };
        let coerced = items
            .iter()
            .map(|item| coerce_value(arena, spec, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Some(Value::Array(coerced)));
    }

    coerce_value(arena, spec, &value).map(Some)
}

fn coerce_value(
    arena: &ParamArena,
    spec: &ParamSpec,
    value: &Value,
) -> Result<Value, ParameterError> {
    let mismatch = |found: &Value| ParameterError::TypeMismatch {
        parameter: spec.name.clone(),
        expected: spec.ptype.to_string(),
        found: type_label(found).to_string(),
    };

    match spec.ptype {
        ParamType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(other)),
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch(value)),
            },
            other => Err(mismatch(other)),
        },
        ParamType::Int | ParamType::PageIdx | ParamType::PageSize => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| mismatch(value)),
            other => Err(mismatch(other)),
        },
        ParamType::Decimal => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => Decimal::from_str(s)
                .map(|d| Value::String(d.to_string()))
                .map_err(|_| mismatch(value)),
            other => Err(mismatch(other)),
        },
        // PKs come from storage as integers or opaque string ids
        ParamType::Pk => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) if !s.is_empty() => Ok(value.clone()),
            other => Err(mismatch(other)),
        },
        ParamType::Json => {
            if spec.children.is_empty() {
                return Ok(value.clone());
            }
            // Children describe the expected object fields
            let Value::Object(map) = value else {
                return Err(mismatch(value));
            };
            let mut out = Map::new();
            for &child_id in &spec.children {
                let child = arena.get(child_id);
                if let Some(v) = coerce_one(arena, child_id, map.get(&child.name))? {
                    out.insert(child.name.clone(), v);
                }
            }
            Ok(Value::Object(out))
        }
    }
}

fn type_label(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
