//! Placeholder substitution for stored filter and set-field value templates
//!
//! Two placeholder families:
//!
//! - `${name}` — caller-supplied parameter, stringified from the live
//!   parameter map; an absent name is a [`ParameterError`].
//! - `#{name}` — server-computed value from a fixed provider registry
//!   (current user id, current user display name, literal true/false/null).
//!
//! Both families resolve in one left-to-right scan over the original
//! template. Substituted values are spliced verbatim and never rescanned, so
//! a caller parameter whose value happens to contain `#{...}` or `${...}`
//! stays literal text instead of triggering another substitution.
//!
//! Doubled sentinels unescape last: `$$` -> `$`, `{{` -> `{`, `}}` -> `}`,
//! `##` -> `#`. Unescaping must run after substitution: a literal `${`
//! produced by unescaping must never be mistaken for a live placeholder.

use serde_json::Value;

use crate::error::ParameterError;

/// Server-side values available to `#{...}` placeholders
#[derive(Debug, Clone, Default)]
pub struct ServerContext {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl ServerContext {
    pub fn for_user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            user_name: Some(name.into()),
        }
    }

    /// Fixed provider registry; unknown names fail substitution
    fn provide(&self, name: &str) -> Option<String> {
        match name {
            "user_id" => Some(self.user_id.clone().unwrap_or_default()),
            "user_name" => Some(self.user_name.clone().unwrap_or_default()),
            "true" => Some("true".to_string()),
            "false" => Some("false".to_string()),
            "null" => Some("null".to_string()),
            _ => None,
        }
    }
}

/// Substitute both placeholder families and unescape sentinels
pub fn substitute(
    template: &str,
    caller_params: &serde_json::Map<String, Value>,
    server_ctx: &ServerContext,
) -> Result<String, ParameterError> {
    let resolved = replace_placeholders(template, |sentinel, name| {
        if sentinel == '$' {
            caller_params
                .get(name)
                .map(stringify)
                .ok_or_else(|| ParameterError::UndefinedPlaceholder {
                    name: name.to_string(),
                })
        } else {
            server_ctx
                .provide(name)
                .ok_or_else(|| ParameterError::UnknownProvider {
                    name: name.to_string(),
                })
        }
    })?;
    Ok(unescape(&resolved))
}

/// Single scan resolving both sentinel families
///
/// A doubled sentinel is copied through untouched (the unescape pass owns
/// it); `<sentinel>{name}` is resolved and the value spliced without being
/// rescanned; a bare sentinel is literal text.
fn replace_placeholders<F>(input: &str, mut resolve: F) -> Result<String, ParameterError>
where
    F: FnMut(char, &str) -> Result<String, ParameterError>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != '$' && c != '#' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some((_, next)) if next == c => {
                // Escaped sentinel, leave both for the unescape pass
                out.push(c);
                out.push(c);
                chars.next();
            }
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, nc) in chars.by_ref() {
                    if nc == '}' {
                        closed = true;
                        break;
                    }
                    name.push(nc);
                }
                if !closed {
                    return Err(ParameterError::UnterminatedPlaceholder { position: pos });
                }
                out.push_str(&resolve(c, name.trim())?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        let doubled = matches!(c, '$' | '{' | '}' | '#') && chars.peek() == Some(&c);
        if doubled {
            chars.next();
        }
        out.push(c);
    }
    out
}

/// Stringify a parameter value for splicing into a template
///
/// Strings splice bare (no quotes); everything else renders as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
