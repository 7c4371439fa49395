//! Persisted definition document shape
//!
//! The logical wire form a definition is stored and exchanged in. Lenient in
//! the places older clients were lenient: `ordering`/`expand_fields` accept
//! a comma-separated string or a list; display fields accept a bare string
//! or `{name}`; set fields accept a `[name, value]` pair or a
//! `{name, value}` map.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One stored API definition, as persisted (keyed by slug)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiDocument {
    pub slug: String,
    /// Target collection namespace
    pub app: String,
    /// Target collection name
    pub model: String,
    pub operation: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub ordering: Vec<String>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub expand_fields: Vec<String>,
    #[serde(default)]
    pub func_name: Option<String>,
    /// Example payload, advisory only
    #[serde(default)]
    pub demo: Option<Value>,
    #[serde(default)]
    pub parameter: Vec<ParamNode>,
    #[serde(default, rename = "displayfield")]
    pub display_field: Vec<DisplayFieldDoc>,
    #[serde(default, rename = "setfield")]
    pub set_field: Vec<SetFieldDoc>,
    #[serde(default)]
    pub filter: Vec<FilterNode>,
}

/// One parameter node; nesting describes structured payloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParamNode {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub children: Vec<ParamNode>,
}

/// Recursive boolean filter tree
///
/// A container carries `operator` (AND/OR) and children; a leaf carries
/// `field`/`operator` plus either a literal `value` or an `expression`.
/// Leaf keys are all optional: a leaf missing `field` or `operator` is
/// skipped at compile time rather than rejected, for compatibility with
/// partially-specified filters from older clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FilterNode {
    Container {
        #[serde(default)]
        operator: Option<String>,
        children: Vec<FilterNode>,
    },
    Leaf {
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        operator: Option<String>,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        expression: Option<String>,
    },
}

/// Display field selector: bare string or `{name}` form
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DisplayFieldDoc {
    Name(String),
    Entry { name: String },
}

impl DisplayFieldDoc {
    pub fn name(&self) -> &str {
        match self {
            DisplayFieldDoc::Name(s) => s,
            DisplayFieldDoc::Entry { name } => name,
        }
    }
}

/// Set field: `[name, value]` pair or `{name, value}` map
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SetFieldDoc {
    Pair(String, String),
    Entry {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl SetFieldDoc {
    pub fn name(&self) -> &str {
        match self {
            SetFieldDoc::Pair(name, _) => name,
            SetFieldDoc::Entry { name, .. } => name,
        }
    }

    /// Value template; defaults to `${name}` when omitted
    pub fn value_template(&self) -> String {
        match self {
            SetFieldDoc::Pair(_, value) => value.clone(),
            SetFieldDoc::Entry { name, value } => value
                .clone()
                .unwrap_or_else(|| format!("${{{name}}}")),
        }
    }
}

/// Accepts `"a,b"` or `["a", "b"]`
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Form {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Form::deserialize(deserializer)? {
        Form::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Form::Many(v) => v,
    })
}
