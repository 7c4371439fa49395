//! API definition model
//!
//! Documents ([`ApiDocument`]) are the persisted wire form; validation
//! builds them into an [`ApiDefinition`] whose parameter tree lives in an
//! integer-indexed arena (parent pointer + layer + child index lists) rather
//! than a live object graph.

mod document;
mod params;
mod rules;
mod validate;

pub use document::{ApiDocument, DisplayFieldDoc, FilterNode, ParamNode, SetFieldDoc};
pub use params::coerce_parameters;
pub use rules::{Operation, OperationRules, ParamType};
pub use validate::validate_and_build;

use serde_json::Value;

/// A validated API definition, ready for compilation and planning
#[derive(Debug, Clone)]
pub struct ApiDefinition {
    pub slug: String,
    pub namespace: String,
    pub model: String,
    pub operation: Operation,
    pub summary: Option<String>,
    /// Field paths, `-` prefix for descending
    pub ordering: Vec<String>,
    /// Dotted relation paths requested for eager loading
    pub expand_fields: Vec<String>,
    /// Present exactly when operation is FUNC
    pub func_name: Option<String>,
    pub demo: Option<Value>,
    pub parameters: ParamArena,
    pub display_fields: Vec<DisplayField>,
    pub set_fields: Vec<SetField>,
    /// Validated filter tree, kept in document form for the compiler
    pub filters: Vec<FilterNode>,
}

impl ApiDefinition {
    /// Set fields with the default-assignment rule applied: when the
    /// operation supports set fields but declares none, every non-special
    /// root parameter maps to the identically-named attribute with value
    /// `${param}`.
    pub fn effective_set_fields(&self) -> Vec<SetField> {
        if !self.operation.rules().allows_set_field {
            return Vec::new();
        }
        if !self.set_fields.is_empty() {
            return self.set_fields.clone();
        }
        self.parameters
            .roots()
            .filter(|p| !p.ptype.is_special())
            .map(|p| SetField {
                name: p.name.clone(),
                value: format!("${{{}}}", p.name),
            })
            .collect()
    }

    /// The single root-level PK parameter, when the operation requires one
    pub fn pk_parameter(&self) -> Option<&ParamSpec> {
        self.parameters.roots().find(|p| p.ptype == ParamType::Pk)
    }
}

/// Arena-allocated parameter tree
///
/// Nodes are pushed parent-before-children during document parsing, so
/// `layer` and the parent link are always known before a child is validated.
#[derive(Debug, Clone, Default)]
pub struct ParamArena {
    nodes: Vec<ParamSpec>,
    roots: Vec<usize>,
}

/// One validated parameter node
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ptype: ParamType,
    pub required: bool,
    pub is_array: bool,
    pub default: Option<Value>,
    pub desc: Option<String>,
    pub parent: Option<usize>,
    /// 0 for root parameters
    pub layer: u32,
    pub children: Vec<usize>,
}

impl ParamArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, spec: ParamSpec) -> usize {
        let id = self.nodes.len();
        let parent = spec.parent;
        self.nodes.push(spec);
        match parent {
            Some(pid) => self.nodes[pid].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: usize) -> &ParamSpec {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &ParamSpec> {
        self.roots.iter().map(|&id| &self.nodes[id])
    }

    pub fn root_ids(&self) -> &[usize] {
        &self.roots
    }

    pub fn children(&self, id: usize) -> impl Iterator<Item = &ParamSpec> {
        self.nodes[id].children.iter().map(|&c| &self.nodes[c])
    }
}

/// Output-field selector
///
/// `-path` excludes a field ("all but this"); `path.*` selects everything
/// under a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayField {
    pub path: String,
    pub exclude: bool,
    pub wildcard: bool,
}

impl DisplayField {
    /// Parse the exclusion and wildcard markers off a raw selector
    pub fn parse(raw: &str) -> Self {
        let (exclude, rest) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (wildcard, path) = match rest.strip_suffix(".*").or_else(|| {
            if rest == "*" {
                Some("")
            } else {
                None
            }
        }) {
            Some(path) => (true, path),
            None => (false, rest),
        };
        Self {
            path: path.to_string(),
            exclude,
            wildcard,
        }
    }
}

/// A (`name`, value-template) assignment for write operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetField {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_links_parent_and_layer() {
        let mut arena = ParamArena::new();
        let root = arena.push(ParamSpec {
            name: "payload".into(),
            ptype: ParamType::Json,
            required: true,
            is_array: false,
            default: None,
            desc: None,
            parent: None,
            layer: 0,
            children: vec![],
        });
        let child = arena.push(ParamSpec {
            name: "title".into(),
            ptype: ParamType::String,
            required: false,
            is_array: false,
            default: None,
            desc: None,
            parent: Some(root),
            layer: 1,
            children: vec![],
        });

        assert_eq!(arena.get(child).parent, Some(root));
        assert_eq!(arena.get(root).children, vec![child]);
        assert_eq!(arena.roots().count(), 1);
    }

    #[test]
    fn display_field_markers() {
        let f = DisplayField::parse("-internal_notes");
        assert!(f.exclude && !f.wildcard);
        assert_eq!(f.path, "internal_notes");

        let f = DisplayField::parse("author.profile.*");
        assert!(f.wildcard && !f.exclude);
        assert_eq!(f.path, "author.profile");

        let f = DisplayField::parse("title");
        assert!(!f.exclude && !f.wildcard);
    }
}
