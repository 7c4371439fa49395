//! Target collection metadata
//!
//! The storage engine itself is an external collaborator; this module is the
//! narrow contract the engine consumes: per-collection attribute metadata,
//! declared annotations, ownership/permission flags, and the registry that
//! resolves a `namespace.model` pair to a schema.
//!
//! Schemas are declared up front (YAML or code) and held immutable for the
//! life of the registry; planner and validator only ever read them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LookupError;

/// Scalar kind of an attribute, as reported by the storage engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Json,
    Uuid,
    Relation,
}

/// One attribute of a target collection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default)]
    pub kind: AttrKind,
    /// True for forward and reverse relation fields
    #[serde(default)]
    pub is_relation: bool,
    /// True when a join through this attribute can multiply rows
    #[serde(default)]
    pub is_to_many: bool,
    /// True for reverse accessors (the related model declares the link)
    #[serde(default)]
    pub is_reverse: bool,
    /// Storage accessor when it differs from the conceptual name
    /// (reverse relations expose e.g. `book_set` for conceptual `books`)
    #[serde(default)]
    pub accessor: Option<String>,
    /// Related collection for relation attributes, as `namespace.model`
    #[serde(default)]
    pub related: Option<String>,
}

impl AttributeDef {
    pub fn scalar(name: &str, kind: AttrKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            is_relation: false,
            is_to_many: false,
            is_reverse: false,
            accessor: None,
            related: None,
        }
    }

    pub fn relation(name: &str, related: &str, to_many: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: AttrKind::Relation,
            is_relation: true,
            is_to_many: to_many,
            is_reverse: false,
            accessor: None,
            related: Some(related.to_string()),
        }
    }

    pub fn reverse(name: &str, related: &str, accessor: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AttrKind::Relation,
            is_relation: true,
            is_to_many: true,
            is_reverse: true,
            accessor: Some(accessor.to_string()),
            related: Some(related.to_string()),
        }
    }

    /// Storage-level accessor name (falls back to the conceptual name)
    pub fn accessor_name(&self) -> &str {
        self.accessor.as_deref().unwrap_or(&self.name)
    }
}

/// Declarative description of one target collection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schema {
    pub namespace: String,
    pub model: String,
    pub attributes: Vec<AttributeDef>,
    /// Declared computed attributes: name -> expression text, resolved by the
    /// expression interpreter at annotation time
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Attribute holding the owning principal's id
    #[serde(default)]
    pub owner_field: Option<String>,
    /// When set, non-superusers are restricted to rows they own
    #[serde(default)]
    pub filter_by_login_user: bool,
    /// Name of a registered base-queryset hook, invoked before filtering
    #[serde(default)]
    pub queryset_hook: Option<String>,
    /// Name of a registered post-filter override hook
    #[serde(default)]
    pub override_hook: Option<String>,
    /// Whether row-level permission grants apply to this collection
    #[serde(default)]
    pub row_permissions: bool,
    /// Parent-link attribute for hierarchical (tree) collections
    #[serde(default)]
    pub tree_parent_field: Option<String>,
}

impl Schema {
    pub fn new(namespace: &str, model: &str, attributes: Vec<AttributeDef>) -> Self {
        Self {
            namespace: namespace.to_string(),
            model: model.to_string(),
            attributes,
            annotations: HashMap::new(),
            owner_field: None,
            filter_by_login_user: false,
            queryset_hook: None,
            override_hook: None,
            row_permissions: false,
            tree_parent_field: None,
        }
    }

    /// Qualified `namespace.model` name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.model)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute lookup that also accepts the storage accessor name
    pub fn attribute_by_any_name(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes
            .iter()
            .find(|a| a.name == name || a.accessor_name() == name)
    }
}

/// Resolves `namespace.model` pairs to schemas
///
/// Built once at startup from declarations; replaces any ambient global
/// model registry with an explicitly constructed instance.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.qualified_name(), schema);
    }

    pub fn resolve(&self, namespace: &str, model: &str) -> Result<&Schema, LookupError> {
        self.schemas
            .get(&format!("{namespace}.{model}"))
            .ok_or_else(|| LookupError::SchemaNotFound {
                namespace: namespace.to_string(),
                model: model.to_string(),
            })
    }

    pub fn resolve_qualified(&self, qualified: &str) -> Result<&Schema, LookupError> {
        let (namespace, model) = qualified.split_once('.').unwrap_or(("", qualified));
        self.resolve(namespace, model)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_schema() -> Schema {
        Schema::new(
            "library",
            "book",
            vec![
                AttributeDef::scalar("id", AttrKind::Integer),
                AttributeDef::scalar("title", AttrKind::String),
                AttributeDef::relation("author", "library.author", false),
                AttributeDef::relation("tags", "library.tag", true),
            ],
        )
    }

    #[test]
    fn resolve_known_and_unknown() {
        let mut registry = SchemaRegistry::new();
        registry.register(book_schema());

        assert!(registry.resolve("library", "book").is_ok());
        let err = registry.resolve("library", "shelf").unwrap_err();
        assert_eq!(err.code(), "lookup.schema");
    }

    #[test]
    fn reverse_accessor_name() {
        let attr = AttributeDef::reverse("books", "library.book", "book_set");
        assert_eq!(attr.accessor_name(), "book_set");
        assert!(attr.is_to_many && attr.is_reverse);
    }

    #[test]
    fn attribute_by_any_name_finds_accessor() {
        let mut schema = book_schema();
        schema
            .attributes
            .push(AttributeDef::reverse("reviews", "library.review", "review_set"));
        assert!(schema.attribute_by_any_name("review_set").is_some());
        assert!(schema.attribute_by_any_name("reviews").is_some());
    }
}
