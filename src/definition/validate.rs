//! Definition validation
//!
//! Depth-first construction of the parameter and filter trees with per-node
//! fail-fast checks, then a post-pass for the invariants that only hold over
//! the finished tree (exactly-one-PK cannot be verified incrementally).
//! Validation never touches persistence; a failed save leaves nothing
//! behind.

use tracing::debug;

use super::document::{ApiDocument, FilterNode, ParamNode};
use super::rules::{Operation, ParamType};
use super::{ApiDefinition, DisplayField, ParamArena, ParamSpec, SetField};
use crate::error::DefinitionError;
use crate::schema::Schema;

/// Validate a document against its target schema and build the model
pub fn validate_and_build(
    doc: &ApiDocument,
    schema: &Schema,
) -> Result<ApiDefinition, DefinitionError> {
    let operation =
        Operation::parse(&doc.operation).ok_or_else(|| DefinitionError::UnknownOperation {
            operation: doc.operation.clone(),
        })?;
    let rules = operation.rules();

    // func_name is required exactly when the operation is FUNC
    match (&doc.func_name, rules.requires_func_name) {
        (None, true) => return Err(DefinitionError::FuncNameMissing),
        (Some(_), false) => {
            return Err(DefinitionError::FuncNameNotAllowed {
                operation: operation.to_string(),
            })
        }
        _ => {}
    }

    let mut arena = ParamArena::new();
    for node in &doc.parameter {
        build_parameter(node, None, 0, operation, &mut arena)?;
    }

    if !doc.filter.is_empty() && !rules.allows_filter {
        return Err(DefinitionError::FilterNotAllowed {
            operation: operation.to_string(),
        });
    }
    for node in &doc.filter {
        validate_filter(node)?;
    }

    if !doc.display_field.is_empty() && !rules.allows_display_field {
        return Err(DefinitionError::DisplayFieldNotAllowed {
            operation: operation.to_string(),
        });
    }

    if !doc.set_field.is_empty() && !rules.allows_set_field {
        return Err(DefinitionError::SetFieldNotAllowed {
            operation: operation.to_string(),
        });
    }
    let mut set_fields = Vec::with_capacity(doc.set_field.len());
    for sf in &doc.set_field {
        // Set-field names must be real attributes of the target collection
        if !schema.has_attribute(sf.name()) {
            return Err(DefinitionError::SetFieldUnknownAttribute {
                name: sf.name().to_string(),
                namespace: schema.namespace.clone(),
                model: schema.model.clone(),
            });
        }
        set_fields.push(SetField {
            name: sf.name().to_string(),
            value: sf.value_template(),
        });
    }

    // Post-pass invariants over the finished trees
    if rules.requires_pk {
        let pk_count = arena
            .roots()
            .filter(|p| p.ptype == ParamType::Pk)
            .count();
        if pk_count != 1 {
            return Err(DefinitionError::PkCardinality {
                operation: operation.to_string(),
                found: pk_count,
            });
        }
    }
    if rules.requires_filter && doc.filter.is_empty() {
        return Err(DefinitionError::FilterRequired {
            operation: operation.to_string(),
        });
    }

    debug!(
        slug = %doc.slug,
        operation = %operation,
        parameters = arena.len(),
        filters = doc.filter.len(),
        "definition validated"
    );

    Ok(ApiDefinition {
        slug: doc.slug.clone(),
        namespace: doc.app.clone(),
        model: doc.model.clone(),
        operation,
        summary: doc.summary.clone(),
        ordering: doc.ordering.clone(),
        expand_fields: doc.expand_fields.clone(),
        func_name: doc.func_name.clone(),
        demo: doc.demo.clone(),
        parameters: arena,
        display_fields: doc
            .display_field
            .iter()
            .map(|d| DisplayField::parse(d.name()))
            .collect(),
        set_fields,
        filters: doc.filter.clone(),
    })
}

/// Build one parameter node and its subtree, validating as each node is
/// created so the first violation names the offending parameter
fn build_parameter(
    node: &ParamNode,
    parent: Option<usize>,
    layer: u32,
    operation: Operation,
    arena: &mut ParamArena,
) -> Result<usize, DefinitionError> {
    let ptype =
        ParamType::parse(&node.type_name).ok_or_else(|| DefinitionError::UnknownParamType {
            parameter: node.name.clone(),
            type_name: node.type_name.clone(),
        })?;

    if ptype.is_special() {
        // Control parameters never nest inside structured payloads
        if layer > 0 {
            return Err(DefinitionError::SpecialTypeNested {
                parameter: node.name.clone(),
                type_name: ptype.to_string(),
            });
        }
        if !operation.rules().allowed_special.contains(&ptype) {
            return Err(DefinitionError::ParamTypeNotAllowed {
                parameter: node.name.clone(),
                type_name: ptype.to_string(),
                operation: operation.to_string(),
            });
        }
    }

    let duplicate = match parent {
        Some(pid) => arena.children(pid).any(|c| c.name == node.name),
        None => arena.roots().any(|c| c.name == node.name),
    };
    if duplicate {
        return Err(DefinitionError::DuplicateParameter {
            parameter: node.name.clone(),
            layer,
        });
    }

    let id = arena.push(ParamSpec {
        name: node.name.clone(),
        ptype,
        required: node.required,
        is_array: node.is_array,
        default: node.default.clone(),
        desc: node.desc.clone(),
        parent,
        layer,
        children: Vec::new(),
    });

    for child in &node.children {
        build_parameter(child, Some(id), layer + 1, operation, arena)?;
    }
    Ok(id)
}

/// Containers must have at least one child; leaves are structurally free
/// (partially-specified leaves are the compiler's leniency, not an error)
fn validate_filter(node: &FilterNode) -> Result<(), DefinitionError> {
    match node {
        FilterNode::Container { operator, children } => {
            if children.is_empty() {
                return Err(DefinitionError::EmptyFilterContainer {
                    operator: operator.clone().unwrap_or_else(|| "and".to_string()),
                });
            }
            for child in children {
                validate_filter(child)?;
            }
            Ok(())
        }
        FilterNode::Leaf { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrKind, AttributeDef};
    use serde_json::json;

    fn article_schema() -> Schema {
        Schema::new(
            "blog",
            "article",
            vec![
                AttributeDef::scalar("id", AttrKind::Integer),
                AttributeDef::scalar("title", AttrKind::String),
                AttributeDef::scalar("body", AttrKind::String),
                AttributeDef::relation("author", "blog.author", false),
            ],
        )
    }

    fn doc(value: serde_json::Value) -> ApiDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn retrieve_requires_exactly_one_pk() {
        let schema = article_schema();
        let ok = doc(json!({
            "slug": "s1", "app": "blog", "model": "article", "operation": "retrieve",
            "parameter": [{"name": "id", "type": "pk", "required": true}]
        }));
        assert!(validate_and_build(&ok, &schema).is_ok());

        let none = doc(json!({
            "slug": "s1", "app": "blog", "model": "article", "operation": "retrieve",
            "parameter": []
        }));
        let err = validate_and_build(&none, &schema).unwrap_err();
        assert!(matches!(err, DefinitionError::PkCardinality { found: 0, .. }));

        let two = doc(json!({
            "slug": "s1", "app": "blog", "model": "article", "operation": "retrieve",
            "parameter": [
                {"name": "id", "type": "pk", "required": true},
                {"name": "id2", "type": "pk", "required": true}
            ]
        }));
        let err = validate_and_build(&two, &schema).unwrap_err();
        assert!(matches!(err, DefinitionError::PkCardinality { found: 2, .. }));
    }

    #[test]
    fn conditional_mutation_requires_filter() {
        let schema = article_schema();
        let missing = doc(json!({
            "slug": "bulk", "app": "blog", "model": "article",
            "operation": "delete_by_condition"
        }));
        let err = validate_and_build(&missing, &schema).unwrap_err();
        assert!(matches!(err, DefinitionError::FilterRequired { .. }));

        let ok = doc(json!({
            "slug": "bulk", "app": "blog", "model": "article",
            "operation": "delete_by_condition",
            "filter": [{"field": "status", "operator": "=", "value": "draft"}]
        }));
        assert!(validate_and_build(&ok, &schema).is_ok());
    }

    #[test]
    fn page_params_only_on_list() {
        let schema = article_schema();
        let ok = doc(json!({
            "slug": "l", "app": "blog", "model": "article", "operation": "list",
            "parameter": [
                {"name": "page", "type": "page_idx", "required": false},
                {"name": "size", "type": "page_size", "required": false}
            ]
        }));
        assert!(validate_and_build(&ok, &schema).is_ok());

        let bad = doc(json!({
            "slug": "c", "app": "blog", "model": "article", "operation": "create",
            "parameter": [{"name": "page", "type": "page_idx", "required": false}]
        }));
        let err = validate_and_build(&bad, &schema).unwrap_err();
        assert!(matches!(err, DefinitionError::ParamTypeNotAllowed { .. }));
    }

    #[test]
    fn special_types_forbidden_in_nested_parameters() {
        let schema = article_schema();
        let bad = doc(json!({
            "slug": "u", "app": "blog", "model": "article", "operation": "update",
            "parameter": [
                {"name": "id", "type": "pk", "required": true},
                {"name": "payload", "type": "json", "required": true, "children": [
                    {"name": "inner", "type": "pk", "required": false}
                ]}
            ]
        }));
        let err = validate_and_build(&bad, &schema).unwrap_err();
        assert!(
            matches!(err, DefinitionError::SpecialTypeNested { ref parameter, .. } if parameter == "inner")
        );
    }

    #[test]
    fn nested_layers_are_assigned() {
        let schema = article_schema();
        let d = doc(json!({
            "slug": "c", "app": "blog", "model": "article", "operation": "create",
            "parameter": [
                {"name": "payload", "type": "json", "required": true, "children": [
                    {"name": "title", "type": "string", "required": true},
                    {"name": "meta", "type": "json", "required": false, "children": [
                        {"name": "lang", "type": "string", "required": false}
                    ]}
                ]}
            ]
        }));
        let def = validate_and_build(&d, &schema).unwrap();
        let layers: Vec<u32> = (0..def.parameters.len())
            .map(|i| def.parameters.get(i).layer)
            .collect();
        assert_eq!(layers, vec![0, 1, 1, 2]);
    }

    #[test]
    fn setfield_must_be_schema_attribute() {
        let schema = article_schema();
        let bad = doc(json!({
            "slug": "c", "app": "blog", "model": "article", "operation": "create",
            "setfield": [["nonexistent", "${x}"]]
        }));
        let err = validate_and_build(&bad, &schema).unwrap_err();
        assert!(
            matches!(err, DefinitionError::SetFieldUnknownAttribute { ref name, .. } if name == "nonexistent")
        );
    }

    #[test]
    fn default_set_fields_cover_non_special_params() {
        let schema = article_schema();
        let d = doc(json!({
            "slug": "u", "app": "blog", "model": "article", "operation": "update",
            "parameter": [
                {"name": "id", "type": "pk", "required": true},
                {"name": "title", "type": "string", "required": false},
                {"name": "body", "type": "string", "required": false}
            ]
        }));
        let def = validate_and_build(&d, &schema).unwrap();
        let effective = def.effective_set_fields();
        assert_eq!(
            effective,
            vec![
                SetField {
                    name: "title".into(),
                    value: "${title}".into()
                },
                SetField {
                    name: "body".into(),
                    value: "${body}".into()
                },
            ]
        );
    }

    #[test]
    fn func_name_iff_func_operation() {
        let schema = article_schema();
        let missing = doc(json!({
            "slug": "f", "app": "blog", "model": "article", "operation": "func"
        }));
        assert!(matches!(
            validate_and_build(&missing, &schema).unwrap_err(),
            DefinitionError::FuncNameMissing
        ));

        let stray = doc(json!({
            "slug": "l", "app": "blog", "model": "article", "operation": "list",
            "func_name": "refresh"
        }));
        assert!(matches!(
            validate_and_build(&stray, &schema).unwrap_err(),
            DefinitionError::FuncNameNotAllowed { .. }
        ));
    }

    #[test]
    fn filters_rejected_on_non_filter_operations() {
        let schema = article_schema();
        let bad = doc(json!({
            "slug": "c", "app": "blog", "model": "article", "operation": "create",
            "filter": [{"field": "x", "operator": "=", "value": 1}]
        }));
        assert!(matches!(
            validate_and_build(&bad, &schema).unwrap_err(),
            DefinitionError::FilterNotAllowed { .. }
        ));
    }

    #[test]
    fn empty_filter_container_rejected() {
        let schema = article_schema();
        let bad = doc(json!({
            "slug": "l", "app": "blog", "model": "article", "operation": "list",
            "filter": [{"operator": "or", "children": []}]
        }));
        assert!(matches!(
            validate_and_build(&bad, &schema).unwrap_err(),
            DefinitionError::EmptyFilterContainer { .. }
        ));
    }
}
