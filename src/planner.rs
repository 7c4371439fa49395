//! Query planner
//!
//! Assembles the final read query for a definition as one linear pipeline:
//!
//! 1. expand (eager-load paths, fetch-narrowed to the display projection)
//! 2. annotate (schema-declared computed attributes)
//! 3. schema queryset hook
//! 4. ownership filter (minimum-trust baseline, always before conditions)
//! 5. condition filter (client < admin default < role mandatory), which also
//!    decides the distinct flag from to-many joins
//! 6. ordering
//! 7. tree restriction
//! 8. admin override hook
//! 9. row-level permission guard
//! 10. distinct
//!
//! The stages must not be reordered: distinct before the condition filter
//! would be a no-op, and ownership after the condition filter could let a
//! mislayered admin default leak rows a principal must never see.
//!
//! The output is a [`QueryPlan`] — a declarative handle the storage engine
//! (or the in-memory executor) runs; nothing here touches storage.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::definition::{ApiDefinition, FilterNode};
use crate::error::{EngineError, LookupError};
use crate::filter::{self, Predicate, PATH_SEPARATOR};
use crate::schema::{Schema, SchemaRegistry};

/// Analytic call sites compute their own aggregation pipeline downstream and
/// skip annotation and de-duplication here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanPurpose {
    #[default]
    Standard,
    Aggregate,
}

/// The caller's identity, as reported by the auth collaborator
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub id: Option<Value>,
    pub is_superuser: bool,
    pub groups: Vec<String>,
}

/// Group-derived filter overrides, merged above the admin defaults
#[derive(Debug, Clone, Default)]
pub struct RoleContext {
    /// Admin-declared default filters (middle priority)
    pub default_filters: Vec<FilterNode>,
    /// Role-declared mandatory filters (highest priority)
    pub mandatory_filters: Vec<FilterNode>,
    /// Hard override: always de-duplicate for this role
    pub force_distinct: bool,
}

/// Hierarchical-mode restriction: rows whose parent link equals the root
/// value
#[derive(Debug, Clone)]
pub struct TreeContext {
    pub root_value: Value,
}

/// Everything one plan invocation needs
pub struct PlanRequest<'a> {
    pub definition: &'a ApiDefinition,
    pub principal: Principal,
    /// Client-supplied filter tree (lowest priority)
    pub caller_filters: Vec<FilterNode>,
    /// Context object for `expression` filter leaves
    pub caller_ctx: Value,
    pub role: RoleContext,
    pub tree: Option<TreeContext>,
    pub purpose: PlanPurpose,
    /// Row ids granted to the principal/groups, when row permissions apply
    pub permitted_ids: Option<Vec<Value>>,
    /// Request-level ordering override; falls back to the definition's
    pub ordering: Option<Vec<String>>,
}

impl<'a> PlanRequest<'a> {
    pub fn new(definition: &'a ApiDefinition) -> Self {
        Self {
            definition,
            principal: Principal::default(),
            caller_filters: Vec::new(),
            caller_ctx: Value::Null,
            role: RoleContext::default(),
            tree: None,
            purpose: PlanPurpose::Standard,
            permitted_ids: None,
            ordering: None,
        }
    }
}

/// One eager-load instruction
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    /// Conceptual dotted path
    pub path: String,
    /// Storage accessor path (`a__b`)
    pub storage_path: String,
    /// To-many paths become prefetches, to-one paths become joins
    pub to_many: bool,
    /// Fetch-narrowing: only these fields of the target, when the display
    /// projection names them
    pub fields: Option<Vec<String>>,
}

/// Schema-declared computed attribute attached to the plan
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub path: String,
    pub descending: bool,
}

impl OrderKey {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(path) => Self {
                path: path.to_string(),
                descending: true,
            },
            None => Self {
                path: raw.to_string(),
                descending: false,
            },
        }
    }
}

/// The assembled queryable handle
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    /// Qualified `namespace.model` of the base collection
    pub collection: String,
    pub eager: Vec<EagerLoad>,
    pub annotations: Vec<Annotation>,
    pub predicate: Option<Predicate>,
    pub ordering: Vec<OrderKey>,
    /// `(parent_field, root_value)` when hierarchical mode applies
    pub tree_restriction: Option<(String, Value)>,
    pub permitted_ids: Option<Vec<Value>>,
    pub distinct: bool,
}

/// Post-construction reshaping hook, registered by name
pub type PlanHook = Box<dyn for<'a> Fn(QueryPlan, &PlanRequest<'a>) -> QueryPlan + Send + Sync>;

/// Builds query plans against a schema registry
pub struct QueryPlanner<'r> {
    registry: &'r SchemaRegistry,
    hooks: HashMap<String, PlanHook>,
}

impl<'r> QueryPlanner<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            hooks: HashMap::new(),
        }
    }

    /// Register a named hook referenced by `Schema::queryset_hook` or
    /// `Schema::override_hook`
    pub fn register_hook(&mut self, name: impl Into<String>, hook: PlanHook) {
        self.hooks.insert(name.into(), hook);
    }

    /// Run the pipeline and return the final plan
    pub fn plan(&self, request: &PlanRequest<'_>) -> Result<QueryPlan, EngineError> {
        let def = request.definition;
        let schema = self.registry.resolve(&def.namespace, &def.model)?;

        let mut plan = QueryPlan {
            collection: schema.qualified_name(),
            ..QueryPlan::default()
        };

        // 1. Expand
        self.expand(&mut plan, schema, def)?;

        // 2. Annotate (analytic call sites aggregate downstream instead)
        if request.purpose == PlanPurpose::Standard {
            self.annotate(&mut plan, schema, def);
        }

        // 3. Schema queryset hook
        if let Some(hook) = schema.queryset_hook.as_ref().and_then(|n| self.hooks.get(n)) {
            plan = hook(plan, request);
        }

        // 4. Ownership: the minimum-trust baseline, applied before any
        // condition so a mislayered default filter cannot widen visibility.
        // It narrows whatever base the queryset hook produced, never
        // replaces it.
        if let Some(owner) = self.ownership_predicate(schema, &request.principal) {
            plan.predicate = Some(match plan.predicate.take() {
                Some(existing) => Predicate::And(vec![existing, owner]),
                None => owner,
            });
        }

        // 5. Condition filter, merged in ascending priority
        let mut merged: Vec<FilterNode> = Vec::new();
        merged.extend(request.caller_filters.iter().cloned());
        merged.extend(def.filters.iter().cloned());
        merged.extend(request.role.default_filters.iter().cloned());
        merged.extend(request.role.mandatory_filters.iter().cloned());

        if let Some(compiled) = filter::compile(&merged, &request.caller_ctx)? {
            plan.predicate = Some(match plan.predicate.take() {
                Some(existing) => Predicate::And(vec![existing, compiled]),
                None => compiled,
            });
        }
        let mut needs_distinct = false;
        for root in filter::touched_roots(&merged) {
            if let Some(attr) = schema.attribute_by_any_name(&root) {
                if attr.is_to_many {
                    needs_distinct = true;
                    break;
                }
            }
        }

        // 6. Ordering
        let ordering = request.ordering.as_ref().unwrap_or(&def.ordering);
        plan.ordering = ordering.iter().map(|o| OrderKey::parse(o)).collect();

        // 7. Tree restriction
        if let (Some(tree), Some(parent_field)) =
            (request.tree.as_ref(), schema.tree_parent_field.as_ref())
        {
            plan.tree_restriction = Some((parent_field.clone(), tree.root_value.clone()));
        }

        // 8. Admin override hook
        if let Some(hook) = schema.override_hook.as_ref().and_then(|n| self.hooks.get(n)) {
            plan = hook(plan, request);
        }

        // 9. Row-level permission guard, schema-allow-listed
        if schema.row_permissions {
            if let Some(ids) = &request.permitted_ids {
                plan.permitted_ids = Some(ids.clone());
            }
        }

        // 10. Distinct
        if request.purpose == PlanPurpose::Standard {
            plan.distinct = needs_distinct || request.role.force_distinct;
        }

        debug!(
            collection = %plan.collection,
            eager = plan.eager.len(),
            distinct = plan.distinct,
            "query plan assembled"
        );
        Ok(plan)
    }

    /// Stage 1: resolve expand paths through the schema graph, emitting one
    /// eager-load instruction per path prefix with accessor-corrected
    /// storage paths and display-projection narrowing
    fn expand(
        &self,
        plan: &mut QueryPlan,
        schema: &Schema,
        def: &ApiDefinition,
    ) -> Result<(), EngineError> {
        for path in &def.expand_fields {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            let mut current = schema;
            let mut storage_segments: Vec<String> = Vec::new();
            let mut conceptual: Vec<String> = Vec::new();
            let mut to_many = false;

            for segment in segments {
                let attr = current.attribute_by_any_name(segment).ok_or_else(|| {
                    LookupError::AttributeNotFound {
                        attribute: segment.to_string(),
                        namespace: current.namespace.clone(),
                        model: current.model.clone(),
                    }
                })?;
                if !attr.is_relation {
                    return Err(LookupError::AttributeNotFound {
                        attribute: segment.to_string(),
                        namespace: current.namespace.clone(),
                        model: current.model.clone(),
                    }
                    .into());
                }
                to_many |= attr.is_to_many;
                storage_segments.push(attr.accessor_name().to_string());
                conceptual.push(attr.name.clone());

                let prefix = conceptual.join(".");
                if !plan.eager.iter().any(|e| e.path == prefix) {
                    plan.eager.push(EagerLoad {
                        path: prefix.clone(),
                        storage_path: storage_segments.join(PATH_SEPARATOR),
                        to_many,
                        fields: narrow_fields(def, &prefix),
                    });
                }

                current = match attr.related.as_deref() {
                    Some(related) => self.registry.resolve_qualified(related)?,
                    None => current,
                };
            }
        }
        Ok(())
    }

    /// Stage 2: attach declared annotations, restricted to the display
    /// projection when one is given
    fn annotate(&self, plan: &mut QueryPlan, schema: &Schema, def: &ApiDefinition) {
        let projected: Vec<&str> = def
            .display_fields
            .iter()
            .filter(|d| !d.exclude)
            .map(|d| d.path.split('.').next().unwrap_or(&d.path))
            .collect();

        let mut names: Vec<&String> = schema.annotations.keys().collect();
        names.sort();
        for name in names {
            if !projected.is_empty() && !projected.contains(&name.as_str()) {
                continue;
            }
            plan.annotations.push(Annotation {
                name: name.clone(),
                expression: schema.annotations[name].clone(),
            });
        }
    }

    /// Stage 4 predicate, when the schema ties rows to an owning principal
    fn ownership_predicate(&self, schema: &Schema, principal: &Principal) -> Option<Predicate> {
        if principal.is_superuser || !schema.filter_by_login_user {
            return None;
        }
        let owner_field = schema.owner_field.as_ref()?;
        let id = principal.id.clone()?;
        Some(Predicate::Cmp(crate::filter::Comparison {
            path: vec![owner_field.clone()],
            op: crate::filter::CompareOp::Eq,
            value: id,
        }))
    }
}

/// Display-field names directly under `prefix`, or None when the projection
/// does not narrow this branch
fn narrow_fields(def: &ApiDefinition, prefix: &str) -> Option<Vec<String>> {
    if def.display_fields.is_empty() {
        return None;
    }
    let dotted = format!("{prefix}.");
    let mut fields = Vec::new();
    for d in &def.display_fields {
        if d.exclude {
            continue;
        }
        // A wildcard over this branch cancels narrowing
        if d.wildcard && (d.path == prefix || prefix.starts_with(&format!("{}.", d.path))) {
            return None;
        }
        if let Some(rest) = d.path.strip_prefix(&dotted) {
            if !rest.is_empty() && !rest.contains('.') {
                fields.push(rest.to_string());
            }
        }
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}
