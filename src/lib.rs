//! Declarative API definitions compiled into executable query plans
//!
//! An API is data, not code: a stored document names a target collection, an
//! operation, a parameter tree, filters, and projections. The engine
//! validates the document against the collection schema, compiles its filter
//! tree into a predicate, and assembles a [`planner::QueryPlan`] a storage
//! engine can run. The [`memory`] executor interprets plans directly over
//! JSON rows.
//!
//! ## Quick start
//!
//! ```rust
//! use dynapi::definition::{validate_and_build, ApiDocument};
//! use dynapi::planner::{PlanRequest, QueryPlanner};
//! use dynapi::schema::{AttrKind, AttributeDef, Schema, SchemaRegistry};
//! use serde_json::json;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(Schema::new(
//!     "blog",
//!     "article",
//!     vec![
//!         AttributeDef::scalar("id", AttrKind::Integer),
//!         AttributeDef::scalar("title", AttrKind::String),
//!     ],
//! ));
//!
//! let doc: ApiDocument = serde_yaml::from_str(
//!     "slug: articles\n\
//!      app: blog\n\
//!      model: article\n\
//!      operation: list\n\
//!      ordering: title\n\
//!      filter:\n\
//!      - field: title\n  \
//!        operator: startswith\n  \
//!        value: R\n",
//! )
//! .unwrap();
//!
//! let schema = registry.resolve("blog", "article").unwrap();
//! let definition = validate_and_build(&doc, schema).unwrap();
//!
//! let planner = QueryPlanner::new(&registry);
//! let plan = planner.plan(&PlanRequest::new(&definition)).unwrap();
//!
//! let rows = vec![
//!     json!({"id": 1, "title": "Rust in Action"}),
//!     json!({"id": 2, "title": "Go in Practice"}),
//! ];
//! let out = dynapi::memory::execute(&plan, &rows).unwrap();
//! assert_eq!(out.len(), 1);
//! ```

// Error families shared by every layer
pub mod error;

// Collection schemas and the registry definitions validate against
pub mod schema;

// Expression mini-language for filters, annotations, and hooks
pub mod expr;

// Placeholder templating for set-field values
pub mod template;

// Stored definition documents, validation, and parameter coercion
pub mod definition;

// Filter tree to predicate compiler
pub mod filter;

// The stage pipeline assembling query plans
pub mod planner;

// Reference executor over JSON rows
pub mod memory;

// Definition persistence: cache-aside store, file and Postgres backends
pub mod store;

pub use error::{EngineError, EngineResult};
pub use planner::{PlanRequest, QueryPlan, QueryPlanner};
pub use store::ApiDefinitionStore;
