//! Error handling for the declarative API engine
//!
//! Four error families with different blame assignments: definition errors
//! reject a save before anything is persisted, lookup errors surface as
//! not-found, parameter errors blame the caller's input, and taxonomy errors
//! indicate a corrupt stored definition (a server-side defect, not a 4xx).
//!
//! Every variant carries a stable machine-readable code plus the offending
//! field/parameter name so client tooling can highlight the broken node.

use thiserror::Error;

/// Top-level error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Stable machine-readable code for client tooling
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Definition(e) => e.code(),
            EngineError::Lookup(e) => e.code(),
            EngineError::Parameter(e) => e.code(),
            EngineError::Taxonomy(e) => e.code(),
            EngineError::Storage(_) => "storage",
        }
    }
}

/// Structural violations of the definition invariants
///
/// Detected during `validate_and_build`, always before any persistence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Unknown operation '{operation}'")]
    UnknownOperation { operation: String },

    #[error("Unknown parameter type '{type_name}' on parameter '{parameter}'")]
    UnknownParamType { parameter: String, type_name: String },

    #[error("Parameter type {type_name} is not allowed for operation {operation} (parameter '{parameter}')")]
    ParamTypeNotAllowed {
        parameter: String,
        type_name: String,
        operation: String,
    },

    #[error("Special parameter type {type_name} is not allowed inside nested parameter '{parameter}'")]
    SpecialTypeNested { parameter: String, type_name: String },

    #[error("Operation {operation} requires exactly one root-level PK parameter, found {found}")]
    PkCardinality { operation: String, found: usize },

    #[error("Operation {operation} requires at least one filter")]
    FilterRequired { operation: String },

    #[error("Filters are not allowed for operation {operation}")]
    FilterNotAllowed { operation: String },

    #[error("Filter container must have at least one child (operator '{operator}')")]
    EmptyFilterContainer { operator: String },

    #[error("Display fields are not allowed for operation {operation}")]
    DisplayFieldNotAllowed { operation: String },

    #[error("Set fields are not allowed for operation {operation}")]
    SetFieldNotAllowed { operation: String },

    #[error("Set field '{name}' is not an attribute of {namespace}.{model}")]
    SetFieldUnknownAttribute {
        name: String,
        namespace: String,
        model: String,
    },

    #[error("func_name is required for operation FUNC")]
    FuncNameMissing,

    #[error("func_name is only allowed for operation FUNC, found on operation {operation}")]
    FuncNameNotAllowed { operation: String },

    #[error("Duplicate parameter name '{parameter}' at layer {layer}")]
    DuplicateParameter { parameter: String, layer: u32 },

    #[error("Definition document is malformed: {message}")]
    Malformed { message: String },
}

impl DefinitionError {
    pub fn code(&self) -> &'static str {
        match self {
            DefinitionError::UnknownOperation { .. } => "definition.unknown_operation",
            DefinitionError::UnknownParamType { .. } => "definition.unknown_param_type",
            DefinitionError::ParamTypeNotAllowed { .. } => "definition.param_type_not_allowed",
            DefinitionError::SpecialTypeNested { .. } => "definition.special_type_nested",
            DefinitionError::PkCardinality { .. } => "definition.pk_cardinality",
            DefinitionError::FilterRequired { .. } => "definition.filter_required",
            DefinitionError::FilterNotAllowed { .. } => "definition.filter_not_allowed",
            DefinitionError::EmptyFilterContainer { .. } => "definition.empty_filter_container",
            DefinitionError::DisplayFieldNotAllowed { .. } => "definition.displayfield_not_allowed",
            DefinitionError::SetFieldNotAllowed { .. } => "definition.setfield_not_allowed",
            DefinitionError::SetFieldUnknownAttribute { .. } => "definition.setfield_unknown_attr",
            DefinitionError::FuncNameMissing => "definition.func_name_missing",
            DefinitionError::FuncNameNotAllowed { .. } => "definition.func_name_not_allowed",
            DefinitionError::DuplicateParameter { .. } => "definition.duplicate_parameter",
            DefinitionError::Malformed { .. } => "definition.malformed",
        }
    }
}

/// Unknown slug, schema, or attribute
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("No API definition for slug '{slug}'")]
    SlugNotFound { slug: String },

    #[error("Unknown collection {namespace}.{model}")]
    SchemaNotFound { namespace: String, model: String },

    #[error("Unknown attribute '{attribute}' on {namespace}.{model}")]
    AttributeNotFound {
        attribute: String,
        namespace: String,
        model: String,
    },
}

impl LookupError {
    pub fn code(&self) -> &'static str {
        match self {
            LookupError::SlugNotFound { .. } => "lookup.slug",
            LookupError::SchemaNotFound { .. } => "lookup.schema",
            LookupError::AttributeNotFound { .. } => "lookup.attribute",
        }
    }
}

/// Bad caller input: missing/mistyped parameters, undefined placeholders,
/// missing mandatory filters for conditional mutation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Missing required parameter '{parameter}'")]
    MissingRequired { parameter: String },

    #[error("Parameter '{parameter}' expects {expected}, got {found}")]
    TypeMismatch {
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("Parameter '{parameter}' expects an array")]
    ExpectedArray { parameter: String },

    #[error("Undefined placeholder '${{{name}}}' in template")]
    UndefinedPlaceholder { name: String },

    #[error("Unknown server-side placeholder '#{{{name}}}' in template")]
    UnknownProvider { name: String },

    #[error("Unterminated placeholder starting at position {position}")]
    UnterminatedPlaceholder { position: usize },

    #[error("Operation {operation} requires a filter; refusing unconditional bulk mutation")]
    UnconditionalMutation { operation: String },
}

impl ParameterError {
    pub fn code(&self) -> &'static str {
        match self {
            ParameterError::MissingRequired { .. } => "parameter.missing",
            ParameterError::TypeMismatch { .. } => "parameter.type",
            ParameterError::ExpectedArray { .. } => "parameter.array",
            ParameterError::UndefinedPlaceholder { .. } => "parameter.placeholder",
            ParameterError::UnknownProvider { .. } => "parameter.provider",
            ParameterError::UnterminatedPlaceholder { .. } => "parameter.unterminated",
            ParameterError::UnconditionalMutation { .. } => "parameter.unconditional_mutation",
        }
    }
}

/// Corrupt stored definition: unknown expression function or malformed
/// expression nesting
///
/// Unlike the other families this is a server-side defect alert. A stored
/// filter/annotation referencing a function that does not exist means the
/// definition itself is broken, not the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaxonomyError {
    #[error("Unknown expression function '{function}'")]
    UnknownFunction { function: String },

    #[error("Expression function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Malformed expression at '{fragment}': {message}")]
    Malformed { fragment: String, message: String },

    #[error("Expression evaluation failed in '{function}': {message}")]
    Evaluation { function: String, message: String },
}

impl TaxonomyError {
    pub fn code(&self) -> &'static str {
        match self {
            TaxonomyError::UnknownFunction { .. } => "taxonomy.unknown_function",
            TaxonomyError::Arity { .. } => "taxonomy.arity",
            TaxonomyError::Malformed { .. } => "taxonomy.malformed",
            TaxonomyError::Evaluation { .. } => "taxonomy.evaluation",
        }
    }
}

/// Backend persistence failures (database, filesystem, serialization)
#[derive(Error, Debug)]
pub enum StorageError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type aliases for convenience
pub type EngineResult<T> = Result<T, EngineError>;
pub type DefinitionResult<T> = Result<T, DefinitionError>;
