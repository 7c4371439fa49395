//! Operation kinds and their per-kind validation rules
//!
//! The rules live in a data table keyed by operation so adding an operation
//! is a table edit, not scattered conditionals.

use serde::{Deserialize, Serialize};

/// The nine operation kinds an API definition can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Retrieve,
    Create,
    Update,
    Replace,
    Delete,
    UpdateByCondition,
    DeleteByCondition,
    Func,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "list" => Some(Self::List),
            "retrieve" => Some(Self::Retrieve),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "replace" => Some(Self::Replace),
            "delete" => Some(Self::Delete),
            "update_by_condition" => Some(Self::UpdateByCondition),
            "delete_by_condition" => Some(Self::DeleteByCondition),
            "func" => Some(Self::Func),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Retrieve => "retrieve",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::UpdateByCondition => "update_by_condition",
            Self::DeleteByCondition => "delete_by_condition",
            Self::Func => "func",
        }
    }

    pub fn rules(&self) -> &'static OperationRules {
        &RULES[*self as usize]
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter value types
///
/// Pk, PageIdx and PageSize are "special" control types with
/// operation-specific legality, and are never legal inside a nested
/// parameter structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Boolean,
    Int,
    Decimal,
    Json,
    Pk,
    PageIdx,
    PageSize,
}

impl ParamType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "int" => Some(Self::Int),
            "decimal" => Some(Self::Decimal),
            "json" => Some(Self::Json),
            "pk" => Some(Self::Pk),
            "page_idx" => Some(Self::PageIdx),
            "page_size" => Some(Self::PageSize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Json => "json",
            Self::Pk => "pk",
            Self::PageIdx => "page_idx",
            Self::PageSize => "page_size",
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self, Self::Pk | Self::PageIdx | Self::PageSize)
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation rules for one operation kind
#[derive(Debug, Clone)]
pub struct OperationRules {
    /// Special parameter types legal at the root level
    pub allowed_special: &'static [ParamType],
    /// Exactly one root-level PK parameter is mandatory
    pub requires_pk: bool,
    /// Filters are legal at all
    pub allows_filter: bool,
    /// At least one filter is mandatory (no unconditional bulk mutation)
    pub requires_filter: bool,
    pub allows_display_field: bool,
    pub allows_set_field: bool,
    pub requires_func_name: bool,
}

/// Indexed by `Operation as usize`; order must match the enum
static RULES: [OperationRules; 9] = [
    // List
    OperationRules {
        allowed_special: &[ParamType::PageIdx, ParamType::PageSize],
        requires_pk: false,
        allows_filter: true,
        requires_filter: false,
        allows_display_field: true,
        allows_set_field: false,
        requires_func_name: false,
    },
    // Retrieve
    OperationRules {
        allowed_special: &[ParamType::Pk],
        requires_pk: true,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: true,
        allows_set_field: false,
        requires_func_name: false,
    },
    // Create
    OperationRules {
        allowed_special: &[],
        requires_pk: false,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: true,
        allows_set_field: true,
        requires_func_name: false,
    },
    // Update
    OperationRules {
        allowed_special: &[ParamType::Pk],
        requires_pk: true,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: true,
        allows_set_field: true,
        requires_func_name: false,
    },
    // Replace
    OperationRules {
        allowed_special: &[ParamType::Pk],
        requires_pk: true,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: true,
        allows_set_field: true,
        requires_func_name: false,
    },
    // Delete
    OperationRules {
        allowed_special: &[ParamType::Pk],
        requires_pk: true,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: false,
        allows_set_field: false,
        requires_func_name: false,
    },
    // UpdateByCondition
    OperationRules {
        allowed_special: &[],
        requires_pk: false,
        allows_filter: true,
        requires_filter: true,
        allows_display_field: false,
        allows_set_field: true,
        requires_func_name: false,
    },
    // DeleteByCondition
    OperationRules {
        allowed_special: &[],
        requires_pk: false,
        allows_filter: true,
        requires_filter: true,
        allows_display_field: false,
        allows_set_field: false,
        requires_func_name: false,
    },
    // Func
    OperationRules {
        allowed_special: &[],
        requires_pk: false,
        allows_filter: false,
        requires_filter: false,
        allows_display_field: false,
        allows_set_field: false,
        requires_func_name: true,
    },
];
