//! Error types for hm-core

use crate::ids::HierarchyId;
use thiserror::Error;

/// Core error type for Hiermart
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Project directory not found
    #[error("[E003] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E005: Failed to parse a metadata or mart file
    #[error("[E005] Failed to parse {path}: {details}")]
    MetadataParseError { path: String, details: String },

    /// E006: Mart file missing or carrying the wrong `kind`
    #[error("[E006] Invalid 'kind' in {path}: expected 'mart', found '{found}'")]
    MartInvalidKind { path: String, found: String },

    /// E007: Two mart files declare the same mart name
    #[error("[E007] Duplicate mart name '{name}' in {path1} and {path2}")]
    DuplicateMart {
        name: String,
        path1: String,
        path2: String,
    },

    /// E008: Join pattern name already used in the mart
    #[error("[E008] Join pattern '{pattern}' already exists in mart '{mart}'")]
    DuplicateJoinPattern { mart: String, pattern: String },

    /// E009: Join pattern name not present in the mart
    #[error("[E009] Join pattern '{pattern}' not found in mart '{mart}'")]
    JoinPatternNotFound { mart: String, pattern: String },

    /// E010: Filter group still referenced by hierarchy nodes
    #[error("[E010] Filter group '{filter_group_id}' is referenced by: {}", .referenced_by.join(", "))]
    FilterGroupInUse {
        filter_group_id: String,
        referenced_by: Vec<String>,
    },

    /// E011: Empty name where a non-empty identifier is required
    #[error("[E011] Empty name in {context}")]
    EmptyName { context: String },

    /// E012: Filter condition cannot be rendered
    #[error("[E012] Invalid filter condition in filter group '{filter_group_id}': {message}")]
    InvalidFilterCondition {
        filter_group_id: String,
        message: String,
    },

    /// E013: Circular dependency detected
    #[error("[E013] Circular dependency detected: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<HierarchyId> },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render a cycle as `A -> B -> A`.
pub(crate) fn format_cycle(cycle: &[HierarchyId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
