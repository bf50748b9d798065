//! Error types for hm-compile
//!
//! Every variant carries a stable issue code. Fatal variants abort the
//! compile of a mart; the rest are collected and reported together.

use crate::issue::Severity;
use hm_core::{HierarchyId, OrphanReason};
use thiserror::Error;

/// Kind of reference a metadata object makes to another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferenceKind {
    /// `formula_param_ref` of a rule
    FormulaParamRef,
    /// `hierarchy_id` of a rule
    RuleHierarchyId,
    /// `main_hierarchy_id` of a formula group
    MainHierarchyId,
    /// `formula_group_ref.formula_group_id` of a node
    FormulaGroupRef,
    /// `filter_group_ref.filter_group_id` of a node
    FilterGroupRef,
    /// `hierarchy_id` of a source mapping
    MappingHierarchyId,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReferenceKind::FormulaParamRef => "formula_param_ref",
            ReferenceKind::RuleHierarchyId => "rule hierarchy_id",
            ReferenceKind::MainHierarchyId => "main_hierarchy_id",
            ReferenceKind::FormulaGroupRef => "formula_group_ref",
            ReferenceKind::FilterGroupRef => "filter_group_ref",
            ReferenceKind::MappingHierarchyId => "mapping hierarchy_id",
        };
        f.write_str(label)
    }
}

/// Compile error type for Hiermart
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// C001: Reference to a missing or inactive object
    #[error("[C001] Unresolved {ref_kind} '{ref_value}' from '{from_node_id}'")]
    UnresolvedReference {
        ref_kind: ReferenceKind,
        ref_value: String,
        from_node_id: String,
    },

    /// C002: Calculated nodes read each other's computed values in a loop
    #[error("[C002] Circular formula dependency: {}", format_cycle(.cycle_node_ids))]
    CircularFormula { cycle_node_ids: Vec<HierarchyId> },

    /// C003: DIVIDE by the constant 0
    #[error("[C003] Division by constant zero in formula group '{formula_group_id}' (rule on '{hierarchy_id}')")]
    DivisionByZeroConstant {
        formula_group_id: String,
        hierarchy_id: String,
    },

    /// C004: Active node whose parent does not resolve
    #[error("[C004] Orphan node '{hierarchy_id}': parent '{parent_id}' {reason}")]
    OrphanNode {
        hierarchy_id: String,
        parent_id: String,
        reason: OrphanReason,
    },

    /// C005: Bridge weights for one source key do not add up to 1.0
    #[error("[C005] Allocation weights for '{source_key}' in branch '{branch}' sum to {total}, expected 1.0")]
    AllocationIncomplete {
        branch: String,
        source_key: String,
        total: f64,
    },

    /// C006: Two emitted objects resolve to the same name
    #[error("[C006] Object name collision: '{first}' and '{second}'")]
    NamingCollision { first: String, second: String },

    /// C007: Parent links form a loop
    #[error("[C007] Parent cycle: {}", format_cycle(.cycle))]
    ParentCycle { cycle: Vec<HierarchyId> },

    /// C008: Hierarchy id used by more than one node
    #[error("[C008] Duplicate hierarchy id '{hierarchy_id}' ({count} nodes)")]
    DuplicateHierarchyId { hierarchy_id: String, count: usize },

    /// C009: Calculated node without a formula group
    #[error("[C009] Calculated node '{hierarchy_id}' has no formula group")]
    CalculationWithoutFormula { hierarchy_id: String },

    /// C010: Calculated node with a source mapping
    #[error("[C010] Calculated node '{hierarchy_id}' carries source mapping '{source_uid}'")]
    CalculationWithMapping {
        hierarchy_id: String,
        source_uid: String,
    },

    /// C011: Leaf node without an active source mapping
    #[error("[C011] Leaf node '{hierarchy_id}' has no active source mapping")]
    LeafWithoutMapping { hierarchy_id: String },

    /// C012: Leaf node owning a formula group
    #[error("[C012] Leaf node '{hierarchy_id}' owns formula group '{formula_group_id}'")]
    LeafWithFormula {
        hierarchy_id: String,
        formula_group_id: String,
    },

    /// C013: Formula ownership is ambiguous
    #[error("[C013] Formula group '{formula_group_id}': {details}")]
    MultipleFormulaOwners {
        formula_group_id: String,
        hierarchy_id: String,
        details: String,
    },

    /// C014: One source key mapped to several nodes under one join pattern
    #[error("[C014] Source key '{source_key}' in {} maps to several nodes: {}", format_branches(.branches), .hierarchy_ids.join(", "))]
    ConflictingMapping {
        branches: Vec<String>,
        source_key: String,
        hierarchy_ids: Vec<String>,
    },

    /// C015: No join pattern accepts a mapping
    #[error("[C015] No join pattern accepts mapping '{source_uid}' of '{hierarchy_id}' (precedence group '{precedence_group}'): {details}")]
    NoJoinPattern {
        hierarchy_id: String,
        source_uid: String,
        precedence_group: String,
        details: String,
    },

    /// C016: Emitted body reads a relation nothing produces
    #[error("[C016] {object} references '{relation}', which is neither an emitted object nor a mart input")]
    MissingUpstream { object: String, relation: String },

    /// C017: Emitted body is not a single parseable SELECT
    #[error("[C017] Emitted SQL for {object} is invalid: {details}")]
    InvalidEmittedSql { object: String, details: String },

    /// C018: Filter group cannot be rendered as a predicate
    #[error("[C018] Invalid filter group '{filter_group_id}': {details}")]
    InvalidFilterCondition {
        filter_group_id: String,
        details: String,
    },

    /// C019: Mart config has a shape problem
    #[error("[C019] Invalid mart config '{mart}': {details}")]
    InvalidMartConfig { mart: String, details: String },

    /// C020: Mart config name not present in the snapshot
    #[error("[C020] Mart config not found: {name}")]
    MartConfigNotFound { name: String },

    /// C021: NaN or infinite formula constant
    #[error("[C021] Formula group '{formula_group_id}' rule on '{hierarchy_id}' has a non-finite constant")]
    InvalidFormulaConstant {
        formula_group_id: String,
        hierarchy_id: String,
    },

    /// W001: Overlapping source patterns under one join pattern
    #[error("[W001] Overlapping patterns under join pattern '{join_pattern}': '{first}' ({first_node}, branch '{first_branch}') and '{second}' ({second_node}, branch '{second_branch}'); the most specific wins")]
    AmbiguousMapping {
        join_pattern: String,
        first: String,
        first_branch: String,
        first_node: String,
        second: String,
        second_branch: String,
        second_node: String,
    },

    /// W002: The same node maps one key twice under one join pattern
    #[error("[W002] Node '{hierarchy_id}' maps '{source_key}' more than once in {}", format_branches(.branches))]
    DuplicateMapping {
        branches: Vec<String>,
        source_key: String,
        hierarchy_id: String,
    },

    /// W003: MULTIPLY/DIVIDE constant dropped because volume_flag is unset
    #[error("[W003] Constant on {operation} rule for '{hierarchy_id}' in formula group '{formula_group_id}' is ignored without volume_flag")]
    ConstantIgnored {
        formula_group_id: String,
        hierarchy_id: String,
        operation: String,
    },

    /// W004: Formula group without rules
    #[error("[W004] Formula group '{formula_group_id}' of '{hierarchy_id}' has no rules")]
    EmptyFormulaGroup {
        formula_group_id: String,
        hierarchy_id: String,
    },
}

impl CompileError {
    /// Stable issue code, e.g. `C001`.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::UnresolvedReference { .. } => "C001",
            CompileError::CircularFormula { .. } => "C002",
            CompileError::DivisionByZeroConstant { .. } => "C003",
            CompileError::OrphanNode { .. } => "C004",
            CompileError::AllocationIncomplete { .. } => "C005",
            CompileError::NamingCollision { .. } => "C006",
            CompileError::ParentCycle { .. } => "C007",
            CompileError::DuplicateHierarchyId { .. } => "C008",
            CompileError::CalculationWithoutFormula { .. } => "C009",
            CompileError::CalculationWithMapping { .. } => "C010",
            CompileError::LeafWithoutMapping { .. } => "C011",
            CompileError::LeafWithFormula { .. } => "C012",
            CompileError::MultipleFormulaOwners { .. } => "C013",
            CompileError::ConflictingMapping { .. } => "C014",
            CompileError::NoJoinPattern { .. } => "C015",
            CompileError::MissingUpstream { .. } => "C016",
            CompileError::InvalidEmittedSql { .. } => "C017",
            CompileError::InvalidFilterCondition { .. } => "C018",
            CompileError::InvalidMartConfig { .. } => "C019",
            CompileError::MartConfigNotFound { .. } => "C020",
            CompileError::InvalidFormulaConstant { .. } => "C021",
            CompileError::AmbiguousMapping { .. } => "W001",
            CompileError::DuplicateMapping { .. } => "W002",
            CompileError::ConstantIgnored { .. } => "W003",
            CompileError::EmptyFormulaGroup { .. } => "W004",
        }
    }

    /// Default severity before configuration overrides.
    pub fn severity(&self) -> Severity {
        if self.code().starts_with('W') {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    /// Whether the error stops the pipeline at the stage that found it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompileError::UnresolvedReference { .. }
                | CompileError::CircularFormula { .. }
                | CompileError::DivisionByZeroConstant { .. }
                | CompileError::MartConfigNotFound { .. }
                | CompileError::InvalidFormulaConstant { .. }
        )
    }

    /// Node the issue is about, when there is one.
    pub fn hierarchy_id(&self) -> Option<&str> {
        match self {
            CompileError::UnresolvedReference { from_node_id, .. } => Some(from_node_id),
            CompileError::CircularFormula { cycle_node_ids } => {
                cycle_node_ids.first().map(|id| id.as_str())
            }
            CompileError::ParentCycle { cycle } => cycle.first().map(|id| id.as_str()),
            CompileError::DivisionByZeroConstant { hierarchy_id, .. }
            | CompileError::OrphanNode { hierarchy_id, .. }
            | CompileError::DuplicateHierarchyId { hierarchy_id, .. }
            | CompileError::CalculationWithoutFormula { hierarchy_id }
            | CompileError::CalculationWithMapping { hierarchy_id, .. }
            | CompileError::LeafWithoutMapping { hierarchy_id }
            | CompileError::LeafWithFormula { hierarchy_id, .. }
            | CompileError::MultipleFormulaOwners { hierarchy_id, .. }
            | CompileError::NoJoinPattern { hierarchy_id, .. }
            | CompileError::InvalidFormulaConstant { hierarchy_id, .. }
            | CompileError::DuplicateMapping { hierarchy_id, .. }
            | CompileError::ConstantIgnored { hierarchy_id, .. }
            | CompileError::EmptyFormulaGroup { hierarchy_id, .. } => Some(hierarchy_id),
            CompileError::AmbiguousMapping { first_node, .. } => Some(first_node),
            CompileError::ConflictingMapping { hierarchy_ids, .. } => {
                hierarchy_ids.first().map(String::as_str)
            }
            CompileError::AllocationIncomplete { .. }
            | CompileError::NamingCollision { .. }
            | CompileError::MissingUpstream { .. }
            | CompileError::InvalidEmittedSql { .. }
            | CompileError::InvalidFilterCondition { .. }
            | CompileError::InvalidMartConfig { .. }
            | CompileError::MartConfigNotFound { .. } => None,
        }
    }
}

/// Render a cycle as `A -> B -> A`.
fn format_cycle(cycle: &[HierarchyId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// `branch 'A'` or `branches 'A', 'B'`.
fn format_branches(branches: &[String]) -> String {
    let quoted: Vec<String> = branches.iter().map(|b| format!("'{}'", b)).collect();
    match quoted.len() {
        1 => format!("branch {}", quoted[0]),
        _ => format!("branches {}", quoted.join(", ")),
    }
}
