//! hm-core - Core library for Hiermart
//!
//! This crate provides the metadata model (hierarchy nodes, source mappings,
//! formula groups, filter groups, mart configurations), the immutable
//! [`Snapshot`] the compiler reads from, the ownership tree, the dependency
//! DAG primitive, and project configuration/discovery.

pub mod checksum;
pub mod config;
pub mod dag;
pub mod error;
pub mod filter;
pub mod formula;
pub mod hierarchy;
pub mod ids;
pub mod mapping;
pub mod mart;
mod newtype_string;
pub mod project;
pub(crate) mod serde_helpers;
pub mod snapshot;
pub mod sql_utils;
pub mod tree;

pub use checksum::{compute_checksum, compute_json_checksum};
pub use config::{CompileDefaults, Config, ConfigSeverity, Dialect, ValidationConfig};
pub use dag::FormulaDag;
pub use error::{CoreError, CoreResult};
pub use filter::{FilterCondition, FilterGroup, FilterLogic, FilterOperator};
pub use formula::{FormulaGroup, FormulaRule, Operation};
pub use hierarchy::{FilterGroupRef, FormulaGroupReference, FormulaRole, HierarchyNode};
pub use ids::{FilterGroupId, FormulaGroupId, HierarchyId};
pub use mapping::{SourceMapping, SourcePattern, EXACT_SPECIFICITY};
pub use mart::{
    JoinKey, JoinPattern, LayerNameOverrides, MartConfig, MeasureColumn, MeasureKind,
    IMPLICIT_PATTERN_NAME, RESERVED_COLUMNS,
};
pub use project::Project;
pub use snapshot::{MetadataSource, Snapshot, SnapshotFragment};
pub use tree::{HierarchyTree, OrphanNode, OrphanReason};
