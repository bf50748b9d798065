//! hm-compile - Hierarchy-to-SQL compiler for Hiermart
//!
//! Turns a metadata snapshot and a mart config into the four chained
//! warehouse objects of a hierarchy mart:
//!
//! - `VW_1` translates hierarchy and mapping rows into match keys
//! - `DT_2` unpivots them to one row per measure
//! - `DT_3A` joins the fact table once per join branch and rolls leaves up
//! - `DT_3` evaluates calculated nodes layer by layer
//!
//! Every problem found along the way is reported as an [`Issue`]; any
//! error-severity issue withholds the objects.

pub mod branch;
pub mod emit;
pub mod error;
pub mod issue;
pub mod pipeline;
pub mod precedence;
pub mod resolver;
pub mod rollup;
pub mod validator;

#[cfg(test)]
mod test_fixtures;

pub use branch::{Branch, BranchSet, Resolution};
pub use emit::{Layer, LayerObject, ObjectNames, ObjectType};
pub use error::{CompileError, ReferenceKind};
pub use issue::{Issue, IssueCollector, Severity};
pub use pipeline::{compile, compile_mart, CompileOptions, CompileOutput};
pub use precedence::{FormulaExpr, FormulaPlan, Operand};
pub use resolver::ResolvedGraph;
pub use rollup::RollupMap;
