//! Hierarchy nodes: the named entities of a reporting tree.

use crate::ids::{FilterGroupId, FormulaGroupId, HierarchyId};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};

/// Role a node plays in the formula group it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaRole {
    /// The node owns the group and receives its computed value
    Main,
    /// The node feeds one rule of another node's group
    Contributor,
}

impl std::fmt::Display for FormulaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormulaRole::Main => write!(f, "MAIN"),
            FormulaRole::Contributor => write!(f, "CONTRIBUTOR"),
        }
    }
}

/// Pointer from a node to the formula group it owns or contributes to.
///
/// Storing the reference on the node (instead of copying rule data) keeps one
/// physical copy of every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaGroupReference {
    pub formula_group_id: FormulaGroupId,
    pub role: FormulaRole,
}

/// Non-owning pointer from a node to a shared filter group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterGroupRef {
    pub filter_group_id: FilterGroupId,
}

/// A named node in a reporting tree (e.g. "Gross Profit").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyNode {
    /// Stable caller-assigned id, unique within the project
    pub hierarchy_id: HierarchyId,

    /// Display name
    pub name: String,

    /// Parent node; `None` marks a root
    #[serde(default)]
    pub parent_id: Option<HierarchyId>,

    /// Sibling ordering (ascending, ties broken by insertion order)
    #[serde(default)]
    pub sort_order: i64,

    /// Whether the node's rows roll up into its ancestors
    #[serde(default = "default_true")]
    pub include_flag: bool,

    /// Whether the node's mapped rows are dropped from the mart
    #[serde(default)]
    pub exclude_flag: bool,

    /// Inactive nodes are invisible to the compiler
    #[serde(default = "default_true")]
    pub active_flag: bool,

    /// Value is computed by a formula group instead of source mappings
    #[serde(default)]
    pub calculation_flag: bool,

    /// Value comes from source mappings
    #[serde(default)]
    pub is_leaf: bool,

    #[serde(default)]
    pub formula_group_ref: Option<FormulaGroupReference>,

    #[serde(default)]
    pub filter_group_ref: Option<FilterGroupRef>,
}

impl HierarchyNode {
    /// Create an active root node with default flags.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            hierarchy_id: HierarchyId::new(id),
            name: name.to_string(),
            parent_id: None,
            sort_order: 0,
            include_flag: true,
            exclude_flag: false,
            active_flag: true,
            calculation_flag: false,
            is_leaf: false,
            formula_group_ref: None,
            filter_group_ref: None,
        }
    }

    /// Attach the node under `parent`.
    pub fn under(mut self, parent: &str) -> Self {
        self.parent_id = Some(HierarchyId::new(parent));
        self
    }

    /// Mark the node as a mapped leaf.
    pub fn leaf(mut self) -> Self {
        self.is_leaf = true;
        self
    }

    /// Mark the node as calculated.
    pub fn calculated(mut self) -> Self {
        self.calculation_flag = true;
        self
    }

    /// Set the sibling sort order.
    pub fn sorted(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Reference a formula group with the given role.
    pub fn with_formula_ref(mut self, group: &str, role: FormulaRole) -> Self {
        self.formula_group_ref = Some(FormulaGroupReference {
            formula_group_id: FormulaGroupId::new(group),
            role,
        });
        self
    }

    /// Reference a shared filter group.
    pub fn with_filter_group(mut self, group: &str) -> Self {
        self.filter_group_ref = Some(FilterGroupRef {
            filter_group_id: FilterGroupId::new(group),
        });
        self
    }

    /// Deactivate the node.
    pub fn inactive(mut self) -> Self {
        self.active_flag = false;
        self
    }

    /// True when the node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
