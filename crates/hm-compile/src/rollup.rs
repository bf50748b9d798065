//! Compile-time ancestor map for the pre-aggregation rollup pass.

use crate::branch::BranchSet;
use crate::precedence::FormulaPlan;
use crate::resolver::ResolvedGraph;
use hm_core::{HierarchyId, HierarchyTree};
use std::collections::{BTreeMap, BTreeSet};

/// `(child, ancestor)` pairs: rows mapped onto `child` roll into `ancestor`.
///
/// Only ancestors that some formula reads raw get pairs, and a pair exists
/// only when every node from the child up to (not including) the ancestor
/// keeps its `include_flag`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupMap {
    pairs: Vec<(HierarchyId, HierarchyId)>,
}

impl RollupMap {
    pub fn build(
        tree: &HierarchyTree<'_>,
        targets: &BTreeSet<HierarchyId>,
        mapped: &BTreeSet<HierarchyId>,
    ) -> Self {
        let mut pairs = Vec::new();
        for target in targets {
            for descendant in tree.descendants(target.as_str()) {
                if !mapped.contains(&descendant.hierarchy_id) {
                    continue;
                }
                if included_up_to(tree, descendant.hierarchy_id.as_str(), target.as_str()) {
                    pairs.push((descendant.hierarchy_id.clone(), target.clone()));
                }
            }
        }
        pairs.sort();
        pairs.dedup();
        Self { pairs }
    }

    /// Ancestor map for the nodes `plan` reads raw, over the nodes that
    /// receive branch rows.
    pub fn for_plan(graph: &ResolvedGraph<'_>, plan: &FormulaPlan, branches: &BranchSet<'_>) -> Self {
        Self::build(graph.tree(), &plan.raw_reads(), &branches.mapped_node_ids())
    }

    pub fn pairs(&self) -> &[(HierarchyId, HierarchyId)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Raw value per node: its own mapped value plus the rollup of its
    /// mapped descendants. Mirrors `LEVEL_0` of the final mart.
    pub fn apply(&self, own: &BTreeMap<HierarchyId, f64>) -> BTreeMap<HierarchyId, f64> {
        let mut out = own.clone();
        for (child, ancestor) in &self.pairs {
            if let Some(value) = own.get(child) {
                *out.entry(ancestor.clone()).or_insert(0.0) += value;
            }
        }
        out
    }
}

fn included_up_to(tree: &HierarchyTree<'_>, from: &str, ancestor: &str) -> bool {
    let mut current = tree.node(from);
    while let Some(node) = current {
        if node.hierarchy_id == ancestor {
            return true;
        }
        if !node.include_flag {
            return false;
        }
        current = tree.parent(node.hierarchy_id.as_str());
    }
    false
}
