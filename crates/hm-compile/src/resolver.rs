//! Reference resolution over an immutable snapshot.
//!
//! Every `formula_param_ref`, rule `hierarchy_id`, `formula_group_ref` and
//! `filter_group_ref` of the active metadata is resolved to the object it
//! names. The result is a read-only [`ResolvedGraph`] the later stages share.

use crate::error::{CompileError, ReferenceKind};
use hm_core::{
    FilterGroup, FormulaGroup, FormulaRole, HierarchyNode, HierarchyTree, Snapshot, SourceMapping,
};
use std::collections::{BTreeMap, HashSet};

/// How a node takes part in a formula group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaMembership<'a> {
    pub formula_group_id: &'a str,
    pub role: FormulaRole,
    /// Precedence of the node's rule in the group (contributors only)
    pub precedence: Option<u32>,
    /// Sign flag of the node's rule in the group (contributors only)
    pub sign_change_flag: Option<bool>,
}

/// Snapshot with every reference resolved.
#[derive(Debug)]
pub struct ResolvedGraph<'a> {
    snapshot: &'a Snapshot,
    tree: HierarchyTree<'a>,
    /// Formula groups by id, first occurrence wins
    groups: BTreeMap<&'a str, &'a FormulaGroup>,
    /// Node id -> group computing its value
    formulas: BTreeMap<&'a str, &'a FormulaGroup>,
    filter_groups: BTreeMap<&'a str, &'a FilterGroup>,
    /// Active mappings onto active nodes, in snapshot order
    mappings: Vec<&'a SourceMapping>,
}

impl<'a> ResolvedGraph<'a> {
    /// Resolve the snapshot, returning every unresolved reference on failure.
    pub fn resolve(snapshot: &'a Snapshot) -> Result<Self, Vec<CompileError>> {
        let tree = HierarchyTree::build(&snapshot.hierarchy_nodes);
        let known: HashSet<&str> = snapshot
            .hierarchy_nodes
            .iter()
            .map(|n| n.hierarchy_id.as_str())
            .collect();
        let mut errors = Vec::new();

        let mut groups: BTreeMap<&'a str, &'a FormulaGroup> = BTreeMap::new();
        for group in &snapshot.formula_groups {
            groups.entry(group.formula_group_id.as_str()).or_insert(group);
        }
        let mut filter_groups: BTreeMap<&'a str, &'a FilterGroup> = BTreeMap::new();
        for group in &snapshot.filter_groups {
            filter_groups
                .entry(group.filter_group_id.as_str())
                .or_insert(group);
        }

        // Node-side references
        let mut formulas: BTreeMap<&'a str, &'a FormulaGroup> = BTreeMap::new();
        for node in active_nodes(&tree, snapshot) {
            let from = node.hierarchy_id.as_str();
            if let Some(reference) = &node.formula_group_ref {
                match groups.get(reference.formula_group_id.as_str()) {
                    Some(group) if reference.role == FormulaRole::Main => {
                        formulas.insert(from, *group);
                    }
                    Some(_) => {}
                    None => errors.push(CompileError::UnresolvedReference {
                        ref_kind: ReferenceKind::FormulaGroupRef,
                        ref_value: reference.formula_group_id.to_string(),
                        from_node_id: from.to_string(),
                    }),
                }
            }
            if let Some(reference) = &node.filter_group_ref {
                if !filter_groups.contains_key(reference.filter_group_id.as_str()) {
                    errors.push(CompileError::UnresolvedReference {
                        ref_kind: ReferenceKind::FilterGroupRef,
                        ref_value: reference.filter_group_id.to_string(),
                        from_node_id: from.to_string(),
                    });
                }
            }
        }

        // Group-side ownership
        for group in groups.values() {
            let main = group.main_hierarchy_id.as_str();
            if tree.contains(main) {
                formulas.entry(tree_key(&tree, main)).or_insert(*group);
            } else if known.contains(main) {
                log::warn!(
                    "Skipping formula group '{}': main node '{}' is inactive",
                    group.formula_group_id,
                    main
                );
            } else {
                errors.push(CompileError::UnresolvedReference {
                    ref_kind: ReferenceKind::MainHierarchyId,
                    ref_value: main.to_string(),
                    from_node_id: group.formula_group_id.to_string(),
                });
            }
        }

        // Rules of the groups in use
        for (owner, group) in &formulas {
            for rule in &group.rules {
                if !tree.contains(rule.hierarchy_id.as_str()) {
                    errors.push(CompileError::UnresolvedReference {
                        ref_kind: ReferenceKind::RuleHierarchyId,
                        ref_value: rule.hierarchy_id.to_string(),
                        from_node_id: owner.to_string(),
                    });
                }
                if let Some(param) = &rule.formula_param_ref {
                    if !tree.contains(param.as_str()) {
                        errors.push(CompileError::UnresolvedReference {
                            ref_kind: ReferenceKind::FormulaParamRef,
                            ref_value: param.to_string(),
                            from_node_id: owner.to_string(),
                        });
                    }
                }
            }
        }

        let mut mappings = Vec::new();
        for mapping in snapshot.source_mappings.iter().filter(|m| m.active_flag) {
            let target = mapping.hierarchy_id.as_str();
            if tree.contains(target) {
                mappings.push(mapping);
            } else if known.contains(target) {
                log::warn!(
                    "Skipping mapping '{}': node '{}' is inactive",
                    mapping.source_uid,
                    target
                );
            } else {
                errors.push(CompileError::UnresolvedReference {
                    ref_kind: ReferenceKind::MappingHierarchyId,
                    ref_value: target.to_string(),
                    from_node_id: format!("mapping {}", mapping.source_uid),
                });
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        log::debug!(
            "Resolved {} formula groups and {} mappings",
            formulas.len(),
            mappings.len()
        );
        Ok(Self {
            snapshot,
            tree,
            groups,
            formulas,
            filter_groups,
            mappings,
        })
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn tree(&self) -> &HierarchyTree<'a> {
        &self.tree
    }

    /// Active node by id.
    pub fn node(&self, id: &str) -> Option<&'a HierarchyNode> {
        self.tree.node(id)
    }

    /// Active nodes in snapshot order, first occurrence of each id.
    pub fn nodes(&self) -> Vec<&'a HierarchyNode> {
        active_nodes(&self.tree, self.snapshot)
    }

    pub fn is_calculated(&self, id: &str) -> bool {
        self.node(id).is_some_and(|n| n.calculation_flag)
    }

    pub fn formula_group(&self, id: &str) -> Option<&'a FormulaGroup> {
        self.groups.get(id).copied()
    }

    /// Group computing the value of `node_id`.
    pub fn formula_of(&self, node_id: &str) -> Option<&'a FormulaGroup> {
        self.formulas.get(node_id).copied()
    }

    /// Every (owner node, group) pair, ordered by node id.
    pub fn formulas(&self) -> impl Iterator<Item = (&'a str, &'a FormulaGroup)> + '_ {
        self.formulas.iter().map(|(k, v)| (*k, *v))
    }

    pub fn filter_group(&self, id: &str) -> Option<&'a FilterGroup> {
        self.filter_groups.get(id).copied()
    }

    /// Filter group referenced by `node_id`.
    pub fn filter_group_of(&self, node_id: &str) -> Option<&'a FilterGroup> {
        let reference = self.node(node_id)?.filter_group_ref.as_ref()?;
        self.filter_group(reference.filter_group_id.as_str())
    }

    pub fn mappings(&self) -> &[&'a SourceMapping] {
        &self.mappings
    }

    pub fn mappings_of(&self, node_id: &str) -> Vec<&'a SourceMapping> {
        self.mappings
            .iter()
            .filter(|m| m.hierarchy_id == node_id)
            .copied()
            .collect()
    }

    /// Formula metadata projected for a node: its own group when it owns
    /// one, else the first group (by owner id) whose rules read it.
    pub fn membership(&self, node_id: &str) -> Option<FormulaMembership<'a>> {
        if let Some(group) = self.formula_of(node_id) {
            return Some(FormulaMembership {
                formula_group_id: group.formula_group_id.as_str(),
                role: FormulaRole::Main,
                precedence: None,
                sign_change_flag: None,
            });
        }
        let explicit = self
            .node(node_id)
            .and_then(|n| n.formula_group_ref.as_ref())
            .filter(|r| r.role == FormulaRole::Contributor)
            .and_then(|r| self.formula_group(r.formula_group_id.as_str()));
        let group = explicit.or_else(|| {
            self.formulas
                .values()
                .find(|g| g.rules.iter().any(|r| r.operand() == node_id || r.hierarchy_id == node_id))
                .copied()
        })?;
        let rule = group
            .rules
            .iter()
            .find(|r| r.operand() == node_id || r.hierarchy_id == node_id);
        Some(FormulaMembership {
            formula_group_id: group.formula_group_id.as_str(),
            role: FormulaRole::Contributor,
            precedence: rule.map(|r| r.precedence),
            sign_change_flag: rule.map(|r| r.sign_change_flag),
        })
    }
}

/// Key with the tree's lifetime for an id known to be in the tree.
fn tree_key<'a>(tree: &HierarchyTree<'a>, id: &str) -> &'a str {
    match tree.node(id) {
        Some(node) => node.hierarchy_id.as_str(),
        None => "",
    }
}

fn active_nodes<'a>(tree: &HierarchyTree<'a>, snapshot: &'a Snapshot) -> Vec<&'a HierarchyNode> {
    snapshot
        .hierarchy_nodes
        .iter()
        .filter(|n| tree.node(n.hierarchy_id.as_str()).is_some_and(|t| std::ptr::eq(*n, t)))
        .collect()
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
