//! Ownership tree over active hierarchy nodes.
//!
//! The tree is the parent/child graph only. Formula dependencies live in a
//! separate graph ([`crate::dag::FormulaDag`]); a node's position in the tree
//! never implies anything about its formula.

use crate::hierarchy::HierarchyNode;
use crate::ids::HierarchyId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Why a node could not be attached to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    /// `parent_id` names no node at all
    MissingParent,
    /// `parent_id` names an inactive node
    InactiveParent,
}

impl std::fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanReason::MissingParent => write!(f, "does not exist"),
            OrphanReason::InactiveParent => write!(f, "is inactive"),
        }
    }
}

/// An active node whose parent does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanNode {
    pub hierarchy_id: HierarchyId,
    pub parent_id: HierarchyId,
    pub reason: OrphanReason,
}

/// Parent/child structure of a project's active nodes.
#[derive(Debug)]
pub struct HierarchyTree<'a> {
    nodes: HashMap<&'a str, &'a HierarchyNode>,
    children: HashMap<&'a str, Vec<&'a HierarchyNode>>,
    roots: Vec<&'a HierarchyNode>,
    orphans: Vec<OrphanNode>,
    cycles: Vec<Vec<HierarchyId>>,
    cycle_members: HashSet<&'a str>,
}

impl<'a> HierarchyTree<'a> {
    /// Build the tree from every node of a project.
    ///
    /// Inactive nodes are left out. When an id repeats, the first active
    /// occurrence wins. Orphans are recorded and never re-attached to a root.
    pub fn build(all_nodes: &'a [HierarchyNode]) -> Self {
        let mut nodes: HashMap<&'a str, &'a HierarchyNode> = HashMap::new();
        let mut order: Vec<&'a HierarchyNode> = Vec::new();
        let mut inactive: HashSet<&'a str> = HashSet::new();
        for node in all_nodes {
            if !node.active_flag {
                inactive.insert(node.hierarchy_id.as_str());
                continue;
            }
            if !nodes.contains_key(node.hierarchy_id.as_str()) {
                nodes.insert(node.hierarchy_id.as_str(), node);
                order.push(node);
            }
        }

        let mut roots = Vec::new();
        let mut orphans = Vec::new();
        let mut children: HashMap<&'a str, Vec<&'a HierarchyNode>> = HashMap::new();
        for node in &order {
            match &node.parent_id {
                None => roots.push(*node),
                Some(parent) if nodes.contains_key(parent.as_str()) => {
                    children.entry(parent.as_str()).or_default().push(*node);
                }
                Some(parent) => orphans.push(OrphanNode {
                    hierarchy_id: node.hierarchy_id.clone(),
                    parent_id: parent.clone(),
                    reason: if inactive.contains(parent.as_str()) {
                        OrphanReason::InactiveParent
                    } else {
                        OrphanReason::MissingParent
                    },
                }),
            }
        }

        // Stable sort keeps insertion order for equal sort_order
        roots.sort_by_key(|n| n.sort_order);
        for siblings in children.values_mut() {
            siblings.sort_by_key(|n| n.sort_order);
        }

        let cycles = find_parent_cycles(&order, &nodes);
        let cycle_members = cycles
            .iter()
            .flatten()
            .filter_map(|id| nodes.get_key_value(id.as_str()).map(|(k, _)| *k))
            .collect();

        Self {
            nodes,
            children,
            roots,
            orphans,
            cycles,
            cycle_members,
        }
    }

    pub fn node(&self, id: &str) -> Option<&'a HierarchyNode> {
        self.nodes.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Root nodes in sibling order.
    pub fn roots(&self) -> &[&'a HierarchyNode] {
        &self.roots
    }

    /// Direct children in sibling order.
    pub fn children(&self, id: &str) -> &[&'a HierarchyNode] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn orphans(&self) -> &[OrphanNode] {
        &self.orphans
    }

    /// Parent cycles, each starting at its smallest id.
    pub fn parent_cycles(&self) -> &[Vec<HierarchyId>] {
        &self.cycles
    }

    pub fn parent(&self, id: &str) -> Option<&'a HierarchyNode> {
        let parent_id = self.nodes.get(id)?.parent_id.as_ref()?;
        self.node(parent_id.as_str())
    }

    /// Ancestors of `id`, nearest first. Empty for nodes on a parent cycle.
    pub fn ancestors(&self, id: &str) -> Vec<&'a HierarchyNode> {
        if self.cycle_members.contains(id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.cycle_members.contains(node.hierarchy_id.as_str()) {
                break;
            }
            out.push(node);
            current = self.parent(&node.hierarchy_id);
        }
        out
    }

    /// Names from the root down to the node itself.
    ///
    /// `None` for unknown nodes, nodes on a parent cycle, and nodes that do
    /// not reach a root (orphans and their subtrees).
    pub fn level_path(&self, id: &str) -> Option<Vec<&'a str>> {
        let node = self.node(id)?;
        let ancestors = self.ancestors(id);
        let top = ancestors.last().copied().unwrap_or(node);
        if !top.is_root() || self.cycle_members.contains(id) {
            return None;
        }
        let mut path: Vec<&'a str> = ancestors.iter().rev().map(|n| n.name.as_str()).collect();
        path.push(node.name.as_str());
        Some(path)
    }

    /// Nodes reachable from the roots, depth first in sibling order.
    pub fn preorder(&self) -> Vec<&'a HierarchyNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.collect_subtree(*root, &mut out);
        }
        out
    }

    /// Longest level path among attached nodes (0 for an empty tree).
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(&'a HierarchyNode, usize)> =
            self.roots.iter().map(|r| (*r, 1)).collect();
        while let Some((node, level)) = stack.pop() {
            max = max.max(level);
            for child in self.children(&node.hierarchy_id) {
                stack.push((*child, level + 1));
            }
        }
        max
    }

    /// Every node under `id`, depth first, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<&'a HierarchyNode> {
        let mut out = Vec::new();
        for child in self.children(id) {
            self.collect_subtree(*child, &mut out);
        }
        out
    }

    /// Leaf nodes under `id` (or `id` itself when it is a leaf).
    pub fn descendant_leaves(&self, id: &str) -> Vec<&'a HierarchyNode> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            if node.is_leaf {
                out.push(node);
            }
        }
        out.extend(self.descendants(id).into_iter().filter(|n| n.is_leaf));
        out
    }

    fn collect_subtree(&self, node: &'a HierarchyNode, out: &mut Vec<&'a HierarchyNode>) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.children(&current.hierarchy_id).iter().rev() {
                stack.push(*child);
            }
        }
    }
}

/// Strongly connected components of the parent graph with more than one
/// node (or a self parent), each rotated to start at its smallest id and
/// listed in parent order.
fn find_parent_cycles(
    order: &[&HierarchyNode],
    nodes: &HashMap<&str, &HierarchyNode>,
) -> Vec<Vec<HierarchyId>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in order {
        index.insert(node.hierarchy_id.as_str(), graph.add_node(node.hierarchy_id.as_str()));
    }
    for node in order {
        if let Some(parent) = &node.parent_id {
            if let (Some(&from), Some(&to)) =
                (index.get(node.hierarchy_id.as_str()), index.get(parent.as_str()))
            {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycles = Vec::new();
    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&idx| graph.contains_edge(idx, idx));
        if !is_cycle {
            continue;
        }
        let members: HashSet<&str> = component.iter().map(|&i| graph[i]).collect();
        let Some(start) = members.iter().min().copied() else {
            continue;
        };
        let mut cycle = vec![HierarchyId::new(start)];
        let mut current = start;
        while let Some(parent) = nodes
            .get(current)
            .and_then(|n| n.parent_id.as_ref())
            .map(|p| p.as_str())
            .filter(|p| members.contains(p) && *p != start)
        {
            cycle.push(HierarchyId::new(parent));
            current = parent;
        }
        cycles.push(cycle);
    }
    cycles.sort();
    cycles
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tests;
