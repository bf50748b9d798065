//! Formula dependency graph and layered topological ordering

use crate::error::{CoreError, CoreResult};
use crate::ids::HierarchyId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// A directed graph of calculated-node dependencies.
///
/// Edges point from a dependency to its dependent, so a topological order
/// lists dependencies first.
#[derive(Debug)]
pub struct FormulaDag {
    graph: DiGraph<HierarchyId, ()>,
    node_map: HashMap<HierarchyId, NodeIndex>,
}

impl FormulaDag {
    /// Create a new empty DAG
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a node to the DAG
    pub fn add_node(&mut self, id: &HierarchyId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(id) {
            idx
        } else {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id.clone(), idx);
            idx
        }
    }

    /// Record that `dependent` reads the computed value of `dependency`.
    pub fn add_dependency(&mut self, dependent: &HierarchyId, dependency: &HierarchyId) {
        let from = self.add_node(dependency);
        let to = self.add_node(dependent);
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Build from a map of node -> computed values it reads.
    ///
    /// Dependencies that are not keys of the map are ignored (they are raw
    /// reads, not calculated nodes).
    pub fn build(dependencies: &BTreeMap<HierarchyId, Vec<HierarchyId>>) -> Self {
        let mut dag = Self::new();
        for id in dependencies.keys() {
            dag.add_node(id);
        }
        for (id, deps) in dependencies {
            for dep in deps {
                if dependencies.contains_key(dep) {
                    dag.add_dependency(id, dep);
                }
            }
        }
        dag
    }

    /// Kahn layering: layer 0 reads no computed value, layer k reads only
    /// layers below k. Each layer is sorted by id.
    pub fn layers(&self) -> CoreResult<Vec<Vec<HierarchyId>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut ready: BTreeSet<(HierarchyId, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&idx, _)| (self.graph[idx].clone(), idx))
            .collect();

        let mut layers = Vec::new();
        let mut placed = 0;
        while !ready.is_empty() {
            let layer = std::mem::take(&mut ready);
            let mut ids = Vec::with_capacity(layer.len());
            for (id, idx) in layer {
                placed += 1;
                for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                    let target = edge.target();
                    if let Some(d) = in_degree.get_mut(&target) {
                        *d -= 1;
                        if *d == 0 {
                            ready.insert((self.graph[target].clone(), target));
                        }
                    }
                }
                ids.push(id);
            }
            layers.push(ids);
        }

        if placed < self.graph.node_count() {
            return Err(CoreError::CircularDependency {
                cycle: self.find_cycle().unwrap_or_default(),
            });
        }
        Ok(layers)
    }

    /// Flattened layers.
    pub fn topological_order(&self) -> CoreResult<Vec<HierarchyId>> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }

    /// The cycle through the smallest id on any cycle, listed in
    /// "depends on" order starting at that id; `None` when acyclic.
    pub fn find_cycle(&self) -> Option<Vec<HierarchyId>> {
        let mut best: Option<(HierarchyId, Vec<NodeIndex>)> = None;
        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if !is_cycle {
                continue;
            }
            let Some(min) = component.iter().map(|&idx| self.graph[idx].clone()).min() else {
                continue;
            };
            let better = match &best {
                Some((current, _)) => min < *current,
                None => true,
            };
            if better {
                best = Some((min, component));
            }
        }

        let (start_id, component) = best?;
        let start = *self.node_map.get(&start_id)?;
        let members: HashSet<NodeIndex> = component.into_iter().collect();
        Some(
            self.shortest_cycle(start, &members)
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect(),
        )
    }

    /// BFS along "depends on" edges from `start` back to itself.
    fn shortest_cycle(&self, start: NodeIndex, members: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);
        while let Some(current) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .map(|e| e.source())
                .filter(|n| members.contains(n))
                .collect();
            next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            for n in next {
                if n == start {
                    let mut path = vec![current];
                    let mut cursor = current;
                    while let Some(&p) = prev.get(&cursor) {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    return path;
                }
                if seen.insert(n) {
                    prev.insert(n, current);
                    queue.push_back(n);
                }
            }
        }
        vec![start]
    }

    /// Computed values `id` reads directly, sorted.
    pub fn dependencies(&self, id: &str) -> Vec<HierarchyId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Nodes that read `id`'s computed value directly, sorted.
    pub fn dependents(&self, id: &str) -> Vec<HierarchyId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<HierarchyId> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<HierarchyId> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Incoming => self.graph[e.source()].clone(),
                Direction::Outgoing => self.graph[e.target()].clone(),
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for FormulaDag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
