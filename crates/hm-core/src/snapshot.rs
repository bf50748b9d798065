//! Immutable metadata snapshot and the read-only source contract.
//!
//! Compilation never talks to the metadata store directly. A [`Snapshot`] is
//! captured once through [`MetadataSource`] and then shared read-only between
//! mart compilations.

use crate::checksum::compute_json_checksum;
use crate::error::{CoreError, CoreResult};
use crate::filter::FilterGroup;
use crate::formula::FormulaGroup;
use crate::hierarchy::HierarchyNode;
use crate::mapping::SourceMapping;
use crate::mart::MartConfig;
use serde::{Deserialize, Serialize};

/// Read-only access to a project's metadata.
///
/// Implemented by whatever owns persistence (a REST backend, a database, a
/// directory of YAML files). Every call returns owned data.
pub trait MetadataSource {
    fn list_hierarchy_nodes(&self, project_id: &str) -> CoreResult<Vec<HierarchyNode>>;

    fn list_source_mappings(&self, project_id: &str) -> CoreResult<Vec<SourceMapping>>;

    fn list_formula_groups(&self, project_id: &str) -> CoreResult<Vec<FormulaGroup>>;

    fn list_filter_groups(&self, project_id: &str) -> CoreResult<Vec<FilterGroup>>;

    /// Mart config by name, `None` when unknown.
    fn get_mart_config(&self, config_name: &str) -> CoreResult<Option<MartConfig>>;
}

/// Partial metadata as stored in one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotFragment {
    #[serde(default)]
    pub hierarchy_nodes: Vec<HierarchyNode>,

    #[serde(default)]
    pub source_mappings: Vec<SourceMapping>,

    #[serde(default)]
    pub formula_groups: Vec<FormulaGroup>,

    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,
}

impl SnapshotFragment {
    pub fn is_empty(&self) -> bool {
        self.hierarchy_nodes.is_empty()
            && self.source_mappings.is_empty()
            && self.formula_groups.is_empty()
            && self.filter_groups.is_empty()
    }
}

/// An immutable copy of one project's metadata plus its mart configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub project_id: String,

    #[serde(default)]
    pub hierarchy_nodes: Vec<HierarchyNode>,

    #[serde(default)]
    pub source_mappings: Vec<SourceMapping>,

    #[serde(default)]
    pub formula_groups: Vec<FormulaGroup>,

    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,

    #[serde(default)]
    pub marts: Vec<MartConfig>,
}

impl Snapshot {
    /// Empty snapshot for `project_id`.
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            ..Self::default()
        }
    }

    /// Copy a project's metadata and the named mart configs out of `source`.
    ///
    /// Unknown config names are skipped; compiling them later reports the
    /// missing config.
    pub fn capture(
        source: &dyn MetadataSource,
        project_id: &str,
        config_names: &[&str],
    ) -> CoreResult<Self> {
        let mut marts = Vec::with_capacity(config_names.len());
        for name in config_names {
            match source.get_mart_config(name)? {
                Some(mart) => marts.push(mart),
                None => log::warn!("Mart config '{}' not found in metadata source", name),
            }
        }
        let snapshot = Self {
            project_id: project_id.to_string(),
            hierarchy_nodes: source.list_hierarchy_nodes(project_id)?,
            source_mappings: source.list_source_mappings(project_id)?,
            formula_groups: source.list_formula_groups(project_id)?,
            filter_groups: source.list_filter_groups(project_id)?,
            marts,
        };
        log::debug!(
            "Captured snapshot of '{}': {} nodes, {} mappings, {} formula groups, {} filter groups, {} marts",
            project_id,
            snapshot.hierarchy_nodes.len(),
            snapshot.source_mappings.len(),
            snapshot.formula_groups.len(),
            snapshot.filter_groups.len(),
            snapshot.marts.len()
        );
        Ok(snapshot)
    }

    /// Append one file's metadata, keeping file order.
    pub fn merge(&mut self, fragment: SnapshotFragment) {
        self.hierarchy_nodes.extend(fragment.hierarchy_nodes);
        self.source_mappings.extend(fragment.source_mappings);
        self.formula_groups.extend(fragment.formula_groups);
        self.filter_groups.extend(fragment.filter_groups);
    }

    /// Builder-style [`merge`](Self::merge).
    pub fn with_fragment(mut self, fragment: SnapshotFragment) -> Self {
        self.merge(fragment);
        self
    }

    /// Builder-style mart registration.
    pub fn with_mart(mut self, mart: MartConfig) -> Self {
        self.marts.push(mart);
        self
    }

    pub fn mart(&self, name: &str) -> Option<&MartConfig> {
        self.marts.iter().find(|m| m.name == name)
    }

    pub fn mart_names(&self) -> Vec<&str> {
        self.marts.iter().map(|m| m.name.as_str()).collect()
    }

    /// First node with `id`, active or not.
    pub fn node(&self, id: &str) -> Option<&HierarchyNode> {
        self.hierarchy_nodes.iter().find(|n| n.hierarchy_id == *id)
    }

    pub fn formula_group(&self, id: &str) -> Option<&FormulaGroup> {
        self.formula_groups.iter().find(|g| g.formula_group_id == *id)
    }

    pub fn filter_group(&self, id: &str) -> Option<&FilterGroup> {
        self.filter_groups.iter().find(|g| g.filter_group_id == *id)
    }

    /// Guard for deleting a filter group: fails while any node references it.
    pub fn check_filter_group_delete(&self, filter_group_id: &str) -> CoreResult<()> {
        let mut referenced_by: Vec<String> = self
            .hierarchy_nodes
            .iter()
            .filter(|n| {
                n.filter_group_ref
                    .as_ref()
                    .is_some_and(|r| r.filter_group_id == *filter_group_id)
            })
            .map(|n| n.hierarchy_id.to_string())
            .collect();
        if referenced_by.is_empty() {
            return Ok(());
        }
        referenced_by.sort();
        referenced_by.dedup();
        Err(CoreError::FilterGroupInUse {
            filter_group_id: filter_group_id.to_string(),
            referenced_by,
        })
    }

    /// SHA-256 over the canonical JSON encoding of the snapshot.
    pub fn fingerprint(&self) -> CoreResult<String> {
        compute_json_checksum(self)
    }
}

impl MetadataSource for Snapshot {
    fn list_hierarchy_nodes(&self, project_id: &str) -> CoreResult<Vec<HierarchyNode>> {
        Ok(self.for_project(project_id, &self.hierarchy_nodes))
    }

    fn list_source_mappings(&self, project_id: &str) -> CoreResult<Vec<SourceMapping>> {
        Ok(self.for_project(project_id, &self.source_mappings))
    }

    fn list_formula_groups(&self, project_id: &str) -> CoreResult<Vec<FormulaGroup>> {
        Ok(self.for_project(project_id, &self.formula_groups))
    }

    fn list_filter_groups(&self, project_id: &str) -> CoreResult<Vec<FilterGroup>> {
        Ok(self.for_project(project_id, &self.filter_groups))
    }

    fn get_mart_config(&self, config_name: &str) -> CoreResult<Option<MartConfig>> {
        Ok(self.mart(config_name).cloned())
    }
}

impl Snapshot {
    fn for_project<T: Clone>(&self, project_id: &str, items: &[T]) -> Vec<T> {
        if project_id == self.project_id {
            items.to_vec()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
