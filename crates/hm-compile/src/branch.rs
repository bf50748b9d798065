//! Join-pattern branches of the pre-aggregation layer.
//!
//! Mappings are grouped by the join pattern that accepts them, their
//! precedence group and their filter-group values. Each group becomes one
//! `UNION ALL` arm of DT_3A.

use crate::error::CompileError;
use crate::issue::IssueCollector;
use crate::resolver::ResolvedGraph;
use hm_core::sql_utils::object_name_segment;
use hm_core::{
    HierarchyId, JoinKey, JoinPattern, MartConfig, SourceMapping, SourcePattern,
    IMPLICIT_PATTERN_NAME,
};
use std::collections::{BTreeMap, BTreeSet};

/// Tolerance for allocation weights summing to 1.0.
pub const ALLOCATION_TOLERANCE: f64 = 1e-4;

/// A mapping placed in a branch.
#[derive(Debug, Clone)]
pub struct BranchMember<'a> {
    pub mapping: &'a SourceMapping,
    pub pattern: SourcePattern,
}

impl BranchMember<'_> {
    pub fn hierarchy_id(&self) -> &HierarchyId {
        &self.mapping.hierarchy_id
    }

    pub fn weight(&self) -> f64 {
        self.mapping.allocation_weight.unwrap_or(1.0)
    }
}

/// One arm of the pre-aggregation union.
#[derive(Debug, Clone)]
pub struct Branch<'a> {
    pub name: String,
    pub join_pattern: JoinPattern,
    /// `(join key, fact column)` pairs of the pattern
    pub key_pairs: Vec<(JoinKey, String)>,
    pub precedence_group: String,
    /// Normalized filter-group values, `None` for unpopulated slots
    pub filter_values: [Option<String>; 4],
    pub members: Vec<BranchMember<'a>>,
    has_overlaps: bool,
}

impl<'a> Branch<'a> {
    /// Nodes receiving rows from this branch, sorted and distinct.
    pub fn contributing_node_ids(&self) -> Vec<&HierarchyId> {
        let ids: BTreeSet<&HierarchyId> = self.members.iter().map(|m| m.hierarchy_id()).collect();
        ids.into_iter().collect()
    }

    /// Whether some fact value could match two different patterns of this
    /// branch or of a branch sharing its fact rows, which makes the
    /// most-specific guard necessary.
    pub fn has_overlaps(&self) -> bool {
        self.has_overlaps
    }

    /// Whether both branches join the same fact rows: same join pattern and
    /// same filter values, whatever the precedence group.
    pub fn shares_facts_with(&self, other: &Branch<'_>) -> bool {
        self.join_pattern.name == other.join_pattern.name && self.filter_values == other.filter_values
    }

    /// Fact column joined against `SOURCE_UID`.
    pub fn source_column(&self) -> Option<&str> {
        self.key_pairs
            .iter()
            .find(|(key, _)| *key == JoinKey::SourceUid)
            .map(|(_, column)| column.as_str())
    }

    /// `(slot, fact column)` for each filter-group key.
    pub fn filter_columns(&self) -> Vec<(usize, &str)> {
        self.key_pairs
            .iter()
            .filter_map(|(key, column)| match key {
                JoinKey::FilterGroup(slot) => Some((*slot, column.as_str())),
                JoinKey::SourceUid => None,
            })
            .collect()
    }

    /// Members grouped by normalized pattern key.
    fn members_by_key(&self) -> BTreeMap<&str, Vec<&BranchMember<'a>>> {
        let mut by_key: BTreeMap<&str, Vec<&BranchMember<'a>>> = BTreeMap::new();
        for member in &self.members {
            by_key.entry(member.pattern.key()).or_default().push(member);
        }
        by_key
    }
}

/// Where a fact value lands at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub branch: String,
    pub hierarchy_id: HierarchyId,
    pub weight: f64,
}

/// Ordered branches of a mart.
#[derive(Debug, Clone, Default)]
pub struct BranchSet<'a> {
    branches: Vec<Branch<'a>>,
}

type BranchKey = (usize, String, String, [Option<String>; 4]);

impl<'a> BranchSet<'a> {
    /// Group the active mappings of non-calculated nodes into branches.
    ///
    /// Excluded mappings and mappings onto excluded nodes never reach the
    /// fact join and are left out. Mapping problems go to `issues`.
    pub fn build(
        graph: &ResolvedGraph<'a>,
        mart: &MartConfig,
        issues: &mut IssueCollector,
    ) -> Self {
        let mut grouped: BTreeMap<BranchKey, Branch<'a>> = BTreeMap::new();

        for mapping in graph.mappings() {
            let Some(node) = graph.node(mapping.hierarchy_id.as_str()) else {
                continue;
            };
            if node.calculation_flag || node.exclude_flag || mapping.exclude_flag {
                continue;
            }
            let precedence_group = mapping.precedence_group.trim().to_string();
            let filter_values = mapping.filter_groups();
            let slots: Vec<usize> = filter_values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_some())
                .map(|(i, _)| i + 1)
                .collect();

            let (order, pattern) = match select_pattern(graph, mart, mapping, &precedence_group, &slots)
            {
                Ok(found) => found,
                Err(details) => {
                    issues.push(CompileError::NoJoinPattern {
                        hierarchy_id: mapping.hierarchy_id.to_string(),
                        source_uid: mapping.source_uid.clone(),
                        precedence_group: precedence_group.clone(),
                        details,
                    });
                    continue;
                }
            };
            let key_pairs = match pattern.key_pairs() {
                Ok(pairs) => pairs,
                Err(details) => {
                    issues.push(CompileError::NoJoinPattern {
                        hierarchy_id: mapping.hierarchy_id.to_string(),
                        source_uid: mapping.source_uid.clone(),
                        precedence_group: precedence_group.clone(),
                        details,
                    });
                    continue;
                }
            };

            let key = (
                order,
                pattern.name.clone(),
                precedence_group.clone(),
                filter_values.clone(),
            );
            let branch = grouped.entry(key).or_insert_with(|| Branch {
                name: branch_name(&pattern.name, &precedence_group, &filter_values),
                join_pattern: pattern,
                key_pairs,
                precedence_group,
                filter_values,
                members: Vec::new(),
                has_overlaps: false,
            });
            branch.members.push(BranchMember {
                mapping,
                pattern: mapping.pattern(),
            });
        }

        let mut branches: Vec<Branch<'a>> = grouped.into_values().collect();
        for branch in &mut branches {
            check_members(branch, issues);
        }
        check_families(&mut branches, issues);
        log::debug!("Built {} branches for mart '{}'", branches.len(), mart.name);
        Self { branches }
    }

    pub fn branches(&self) -> &[Branch<'a>] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branch(&self, name: &str) -> Option<&Branch<'a>> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Nodes receiving rows from any branch.
    pub fn mapped_node_ids(&self) -> BTreeSet<HierarchyId> {
        self.branches
            .iter()
            .flat_map(|b| b.members.iter().map(|m| m.hierarchy_id().clone()))
            .collect()
    }

    /// Branches competing with `branch` for the same fact rows, itself
    /// included, in branch order.
    pub fn family(&self, branch: &Branch<'_>) -> Vec<&Branch<'a>> {
        self.branches
            .iter()
            .filter(|b| b.shares_facts_with(branch))
            .collect()
    }

    /// Resolve a fact account value. Within each family of branches sharing
    /// fact rows only the most specific matching patterns win.
    pub fn resolve(&self, value: &str) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        for (i, branch) in self.branches.iter().enumerate() {
            if self.branches[..i].iter().any(|b| b.shares_facts_with(branch)) {
                continue;
            }
            let hits: Vec<(&Branch<'a>, &BranchMember<'a>)> = self
                .family(branch)
                .into_iter()
                .flat_map(|b| {
                    b.members
                        .iter()
                        .filter(move |m| m.pattern.matches(value))
                        .map(move |m| (b, m))
                })
                .collect();
            let Some(best) = hits.iter().map(|(_, m)| m.pattern.specificity()).max() else {
                continue;
            };
            resolutions.extend(
                hits.into_iter()
                    .filter(|(_, m)| m.pattern.specificity() == best)
                    .map(|(b, m)| Resolution {
                        branch: b.name.clone(),
                        hierarchy_id: m.hierarchy_id().clone(),
                        weight: m.weight(),
                    }),
            );
        }
        resolutions
    }
}

/// Pick the join pattern for a mapping group; the `usize` orders branches.
fn select_pattern(
    graph: &ResolvedGraph<'_>,
    mart: &MartConfig,
    mapping: &SourceMapping,
    precedence_group: &str,
    slots: &[usize],
) -> Result<(usize, JoinPattern), String> {
    if !mart.join_patterns.is_empty() {
        return mart
            .join_patterns
            .iter()
            .enumerate()
            .find(|(_, p)| {
                p.key_pairs().is_ok() && p.filter_slots() == slots && p.serves(precedence_group)
            })
            .map(|(i, p)| (i, p.clone()))
            .ok_or_else(|| format!("no join pattern keys on {}", describe_keys(slots)));
    }

    if slots.is_empty() {
        return Ok((0, mart.implicit_join_pattern()));
    }

    // Filtered mappings without declared patterns take the fact columns
    // from the node's filter group.
    let group = graph
        .filter_group_of(mapping.hierarchy_id.as_str())
        .ok_or_else(|| {
            format!(
                "{} needs declared join patterns or a filter group naming the fact columns",
                describe_keys(slots)
            )
        })?;
    let mut join_keys = vec!["SOURCE_UID".to_string()];
    let mut fact_keys = vec![mart.account_segment.trim().to_string()];
    for &slot in slots {
        let column = group.discriminator(slot).ok_or_else(|| {
            format!(
                "filter group '{}' names no fact column for FILTER_GROUP_{}",
                group.filter_group_id, slot
            )
        })?;
        join_keys.push(JoinKey::FilterGroup(slot).mapping_column());
        fact_keys.push(column.to_string());
    }
    Ok((
        1,
        JoinPattern {
            name: format!(
                "{}_{}",
                IMPLICIT_PATTERN_NAME,
                object_name_segment(group.filter_group_id.as_str())
            ),
            join_keys,
            fact_keys,
            optional_filter: None,
            precedence_groups: Vec::new(),
        },
    ))
}

fn describe_keys(slots: &[usize]) -> String {
    let mut keys = vec!["SOURCE_UID".to_string()];
    keys.extend(slots.iter().map(|s| JoinKey::FilterGroup(*s).mapping_column()));
    keys.join(" + ")
}

/// `<PATTERN>__<PRECEDENCE_GROUP>[__<FG...>]`
fn branch_name(pattern: &str, precedence_group: &str, filter_values: &[Option<String>; 4]) -> String {
    let mut parts = vec![segment_or_blank(pattern), segment_or_blank(precedence_group)];
    parts.extend(filter_values.iter().flatten().map(|v| segment_or_blank(v)));
    parts.join("__")
}

fn segment_or_blank(text: &str) -> String {
    let segment = object_name_segment(text);
    if segment.is_empty() {
        "BLANK".to_string()
    } else {
        segment
    }
}

/// Conflict and overlap checks within one branch.
fn check_members(branch: &mut Branch<'_>, issues: &mut IssueCollector) {
    let by_key = branch.members_by_key();

    for (key, members) in &by_key {
        let weighted: Vec<f64> = members
            .iter()
            .filter_map(|m| m.mapping.allocation_weight)
            .collect();
        if !weighted.is_empty() {
            let total: f64 = weighted.iter().sum();
            if weighted.len() < members.len() || (total - 1.0).abs() > ALLOCATION_TOLERANCE {
                issues.push(CompileError::AllocationIncomplete {
                    branch: branch.name.clone(),
                    source_key: key.to_string(),
                    total,
                });
            }
            continue;
        }
        report_shared_key(&[branch.name.clone()], key, members, issues);
    }

    let keys: Vec<(&str, &BranchMember<'_>)> =
        by_key.iter().map(|(k, members)| (*k, members[0])).collect();
    let mut overlaps = false;
    for (i, (first_key, first)) in keys.iter().enumerate() {
        for (second_key, second) in &keys[i + 1..] {
            if first.pattern.overlaps(&second.pattern) {
                overlaps = true;
                issues.push(ambiguous(branch, first_key, first, branch, second_key, second));
            }
        }
    }
    branch.has_overlaps = overlaps;
}

/// Key conflicts and overlaps between different branches sharing fact rows.
///
/// Both branches of an overlapping pair get the most-specific guard, which
/// then looks across the whole family.
fn check_families(branches: &mut [Branch<'_>], issues: &mut IssueCollector) {
    let mut overlapping = vec![false; branches.len()];
    for i in 0..branches.len() {
        for j in i + 1..branches.len() {
            let (first, second) = (&branches[i], &branches[j]);
            if !first.shares_facts_with(second) {
                continue;
            }
            let second_keys = second.members_by_key();
            for (first_key, first_members) in first.members_by_key() {
                for (second_key, second_members) in &second_keys {
                    if first_key == *second_key {
                        let members: Vec<&BranchMember<'_>> = first_members
                            .iter()
                            .chain(second_members.iter())
                            .copied()
                            .collect();
                        let names = [first.name.clone(), second.name.clone()];
                        report_shared_key(&names, first_key, &members, issues);
                    } else if first_members[0].pattern.overlaps(&second_members[0].pattern) {
                        overlapping[i] = true;
                        overlapping[j] = true;
                        issues.push(ambiguous(
                            first,
                            first_key,
                            first_members[0],
                            second,
                            second_key,
                            second_members[0],
                        ));
                    }
                }
            }
        }
    }
    for (branch, overlaps) in branches.iter_mut().zip(overlapping) {
        branch.has_overlaps |= overlaps;
    }
}

/// C014 when one key reaches several nodes, W002 when one node maps it twice.
fn report_shared_key(
    branches: &[String],
    key: &str,
    members: &[&BranchMember<'_>],
    issues: &mut IssueCollector,
) {
    let nodes: BTreeSet<&str> = members.iter().map(|m| m.hierarchy_id().as_str()).collect();
    if nodes.len() > 1 {
        issues.push(CompileError::ConflictingMapping {
            branches: branches.to_vec(),
            source_key: key.to_string(),
            hierarchy_ids: nodes.iter().map(|n| n.to_string()).collect(),
        });
    } else if members.len() > 1 {
        issues.push(CompileError::DuplicateMapping {
            branches: branches.to_vec(),
            source_key: key.to_string(),
            hierarchy_id: nodes.iter().next().map(|n| n.to_string()).unwrap_or_default(),
        });
    }
}

fn ambiguous(
    first_branch: &Branch<'_>,
    first_key: &str,
    first: &BranchMember<'_>,
    second_branch: &Branch<'_>,
    second_key: &str,
    second: &BranchMember<'_>,
) -> CompileError {
    CompileError::AmbiguousMapping {
        join_pattern: first_branch.join_pattern.name.clone(),
        first: first_key.to_string(),
        first_branch: first_branch.name.clone(),
        first_node: first.hierarchy_id().to_string(),
        second: second_key.to_string(),
        second_branch: second_branch.name.clone(),
        second_node: second.hierarchy_id().to_string(),
    }
}

#[cfg(test)]
#[path = "branch_test.rs"]
mod tests;
