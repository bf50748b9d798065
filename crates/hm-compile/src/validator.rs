//! Structural checks before emission and SQL checks after it.
//!
//! Both passes report every problem they find; neither stops at the first.

use crate::emit::LayerObject;
use crate::error::CompileError;
use crate::issue::IssueCollector;
use crate::resolver::ResolvedGraph;
use hm_core::{CoreError, Dialect, FormulaRole, MartConfig};
use hm_sql::{extract_dependencies, validate_select, SqlParser};
use std::collections::{BTreeMap, BTreeSet};

/// Tree shape, node invariants, formula ownership, filter groups and mart
/// config shape.
pub fn pre_check(graph: &ResolvedGraph<'_>, mart: &MartConfig, issues: &mut IssueCollector) {
    for details in mart.shape_problems() {
        issues.push(CompileError::InvalidMartConfig {
            mart: mart.name.clone(),
            details,
        });
    }

    let snapshot = graph.snapshot();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in &snapshot.hierarchy_nodes {
        *counts.entry(node.hierarchy_id.as_str()).or_default() += 1;
    }
    for (id, count) in counts.into_iter().filter(|(_, c)| *c > 1) {
        issues.push(CompileError::DuplicateHierarchyId {
            hierarchy_id: id.to_string(),
            count,
        });
    }

    let tree = graph.tree();
    for orphan in tree.orphans() {
        issues.push(CompileError::OrphanNode {
            hierarchy_id: orphan.hierarchy_id.to_string(),
            parent_id: orphan.parent_id.to_string(),
            reason: orphan.reason,
        });
    }
    for cycle in tree.parent_cycles() {
        issues.push(CompileError::ParentCycle {
            cycle: cycle.clone(),
        });
    }

    check_nodes(graph, issues);
    check_formula_owners(graph, issues);
    check_filter_groups(graph, issues);
}

fn check_nodes(graph: &ResolvedGraph<'_>, issues: &mut IssueCollector) {
    for node in graph.nodes() {
        let id = node.hierarchy_id.as_str();
        let mappings = graph.mappings_of(id);
        if node.calculation_flag {
            if graph.formula_of(id).is_none() {
                issues.push(CompileError::CalculationWithoutFormula {
                    hierarchy_id: id.to_string(),
                });
            }
            for mapping in &mappings {
                issues.push(CompileError::CalculationWithMapping {
                    hierarchy_id: id.to_string(),
                    source_uid: mapping.source_uid.clone(),
                });
            }
        }
        if node.is_leaf {
            if mappings.is_empty() && !node.calculation_flag {
                issues.push(CompileError::LeafWithoutMapping {
                    hierarchy_id: id.to_string(),
                });
            }
            if let Some(group) = graph.formula_of(id) {
                issues.push(CompileError::LeafWithFormula {
                    hierarchy_id: id.to_string(),
                    formula_group_id: group.formula_group_id.to_string(),
                });
            }
        }
    }
}

/// Every formula group has exactly one main node, and nodes only
/// contribute to groups they do not own.
fn check_formula_owners(graph: &ResolvedGraph<'_>, issues: &mut IssueCollector) {
    let snapshot = graph.snapshot();
    let mut owned: BTreeMap<&str, &str> = BTreeMap::new();
    let mut seen_groups = BTreeSet::new();
    for group in &snapshot.formula_groups {
        if !seen_groups.insert(group.formula_group_id.as_str()) {
            continue;
        }
        let main = group.main_hierarchy_id.as_str();
        if let Some(first) = owned.get(main) {
            issues.push(CompileError::MultipleFormulaOwners {
                formula_group_id: group.formula_group_id.to_string(),
                hierarchy_id: main.to_string(),
                details: format!("node '{}' already owns formula group '{}'", main, first),
            });
        } else {
            owned.insert(main, group.formula_group_id.as_str());
        }
    }

    for node in graph.nodes() {
        let Some(reference) = &node.formula_group_ref else {
            continue;
        };
        let Some(group) = graph.formula_group(reference.formula_group_id.as_str()) else {
            continue;
        };
        let id = node.hierarchy_id.as_str();
        let owner = group.main_hierarchy_id.as_str();
        let details = match reference.role {
            FormulaRole::Main if owner != id => Some(format!(
                "node '{}' claims it as main, but its main node is '{}'",
                id, owner
            )),
            FormulaRole::Contributor if owner == id => Some(format!(
                "node '{}' owns the group and cannot also contribute to it",
                id
            )),
            _ => None,
        };
        if let Some(details) = details {
            issues.push(CompileError::MultipleFormulaOwners {
                formula_group_id: group.formula_group_id.to_string(),
                hierarchy_id: id.to_string(),
                details,
            });
        }
    }
}

/// Filter groups referenced by active nodes must render.
fn check_filter_groups(graph: &ResolvedGraph<'_>, issues: &mut IssueCollector) {
    let referenced: BTreeSet<&str> = graph
        .nodes()
        .into_iter()
        .filter_map(|n| n.filter_group_ref.as_ref())
        .map(|r| r.filter_group_id.as_str())
        .collect();
    for id in referenced {
        let Some(group) = graph.filter_group(id) else {
            continue;
        };
        if let Err(err) = group.render_predicate("F") {
            let details = match err {
                CoreError::InvalidFilterCondition { message, .. } => message,
                other => other.to_string(),
            };
            issues.push(CompileError::InvalidFilterCondition {
                filter_group_id: id.to_string(),
                details,
            });
        }
    }
}

/// Parser for the configured dialect.
pub fn parser_for(dialect: Dialect) -> SqlParser {
    match dialect {
        Dialect::Snowflake => SqlParser::snowflake(),
        Dialect::Generic => SqlParser::generic(),
    }
}

/// Name collisions, body validity, and upstream coverage of the emitted
/// objects.
pub fn post_check(
    objects: &[LayerObject],
    mart: &MartConfig,
    dialect: Dialect,
    issues: &mut IssueCollector,
) {
    let external: Vec<&str> = [
        mart.hierarchy_table.as_str(),
        mart.mapping_table.as_str(),
        mart.fact_table.as_str(),
    ]
    .iter()
    .map(|t| t.trim())
    .collect();

    for (i, object) in objects.iter().enumerate() {
        let clashes = objects[i + 1..]
            .iter()
            .map(|o| o.name.as_str())
            .chain(external.iter().copied())
            .filter(|other| other.eq_ignore_ascii_case(&object.name));
        for other in clashes {
            issues.push(CompileError::NamingCollision {
                first: object.name.clone(),
                second: other.to_string(),
            });
        }
    }

    let emitted: BTreeSet<&str> = objects.iter().map(|o| o.name.as_str()).collect();
    let parser = parser_for(dialect);
    for object in objects {
        if let Some(upstream) = &object.upstream {
            if !emitted.contains(upstream.as_str()) {
                issues.push(CompileError::MissingUpstream {
                    object: object.name.clone(),
                    relation: upstream.clone(),
                });
            }
        }
        let statements = match validate_select(&parser, &object.body) {
            Ok(statements) => statements,
            Err(err) => {
                issues.push(CompileError::InvalidEmittedSql {
                    object: object.name.clone(),
                    details: err.to_string(),
                });
                continue;
            }
        };
        for relation in extract_dependencies(&parser, &statements) {
            let known = emitted.contains(relation.as_str())
                || external.iter().any(|t| *t == relation);
            if !known {
                issues.push(CompileError::MissingUpstream {
                    object: object.name.clone(),
                    relation,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_test.rs"]
mod tests;
