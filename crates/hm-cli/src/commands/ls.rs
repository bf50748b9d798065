//! List command implementation

use anyhow::{Context, Result};
use hm_core::{HierarchyNode, HierarchyTree, MartConfig, Project};
use serde::Serialize;

use crate::cli::{GlobalArgs, LsArgs, LsOutput};
use crate::commands::common::load_project;

/// Execute the ls command
pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let marts: Vec<MartInfo> = project.snapshot.marts.iter().map(MartInfo::from).collect();

    match args.format {
        LsOutput::Table => print_table(&marts),
        LsOutput::Json => print_json(&marts)?,
        LsOutput::Tree => print_tree(&project),
    }
    Ok(())
}

/// Mart information for display
#[derive(Debug, Serialize)]
pub(crate) struct MartInfo {
    name: String,
    project_name: String,
    report_type: String,
    fact_table: String,
    /// `DATABASE.SCHEMA` the objects are created in
    target: String,
    join_patterns: Vec<String>,
}

impl From<&MartConfig> for MartInfo {
    fn from(mart: &MartConfig) -> Self {
        Self {
            name: mart.name.clone(),
            project_name: mart.project_name.clone(),
            report_type: mart.report_type.clone(),
            fact_table: mart.fact_table.clone(),
            target: format!("{}.{}", mart.target_database, mart.target_schema),
            join_patterns: mart.join_patterns.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

fn print_table(marts: &[MartInfo]) {
    let name_width = marts.iter().map(|m| m.name.len()).max().unwrap_or(4).max(4);
    let report_width = marts
        .iter()
        .map(|m| m.report_type.len())
        .max()
        .unwrap_or(11)
        .max(11);
    let fact_width = marts
        .iter()
        .map(|m| m.fact_table.len())
        .max()
        .unwrap_or(10)
        .max(10);

    println!(
        "{:<name_width$}  {:<report_width$}  {:<fact_width$}  TARGET",
        "NAME", "REPORT_TYPE", "FACT_TABLE"
    );
    println!(
        "{:-<name_width$}  {:-<report_width$}  {:-<fact_width$}  {}",
        "",
        "",
        "",
        "-".repeat(20)
    );
    for mart in marts {
        println!(
            "{:<name_width$}  {:<report_width$}  {:<fact_width$}  {}",
            mart.name, mart.report_type, mart.fact_table, mart.target
        );
    }
    println!();
    println!("{} marts found", marts.len());
}

fn print_json(marts: &[MartInfo]) -> Result<()> {
    let json = serde_json::to_string_pretty(marts).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

fn print_tree(project: &Project) {
    let tree = HierarchyTree::build(&project.snapshot.hierarchy_nodes);
    println!("Hierarchy Tree:");
    println!();
    for line in tree_lines(&tree) {
        println!("{}", line);
    }
    for orphan in tree.orphans() {
        println!(
            "(orphan) {}: parent '{}' {}",
            orphan.hierarchy_id, orphan.parent_id, orphan.reason
        );
    }
    println!();
    println!("{}", tree_summary(&tree));
}

/// `<N> nodes, <M> leaves, depth <D>` over the attached nodes.
pub(crate) fn tree_summary(tree: &HierarchyTree<'_>) -> String {
    let leaves: usize = tree
        .roots()
        .iter()
        .map(|root| tree.descendant_leaves(root.hierarchy_id.as_str()).len())
        .sum();
    format!(
        "{} nodes, {} leaves, depth {}",
        tree.preorder().len(),
        leaves,
        tree.depth()
    )
}

/// Render the ownership tree, one line per node.
pub(crate) fn tree_lines(tree: &HierarchyTree<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let roots = tree.roots();
    for (i, root) in roots.iter().enumerate() {
        push_node(tree, root, "", i == roots.len() - 1, &mut lines);
    }
    lines
}

fn push_node(
    tree: &HierarchyTree<'_>,
    node: &HierarchyNode,
    prefix: &str,
    is_last: bool,
    lines: &mut Vec<String>,
) {
    let connector = if is_last { "└── " } else { "├── " };
    let marker = if node.calculation_flag {
        " [calc]"
    } else if node.is_leaf {
        " [leaf]"
    } else {
        ""
    };
    lines.push(format!(
        "{}{}{} ({}){}",
        prefix, connector, node.hierarchy_id, node.name, marker
    ));

    let children = tree.children(node.hierarchy_id.as_str());
    let new_prefix = format!("{}{}   ", prefix, if is_last { " " } else { "│" });
    for (i, child) in children.iter().enumerate() {
        push_node(tree, child, &new_prefix, i == children.len() - 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_lines() {
        let nodes = vec![
            HierarchyNode::new("IS", "Income Statement"),
            HierarchyNode::new("REV", "Revenue").under("IS").leaf(),
            HierarchyNode::new("GP", "Gross Profit")
                .under("IS")
                .calculated()
                .sorted(1),
        ];
        let tree = HierarchyTree::build(&nodes);
        assert_eq!(
            tree_lines(&tree),
            vec![
                "└── IS (Income Statement)",
                "    ├── REV (Revenue) [leaf]",
                "    └── GP (Gross Profit) [calc]",
            ]
        );
    }

    #[test]
    fn test_tree_summary_skips_orphans() {
        let nodes = vec![
            HierarchyNode::new("IS", "Income Statement"),
            HierarchyNode::new("REV", "Revenue").under("IS"),
            HierarchyNode::new("PROD_REV", "Product Revenue").under("REV").leaf(),
            HierarchyNode::new("GP", "Gross Profit").under("IS").calculated().sorted(1),
            HierarchyNode::new("LOST", "Lost").under("GONE").leaf(),
        ];
        let tree = HierarchyTree::build(&nodes);
        assert_eq!(tree_summary(&tree), "4 nodes, 1 leaves, depth 3");
    }

    #[test]
    fn test_mart_info_from_config() {
        let mut mart = MartConfig::new("is", "Upstream", "Income Statement");
        mart.target_database = "FIN".into();
        mart.target_schema = "MART".into();
        let info = MartInfo::from(&mart);
        assert_eq!(info.target, "FIN.MART");
        assert!(info.join_patterns.is_empty());
    }
}
