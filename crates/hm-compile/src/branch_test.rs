use super::*;
use crate::test_fixtures::{income_statement, mart};
use hm_core::{FilterGroup, HierarchyNode, Snapshot, SnapshotFragment};

fn codes(issues: IssueCollector) -> Vec<String> {
    issues.into_sorted().into_iter().map(|i| i.code).collect()
}

/// Root `R` with leaves `A` and `B` and the given mappings.
fn leaves_with(mappings: Vec<SourceMapping>) -> Snapshot {
    Snapshot::new("p").with_fragment(SnapshotFragment {
        hierarchy_nodes: vec![
            HierarchyNode::new("R", "Root"),
            HierarchyNode::new("A", "A").under("R").leaf(),
            HierarchyNode::new("B", "B").under("R").leaf().sorted(1),
        ],
        source_mappings: mappings,
        ..SnapshotFragment::default()
    })
}

#[test]
fn test_income_statement_has_three_branches() {
    let snapshot = income_statement();
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    let names: Vec<&str> = branches.branches().iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["ACCOUNT__1", "ACCOUNT__2", "ACCOUNT__3"]);
    assert!(codes(issues).is_empty());

    let second = branches.branch("ACCOUNT__2").unwrap();
    assert_eq!(second.source_column(), Some("ACCOUNT_CODE"));
    assert_eq!(second.contributing_node_ids(), vec!["SVC_REV"]);
    assert!(!second.has_overlaps());

    let mapped: Vec<String> = branches
        .mapped_node_ids()
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(mapped, vec!["COGS", "PROD_REV", "SVC_REV"]);
}

#[test]
fn test_most_specific_prefix_wins() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "50%"),
        SourceMapping::new("B", "501%"),
    ]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    assert_eq!(branches.len(), 1);
    assert!(branches.branches()[0].has_overlaps());
    assert_eq!(codes(issues), vec!["W001"]);

    let resolve = |value: &str| -> Vec<String> {
        branches
            .resolve(value)
            .into_iter()
            .map(|r| r.hierarchy_id.to_string())
            .collect()
    };
    assert_eq!(resolve("501-100"), vec!["B"]);
    assert_eq!(resolve("502"), vec!["A"]);
    assert_eq!(resolve(" 501 "), vec!["B"]);
    assert!(resolve("60").is_empty());
}

#[test]
fn test_exact_beats_wildcard() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "5000"),
        SourceMapping::new("B", "5%"),
    ]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    let hit = branches.resolve("5000");
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].hierarchy_id, "A");
    assert_eq!(hit[0].branch, "ACCOUNT__1");
    assert_eq!(branches.resolve("5001")[0].hierarchy_id, "B");
}

#[test]
fn test_conflicting_and_duplicate_mappings() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "4000"),
        SourceMapping::new("B", " 4000 "),
        SourceMapping::new("A", "7000"),
        SourceMapping::new("A", "7000"),
    ]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    BranchSet::build(&graph, &mart(), &mut issues);

    let sorted = issues.into_sorted();
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted[0].code, "C014");
    assert!(sorted[0].message.contains("A, B"), "{}", sorted[0].message);
    assert_eq!(sorted[1].code, "W002");
}

#[test]
fn test_allocation_weights_must_sum_to_one() {
    let ok = leaves_with(vec![
        SourceMapping::new("A", "6000").weighted(0.6),
        SourceMapping::new("B", "6000").weighted(0.4),
    ]);
    let graph = ResolvedGraph::resolve(&ok).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);
    assert!(codes(issues).is_empty());
    let weights: Vec<f64> = branches.resolve("6000").iter().map(|r| r.weight).collect();
    assert_eq!(weights, vec![0.6, 0.4]);

    let short = leaves_with(vec![
        SourceMapping::new("A", "6000").weighted(0.5),
        SourceMapping::new("B", "6000").weighted(0.4),
    ]);
    let graph = ResolvedGraph::resolve(&short).unwrap();
    let mut issues = IssueCollector::new();
    BranchSet::build(&graph, &mart(), &mut issues);
    assert_eq!(codes(issues), vec!["C005"]);

    let mixed = leaves_with(vec![
        SourceMapping::new("A", "6000").weighted(1.0),
        SourceMapping::new("B", "6000"),
    ]);
    let graph = ResolvedGraph::resolve(&mixed).unwrap();
    let mut issues = IssueCollector::new();
    BranchSet::build(&graph, &mart(), &mut issues);
    assert_eq!(codes(issues), vec!["C005"]);
}

#[test]
fn test_excluded_mappings_are_left_out() {
    let mut excluded = SourceMapping::new("B", "8000");
    excluded.exclude_flag = true;
    let snapshot = leaves_with(vec![SourceMapping::new("A", "7000"), excluded]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    assert_eq!(branches.len(), 1);
    assert!(branches.resolve("8000").is_empty());
}

#[test]
fn test_declared_patterns_by_filter_slots() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "4000"),
        SourceMapping::new("B", "4000").with_filter_group(1, "oil"),
        SourceMapping::new("B", "4100").in_group("2"),
    ]);
    let mut config = mart();
    config
        .add_join_pattern(JoinPattern::new("ACCT", &["SOURCE_UID"], &["ACCOUNT_CODE"]).for_groups(&["1"]))
        .unwrap();
    config
        .add_join_pattern(JoinPattern::new(
            "ACCT_PRODUCT",
            &["SOURCE_UID", "FILTER_GROUP_1"],
            &["ACCOUNT_CODE", "PRODUCT_CODE"],
        ))
        .unwrap();

    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &config, &mut issues);

    let names: Vec<&str> = branches.branches().iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["ACCT__1", "ACCT_PRODUCT__1__OIL"]);
    assert_eq!(
        branches.branch("ACCT_PRODUCT__1__OIL").unwrap().filter_columns(),
        vec![(1, "PRODUCT_CODE")]
    );

    // Group "2" has no pattern serving it
    let sorted = issues.into_sorted();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].code, "C015");
    assert_eq!(sorted[0].hierarchy_id.as_deref(), Some("B"));
}

#[test]
fn test_implicit_filter_pattern_from_filter_group() {
    let snapshot = Snapshot::new("p").with_fragment(SnapshotFragment {
        hierarchy_nodes: vec![
            HierarchyNode::new("R", "Root"),
            HierarchyNode::new("A", "A")
                .under("R")
                .leaf()
                .with_filter_group("FG Product"),
            HierarchyNode::new("B", "B").under("R").leaf().sorted(1),
        ],
        source_mappings: vec![
            SourceMapping::new("A", "4000").with_filter_group(2, "Gas"),
            SourceMapping::new("B", "4000").with_filter_group(1, "Oil"),
        ],
        filter_groups: vec![FilterGroup::new("FG Product", Vec::new()).with_discriminator(2, "PRODUCT")],
        ..SnapshotFragment::default()
    });
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    assert_eq!(branches.len(), 1);
    let branch = &branches.branches()[0];
    assert_eq!(branch.name, "ACCOUNT_FG_PRODUCT__1__GAS");
    assert_eq!(branch.filter_columns(), vec![(2, "PRODUCT")]);

    // B carries a filter value but no filter group naming the fact column
    assert_eq!(codes(issues), vec!["C015"]);
}

#[test]
fn test_overlap_across_precedence_groups() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "50%").in_group("1"),
        SourceMapping::new("B", "501%").in_group("2"),
    ]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &mart(), &mut issues);

    assert_eq!(branches.len(), 2);
    assert!(branches.branches().iter().all(|b| b.has_overlaps()));
    let sorted = issues.into_sorted();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].code, "W001");
    assert!(sorted[0].message.contains("'ACCOUNT__1'"), "{}", sorted[0].message);
    assert!(sorted[0].message.contains("'ACCOUNT__2'"), "{}", sorted[0].message);

    let hits = branches.resolve("501-100");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hierarchy_id, "B");
    assert_eq!(hits[0].branch, "ACCOUNT__2");
    let hits = branches.resolve("509");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hierarchy_id, "A");
}

#[test]
fn test_same_key_across_precedence_groups() {
    let snapshot = leaves_with(vec![
        SourceMapping::new("A", "4000").in_group("1"),
        SourceMapping::new("B", "4000").in_group("2"),
        SourceMapping::new("A", "7000").in_group("1"),
        SourceMapping::new("A", "7000").in_group("2"),
    ]);
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    BranchSet::build(&graph, &mart(), &mut issues);

    let sorted = issues.into_sorted();
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted[0].code, "C014");
    assert!(
        sorted[0].message.contains("branches 'ACCOUNT__1', 'ACCOUNT__2'"),
        "{}",
        sorted[0].message
    );
    assert_eq!(sorted[1].code, "W002");
}

#[test]
fn test_different_filter_values_do_not_compete() {
    let snapshot = Snapshot::new("p").with_fragment(SnapshotFragment {
        hierarchy_nodes: vec![
            HierarchyNode::new("R", "Root"),
            HierarchyNode::new("A", "A").under("R").leaf(),
            HierarchyNode::new("B", "B").under("R").leaf().sorted(1),
        ],
        source_mappings: vec![
            SourceMapping::new("A", "50%").with_filter_group(1, "oil"),
            SourceMapping::new("B", "501%").with_filter_group(1, "gas"),
        ],
        ..SnapshotFragment::default()
    });
    let mut config = mart();
    config
        .add_join_pattern(JoinPattern::new(
            "ACCT_PRODUCT",
            &["SOURCE_UID", "FILTER_GROUP_1"],
            &["ACCOUNT_CODE", "PRODUCT_CODE"],
        ))
        .unwrap();
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &config, &mut issues);

    assert_eq!(branches.len(), 2);
    assert!(codes(issues).is_empty());
    assert!(branches.branches().iter().all(|b| !b.has_overlaps()));
}
