//! End-to-end compile scenarios over in-memory snapshots.
//!
//! No warehouse is involved: numbers are checked by resolving fact values
//! through the branches and evaluating the formula plan, SQL shape by
//! parsing the emitted bodies.

use hm_compile::{
    compile, BranchSet, CompileOptions, FormulaPlan, IssueCollector, Layer, ResolvedGraph,
    RollupMap,
};
use hm_core::{
    FormulaGroup, FormulaRole, FormulaRule, HierarchyId, HierarchyNode, MartConfig, MeasureKind,
    Operation, Snapshot, SnapshotFragment, SourceMapping,
};
use hm_sql::{validate_select, SqlParser};
use std::collections::BTreeMap;

fn mart() -> MartConfig {
    let mut mart = MartConfig::new("income_statement", "Upstream", "Income Statement");
    mart.hierarchy_table = "FIN.META.HIERARCHY".into();
    mart.mapping_table = "FIN.META.MAPPING".into();
    mart.fact_table = "FIN.GL.GL_FACT".into();
    mart.account_segment = "ACCOUNT_CODE".into();
    mart.target_database = "FIN".into();
    mart.target_schema = "MART".into();
    mart.dimensions = vec!["ENTITY_ID".into(), "PERIOD_ID".into()];
    mart
}

/// Revenue with two leaves, a COGS leaf over three accounts and Gross
/// Profit as Revenue minus COGS.
fn income_statement() -> Snapshot {
    Snapshot::new("upstream")
        .with_fragment(SnapshotFragment {
            hierarchy_nodes: vec![
                HierarchyNode::new("IS", "Income Statement"),
                HierarchyNode::new("REV", "Revenue").under("IS").sorted(1),
                HierarchyNode::new("PROD_REV", "Product Revenue")
                    .under("REV")
                    .leaf(),
                HierarchyNode::new("SVC_REV", "Service Revenue")
                    .under("REV")
                    .leaf()
                    .sorted(1),
                HierarchyNode::new("COGS", "COGS").under("IS").leaf().sorted(2),
                HierarchyNode::new("GP", "Gross Profit")
                    .under("IS")
                    .calculated()
                    .sorted(3)
                    .with_formula_ref("FG_GP", FormulaRole::Main),
            ],
            source_mappings: vec![
                SourceMapping::new("PROD_REV", "4000").in_group("1"),
                SourceMapping::new("SVC_REV", "4100").in_group("2"),
                SourceMapping::new("COGS", "5000").in_group("3"),
                SourceMapping::new("COGS", "5100").in_group("3"),
                SourceMapping::new("COGS", "5200").in_group("3"),
            ],
            formula_groups: vec![FormulaGroup::new(
                "FG_GP",
                "GP",
                vec![
                    FormulaRule::new("REV", Operation::Sum),
                    FormulaRule::new("COGS", Operation::Subtract).sign_change(),
                ],
            )],
            filter_groups: Vec::new(),
        })
        .with_mart(mart())
}

/// Route fact rows through the branches and evaluate every calculated node.
fn evaluate(snapshot: &Snapshot, facts: &[(&str, f64)]) -> BTreeMap<HierarchyId, Option<f64>> {
    let graph = ResolvedGraph::resolve(snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let plan = FormulaPlan::build(&graph, &mut issues).unwrap();
    let config = &snapshot.marts[0];
    let branches = BranchSet::build(&graph, config, &mut issues);
    assert!(!issues.has_errors());

    let mut own: BTreeMap<HierarchyId, f64> = BTreeMap::new();
    for (account, amount) in facts {
        for hit in branches.resolve(account) {
            *own.entry(hit.hierarchy_id).or_insert(0.0) += amount * hit.weight;
        }
    }
    let raw = RollupMap::for_plan(&graph, &plan, &branches).apply(&own);
    plan.evaluate(&raw, MeasureKind::Amount)
}

#[test]
fn test_income_statement_gross_profit() {
    let facts = [
        ("4000", 100_000.0),
        ("4100", 70_000.0),
        ("5000", 50_000.0),
        ("5100", 30_000.0),
        ("5200", 8_000.0),
        ("9999", 1_000.0),
    ];
    let values = evaluate(&income_statement(), &facts);
    assert_eq!(values[&HierarchyId::new("GP")], Some(82_000.0));
}

#[test]
fn test_income_statement_has_three_branches() {
    let snapshot = income_statement();
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &snapshot.marts[0], &mut issues);
    assert_eq!(branches.len(), 3);

    let output = compile(&snapshot, "income_statement", &CompileOptions::default());
    assert!(output.issues.is_empty(), "{:?}", output.issues);
    let dt3a = output
        .objects
        .iter()
        .find(|o| o.layer == Layer::Dt3a)
        .unwrap();
    assert_eq!(dt3a.ddl.matches("'BRANCH' AS \"ROW_SOURCE\"").count(), 3);
    assert!(dt3a.ddl.contains("ROLLUP_ROWS AS ("));
}

#[test]
fn test_compile_is_idempotent() {
    let snapshot = income_statement();
    let options = CompileOptions::default();
    let first = compile(&snapshot, "income_statement", &options);
    let second = compile(&snapshot, "income_statement", &options);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    let ddl = |o: &hm_compile::CompileOutput| -> Vec<String> {
        o.objects.iter().map(|x| x.ddl.clone()).collect()
    };
    assert_eq!(ddl(&first), ddl(&second));
}

#[test]
fn test_formula_cycle_emits_nothing() {
    let snapshot = Snapshot::new("cyclic")
        .with_fragment(SnapshotFragment {
            hierarchy_nodes: vec![
                HierarchyNode::new("ROOT", "Root"),
                HierarchyNode::new("LEAF", "Leaf").under("ROOT").leaf(),
                HierarchyNode::new("X", "X").under("ROOT").calculated(),
                HierarchyNode::new("Y", "Y").under("ROOT").calculated(),
            ],
            source_mappings: vec![SourceMapping::new("LEAF", "4000")],
            formula_groups: vec![
                FormulaGroup::new(
                    "FG_X",
                    "X",
                    vec![FormulaRule::new("X", Operation::Sum).param_ref("Y")],
                ),
                FormulaGroup::new(
                    "FG_Y",
                    "Y",
                    vec![FormulaRule::new("Y", Operation::Sum).param_ref("X")],
                ),
            ],
            filter_groups: Vec::new(),
        })
        .with_mart(mart());

    let output = compile(&snapshot, "income_statement", &CompileOptions::default());
    assert!(output.objects.is_empty());
    let cycle = output.issues.iter().find(|i| i.code == "C002").unwrap();
    assert!(cycle.message.contains("X -> Y"), "{}", cycle.message);
}

#[test]
fn test_sign_flag_on_only_contributor_negates() {
    let snapshot = Snapshot::new("signs")
        .with_fragment(SnapshotFragment {
            hierarchy_nodes: vec![
                HierarchyNode::new("ROOT", "Root"),
                HierarchyNode::new("COST", "Cost").under("ROOT").leaf(),
                HierarchyNode::new("NEG", "Negated")
                    .under("ROOT")
                    .calculated()
                    .sorted(1),
            ],
            source_mappings: vec![SourceMapping::new("COST", "6000")],
            formula_groups: vec![FormulaGroup::new(
                "FG_NEG",
                "NEG",
                vec![FormulaRule::new("COST", Operation::Subtract).sign_change()],
            )],
            filter_groups: Vec::new(),
        })
        .with_mart(mart());

    let values = evaluate(&snapshot, &[("6000", 250.0), ("6000", 50.0)]);
    assert_eq!(values[&HierarchyId::new("NEG")], Some(-300.0));
}

#[test]
fn test_sum_adds_every_contributor() {
    let mut snapshot = income_statement();
    snapshot.formula_groups[0].rules = vec![
        FormulaRule::new("PROD_REV", Operation::Sum),
        FormulaRule::new("SVC_REV", Operation::Sum),
        FormulaRule::new("COGS", Operation::Sum),
    ];
    let values = evaluate(
        &snapshot,
        &[("4000", 10.0), ("4100", 20.0), ("5100", -5.0)],
    );
    assert_eq!(values[&HierarchyId::new("GP")], Some(25.0));
}

#[test]
fn test_most_specific_wildcard_wins() {
    let snapshot = Snapshot::new("wildcards")
        .with_fragment(SnapshotFragment {
            hierarchy_nodes: vec![
                HierarchyNode::new("ROOT", "Root"),
                HierarchyNode::new("A", "A").under("ROOT").leaf(),
                HierarchyNode::new("B", "B").under("ROOT").leaf().sorted(1),
            ],
            source_mappings: vec![
                SourceMapping::new("A", "50%"),
                SourceMapping::new("B", "501%"),
            ],
            ..SnapshotFragment::default()
        })
        .with_mart(mart());
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    let mut issues = IssueCollector::new();
    let branches = BranchSet::build(&graph, &snapshot.marts[0], &mut issues);

    let hits = branches.resolve("501-100");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hierarchy_id, "B");
    assert_eq!(branches.resolve("509")[0].hierarchy_id, "A");

    let output = compile(&snapshot, "income_statement", &CompileOptions::default());
    assert_eq!(output.objects.len(), 4);
    assert_eq!(output.issues[0].code, "W001");
}

#[test]
fn test_wildcards_in_different_groups_count_once() {
    let snapshot = Snapshot::new("wildcards")
        .with_fragment(SnapshotFragment {
            hierarchy_nodes: vec![
                HierarchyNode::new("ROOT", "Root"),
                HierarchyNode::new("A", "A").under("ROOT").leaf(),
                HierarchyNode::new("B", "B").under("ROOT").leaf().sorted(1),
                HierarchyNode::new("TOTAL", "Total")
                    .under("ROOT")
                    .calculated()
                    .sorted(2)
                    .with_formula_ref("FG_TOTAL", FormulaRole::Main),
            ],
            source_mappings: vec![
                SourceMapping::new("A", "50%").in_group("1"),
                SourceMapping::new("B", "501%").in_group("2"),
            ],
            formula_groups: vec![FormulaGroup::new(
                "FG_TOTAL",
                "TOTAL",
                vec![
                    FormulaRule::new("A", Operation::Sum),
                    FormulaRule::new("B", Operation::Sum),
                ],
            )],
            ..SnapshotFragment::default()
        })
        .with_mart(mart());

    let values = evaluate(&snapshot, &[("501-100", 10.0), ("509", 5.0)]);
    assert_eq!(values[&HierarchyId::new("TOTAL")], Some(15.0));

    let output = compile(&snapshot, "income_statement", &CompileOptions::default());
    assert_eq!(output.objects.len(), 4);
    let codes: Vec<&str> = output.issues.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["W001"]);
    let preagg = output
        .objects
        .iter()
        .find(|o| o.layer == Layer::Dt3a)
        .unwrap();
    assert_eq!(preagg.ddl.matches("NOT EXISTS").count(), 2);
}

#[test]
fn test_orphan_is_reported() {
    let mut snapshot = income_statement();
    snapshot
        .hierarchy_nodes
        .push(HierarchyNode::new("LOST", "Lost").under("GONE").leaf());
    snapshot
        .source_mappings
        .push(SourceMapping::new("LOST", "7000").in_group("4"));

    let output = compile(&snapshot, "income_statement", &CompileOptions::default());
    assert!(output.objects.is_empty());
    let orphan = output.issues.iter().find(|i| i.code == "C004").unwrap();
    assert_eq!(orphan.hierarchy_id.as_deref(), Some("LOST"));
}

#[test]
fn test_emitted_bodies_parse() {
    let output = compile(&income_statement(), "income_statement", &CompileOptions::default());
    let parser = SqlParser::snowflake();
    assert_eq!(output.objects.len(), 4);
    for object in &output.objects {
        assert!(
            validate_select(&parser, &object.body).is_ok(),
            "{} does not parse:\n{}",
            object.name,
            object.body
        );
        assert!(object.ddl.ends_with(";\n"));
    }
}
