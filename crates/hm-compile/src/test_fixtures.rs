//! Shared metadata for unit tests: a small income statement.

use hm_core::{
    FormulaGroup, FormulaRole, FormulaRule, HierarchyNode, MartConfig, Operation, Snapshot,
    SnapshotFragment, SourceMapping,
};

/// `IS` with Revenue (two leaves), a COGS leaf and Gross Profit
/// (`SUM REV`, `SUBTRACT COGS` with sign change). Each leaf maps in its
/// own precedence group.
pub(crate) fn income_statement() -> Snapshot {
    let fragment = SnapshotFragment {
        hierarchy_nodes: vec![
            HierarchyNode::new("IS", "Income Statement"),
            HierarchyNode::new("REV", "Revenue").under("IS").sorted(1),
            HierarchyNode::new("PROD_REV", "Product Revenue")
                .under("REV")
                .leaf()
                .with_formula_ref("FG_GP", FormulaRole::Contributor),
            HierarchyNode::new("SVC_REV", "Service Revenue")
                .under("REV")
                .leaf()
                .sorted(1),
            HierarchyNode::new("COGS", "Cost of Goods Sold")
                .under("IS")
                .leaf()
                .sorted(2),
            HierarchyNode::new("GP", "Gross Profit")
                .under("IS")
                .calculated()
                .sorted(3)
                .with_formula_ref("FG_GP", FormulaRole::Main),
        ],
        source_mappings: vec![
            SourceMapping::new("PROD_REV", "4000").in_group("1"),
            SourceMapping::new("SVC_REV", "41%").in_group("2"),
            SourceMapping::new("COGS", "5%").in_group("3"),
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
    };
    Snapshot::new("upstream")
        .with_fragment(fragment)
        .with_mart(mart())
}

pub(crate) fn mart() -> MartConfig {
    let mut mart = MartConfig::new("upstream_is", "Upstream", "Income Statement");
    mart.hierarchy_table = "FIN.META.HIERARCHY".into();
    mart.mapping_table = "FIN.META.MAPPING".into();
    mart.fact_table = "FIN.GL.GL_FACT".into();
    mart.account_segment = "ACCOUNT_CODE".into();
    mart.target_database = "FIN".into();
    mart.target_schema = "MART".into();
    mart.dimensions = vec!["ENTITY_ID".into(), "PERIOD_ID".into()];
    mart
}
