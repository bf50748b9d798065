use super::*;
use crate::test_fixtures::income_statement;
use hm_core::{FormulaRule, HierarchyNode, Operation, SnapshotFragment};

#[test]
fn test_resolves_income_statement() {
    let snapshot = income_statement();
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();

    let group = graph.formula_of("GP").unwrap();
    assert_eq!(group.formula_group_id.as_str(), "FG_GP");
    assert!(graph.formula_of("REV").is_none());
    assert_eq!(graph.mappings().len(), 3);
    assert_eq!(graph.mappings_of("COGS").len(), 1);
    assert!(graph.is_calculated("GP"));
    assert!(!graph.is_calculated("REV"));
}

#[test]
fn test_unresolved_param_ref() {
    let mut snapshot = income_statement();
    snapshot.formula_groups[0]
        .rules
        .push(FormulaRule::new("REV", Operation::Sum).param_ref("MISSING"));

    let errors = ResolvedGraph::resolve(&snapshot).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0],
        CompileError::UnresolvedReference {
            ref_kind: ReferenceKind::FormulaParamRef,
            ref_value: "MISSING".into(),
            from_node_id: "GP".into(),
        }
    );
}

#[test]
fn test_inactive_param_target_is_unresolved() {
    let mut snapshot = income_statement();
    snapshot
        .hierarchy_nodes
        .push(HierarchyNode::new("OLD", "Old").under("IS").inactive());
    snapshot.formula_groups[0]
        .rules
        .push(FormulaRule::new("OLD", Operation::Sum));

    let errors = ResolvedGraph::resolve(&snapshot).unwrap_err();
    assert!(errors.iter().all(|e| e.code() == "C001"));
    assert!(errors[0].to_string().contains("'OLD'"));
}

#[test]
fn test_all_unresolved_references_reported() {
    let mut snapshot = income_statement();
    snapshot.hierarchy_nodes.push(
        HierarchyNode::new("X", "X")
            .under("IS")
            .with_filter_group("NO_SUCH_FILTER"),
    );
    snapshot
        .source_mappings
        .push(hm_core::SourceMapping::new("GHOST", "9999"));

    let errors = ResolvedGraph::resolve(&snapshot).unwrap_err();
    let kinds: Vec<_> = errors
        .iter()
        .filter_map(|e| match e {
            CompileError::UnresolvedReference { ref_kind, .. } => Some(*ref_kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![ReferenceKind::FilterGroupRef, ReferenceKind::MappingHierarchyId]
    );
}

#[test]
fn test_mappings_onto_inactive_nodes_are_skipped() {
    let mut snapshot = income_statement();
    snapshot.merge(SnapshotFragment {
        hierarchy_nodes: vec![HierarchyNode::new("OLD", "Old").under("IS").leaf().inactive()],
        source_mappings: vec![hm_core::SourceMapping::new("OLD", "7000")],
        ..SnapshotFragment::default()
    });

    let graph = ResolvedGraph::resolve(&snapshot).unwrap();
    assert!(graph.mappings_of("OLD").is_empty());
    assert!(graph.node("OLD").is_none());
}

#[test]
fn test_membership_of_contributor() {
    let snapshot = income_statement();
    let graph = ResolvedGraph::resolve(&snapshot).unwrap();

    let cogs = graph.membership("COGS").unwrap();
    assert_eq!(cogs.formula_group_id, "FG_GP");
    assert_eq!(cogs.role, FormulaRole::Contributor);
    assert_eq!(cogs.precedence, Some(1));
    assert_eq!(cogs.sign_change_flag, Some(true));

    let gp = graph.membership("GP").unwrap();
    assert_eq!(gp.role, FormulaRole::Main);

    // Explicit contributor reference without a rule of its own
    let prod = graph.membership("PROD_REV").unwrap();
    assert_eq!(prod.formula_group_id, "FG_GP");
    assert_eq!(prod.precedence, None);

    assert!(graph.membership("SVC_REV").is_none());
}
