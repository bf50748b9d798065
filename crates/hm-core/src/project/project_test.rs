use super::*;
use crate::error::CoreError;
use tempfile::TempDir;

const MART_YAML: &str = r#"
kind: mart
name: upstream_is
project_name: Upstream
report_type: Income Statement
hierarchy_table: FIN.META.HIERARCHY
mapping_table: FIN.META.MAPPING
fact_table: FIN.GL.GL_FACT
account_segment: ACCOUNT_CODE
target_database: FIN
target_schema: MART
dimensions: [ENTITY_ID, PERIOD_ID]
"#;

fn setup_test_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hiermart.yml"), "name: acme\n").unwrap();

    std::fs::create_dir_all(dir.path().join("metadata/nested")).unwrap();
    std::fs::write(
        dir.path().join("metadata/a_nodes.yml"),
        r#"
hierarchy_nodes:
  - hierarchy_id: IS
    name: Income Statement
  - hierarchy_id: REV
    name: Revenue
    parent_id: IS
    is_leaf: true
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("metadata/nested/b_mappings.json"),
        r#"{"source_mappings": [{"hierarchy_id": "REV", "source_uid": "4%"}]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("metadata/notes.yml"), "owner: finance\n").unwrap();

    std::fs::create_dir_all(dir.path().join("marts")).unwrap();
    std::fs::write(dir.path().join("marts/upstream_is.yml"), MART_YAML).unwrap();
    std::fs::write(dir.path().join("marts/README.yml"), "title: marts\n").unwrap();
    dir
}

#[test]
fn test_load_project() {
    let dir = setup_test_project();
    let project = Project::load(dir.path()).unwrap();

    assert_eq!(project.name(), "acme");
    assert_eq!(project.snapshot.project_id, "acme");
    assert_eq!(project.snapshot.hierarchy_nodes.len(), 2);
    assert_eq!(project.snapshot.source_mappings.len(), 1);
    assert_eq!(project.mart_names(), vec!["upstream_is"]);
    assert_eq!(
        project.snapshot.mart("upstream_is").unwrap().dimensions,
        vec!["ENTITY_ID", "PERIOD_ID"]
    );
    assert!(project.mart_files["upstream_is"].ends_with("marts/upstream_is.yml"));
    assert_eq!(project.target_dir(), dir.path().join("target"));
}

#[test]
fn test_project_not_found() {
    let result = Project::load(Path::new("/definitely/not/a/project"));
    assert!(matches!(result, Err(CoreError::ProjectNotFound { .. })));
}

#[test]
fn test_duplicate_mart_rejected() {
    let dir = setup_test_project();
    std::fs::write(dir.path().join("marts/copy.yml"), MART_YAML).unwrap();
    let err = Project::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateMart { .. }));
    assert!(err.to_string().contains("[E007]"));
}

#[test]
fn test_wrong_kind_in_mart_path() {
    let dir = setup_test_project();
    std::fs::write(dir.path().join("marts/bad.yml"), "kind: model\nname: x\n").unwrap();
    let err = Project::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::MartInvalidKind { ref found, .. } if found == "model"));
}

#[test]
fn test_malformed_metadata_reports_path() {
    let dir = setup_test_project();
    std::fs::write(
        dir.path().join("metadata/c_bad.yml"),
        "hierarchy_nodes:\n  - hierarchy_id: X\n",
    )
    .unwrap();
    match Project::load(dir.path()) {
        Err(CoreError::MetadataParseError { path, .. }) => assert!(path.ends_with("c_bad.yml")),
        other => panic!("expected MetadataParseError, got {:?}", other),
    }
}
