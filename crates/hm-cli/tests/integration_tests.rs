//! CLI integration tests for `hm compile`, `hm validate` and `hm ls`
//! against the sample project.

use hm_core::Project;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Path to the compiled hm binary (resolved at compile time)
fn hm_bin() -> String {
    env!("CARGO_BIN_EXE_hm").to_string()
}

fn sample_project_dir() -> &'static str {
    "tests/fixtures/sample_project"
}

/// Copy the sample project into a temp dir so a test can break it.
fn copy_sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    copy_dir(Path::new(sample_project_dir()), dir.path());
    dir
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

fn run(args: &[&str]) -> (bool, Option<i32>, String) {
    let output = Command::new(hm_bin())
        .args(args)
        .output()
        .expect("Failed to run hm");
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (output.status.success(), output.status.code(), combined)
}

#[test]
fn test_load_sample_project() {
    let project = Project::load(Path::new(sample_project_dir())).unwrap();
    assert_eq!(project.name(), "sample_project");
    assert_eq!(project.snapshot.hierarchy_nodes.len(), 6);
    assert_eq!(project.snapshot.source_mappings.len(), 5);
    assert_eq!(project.mart_names(), vec!["income_statement"]);
    assert_eq!(project.config.defaults.target_lag, "2 hours");
}

#[test]
fn test_compile_writes_layers_and_manifest() {
    let out = TempDir::new().unwrap();
    let out_dir = out.path().to_str().unwrap();
    let (ok, _, combined) = run(&[
        "compile",
        "--project-dir",
        sample_project_dir(),
        "--output-dir",
        out_dir,
    ]);
    assert!(ok, "compile should succeed: {}", combined);
    assert!(combined.contains("✓ income_statement (4 objects, 0 errors, 0 warnings)"));

    let mart_dir = out.path().join("income_statement");
    let files = [
        "01_VW_1_UPSTREAM_INCOME_STATEMENT_TRANSLATED.sql",
        "02_DT_2_UPSTREAM_INCOME_STATEMENT_GRANULARITY.sql",
        "03_DT_3A_UPSTREAM_INCOME_STATEMENT_PREAGG.sql",
        "04_DT_3_UPSTREAM_INCOME_STATEMENT_MART.sql",
    ];
    for file in files {
        assert!(mart_dir.join(file).exists(), "missing {}", file);
    }

    let dt3 = std::fs::read_to_string(mart_dir.join(files[3])).unwrap();
    assert!(dt3.contains("CREATE OR REPLACE DYNAMIC TABLE"));
    assert!(dt3.contains("TARGET_LAG = '2 hours'"));
    assert!(dt3.contains("WAREHOUSE = \"TRANSFORM_WH\""));

    let dt3a = std::fs::read_to_string(mart_dir.join(files[2])).unwrap();
    assert_eq!(dt3a.matches("'BRANCH' AS \"ROW_SOURCE\"").count(), 3);

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(mart_dir.join("manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["project"], "sample_project");
    assert_eq!(manifest["objects"].as_array().unwrap().len(), 4);
    assert_eq!(manifest["objects"][0]["object_type"], "VIEW");
    assert_eq!(manifest["fingerprint"].as_str().unwrap().len(), 64);
}

#[test]
fn test_compile_is_deterministic() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    for out in [&first, &second] {
        let (ok, _, combined) = run(&[
            "compile",
            "-p",
            sample_project_dir(),
            "-o",
            out.path().to_str().unwrap(),
        ]);
        assert!(ok, "{}", combined);
    }
    let file = "income_statement/04_DT_3_UPSTREAM_INCOME_STATEMENT_MART.sql";
    assert_eq!(
        std::fs::read(first.path().join(file)).unwrap(),
        std::fs::read(second.path().join(file)).unwrap()
    );
}

#[test]
fn test_compile_json_summary() {
    let out = TempDir::new().unwrap();
    let (ok, _, combined) = run(&[
        "compile",
        "-p",
        sample_project_dir(),
        "-o",
        out.path().to_str().unwrap(),
        "--format",
        "json",
    ]);
    assert!(ok, "{}", combined);
    let summary: serde_json::Value = serde_json::from_str(combined.trim()).unwrap();
    assert_eq!(summary[0]["mart"], "income_statement");
    assert_eq!(summary[0]["status"], "success");
    assert_eq!(summary[0]["objects"], 4);
}

#[test]
fn test_compile_unknown_mart_fails() {
    let out = TempDir::new().unwrap();
    let (ok, code, combined) = run(&[
        "compile",
        "-p",
        sample_project_dir(),
        "-o",
        out.path().to_str().unwrap(),
        "--marts",
        "nope",
    ]);
    assert!(!ok);
    assert_eq!(code, Some(1));
    assert!(combined.contains("C020"), "{}", combined);
    assert!(out.path().join("nope/manifest.json").exists());
}

#[test]
fn test_validate_sample_project() {
    let (ok, _, combined) = run(&["validate", "-p", sample_project_dir()]);
    assert!(ok, "validate should succeed: {}", combined);
    assert!(combined.contains("Validation passed: 0 errors, 0 warnings"));
}

#[test]
fn test_validate_reports_formula_cycle() {
    let project = copy_sample_project();
    std::fs::write(
        project.path().join("metadata/zz_cycle.yml"),
        r#"
hierarchy_nodes:
  - hierarchy_id: X
    name: X
    parent_id: IS
    calculation_flag: true
  - hierarchy_id: Y
    name: Y
    parent_id: IS
    calculation_flag: true
formula_groups:
  - formula_group_id: FG_X
    group_name: X
    main_hierarchy_id: X
    rules:
      - hierarchy_id: X
        operation: SUM
        formula_param_ref: Y
  - formula_group_id: FG_Y
    group_name: Y
    main_hierarchy_id: Y
    rules:
      - hierarchy_id: Y
        operation: SUM
        formula_param_ref: X
"#,
    )
    .unwrap();

    let (ok, code, combined) = run(&["validate", "-p", project.path().to_str().unwrap()]);
    assert!(!ok);
    assert_eq!(code, Some(3));
    assert!(combined.contains("C002"), "{}", combined);
    assert!(combined.contains("X -> Y"), "{}", combined);
}

#[test]
fn test_validate_strict_fails_on_warnings() {
    let project = copy_sample_project();
    std::fs::write(
        project.path().join("metadata/zz_overlap.yml"),
        r#"
source_mappings:
  - hierarchy_id: COGS
    precedence_group: 3
    source_uid: "52%"
"#,
    )
    .unwrap();
    let dir = project.path().to_str().unwrap();

    let (ok, _, combined) = run(&["validate", "-p", dir]);
    assert!(ok, "{}", combined);
    assert!(combined.contains("W001"), "{}", combined);

    let (ok, code, combined) = run(&["validate", "-p", dir, "--strict"]);
    assert!(!ok);
    assert_eq!(code, Some(1));
    assert!(combined.contains("Validation failed (strict mode)"), "{}", combined);
}

#[test]
fn test_ls_json() {
    let (ok, _, combined) = run(&["ls", "-p", sample_project_dir(), "--format", "json"]);
    assert!(ok, "{}", combined);
    let marts: serde_json::Value = serde_json::from_str(combined.trim()).unwrap();
    assert_eq!(marts[0]["name"], "income_statement");
    assert_eq!(marts[0]["target"], "FIN.MART");
}

#[test]
fn test_ls_tree() {
    let (ok, _, combined) = run(&["ls", "-p", sample_project_dir(), "--format", "tree"]);
    assert!(ok, "{}", combined);
    assert!(combined.contains("└── IS (Income Statement)"));
    assert!(combined.contains("GP (Gross Profit) [calc]"));
}
