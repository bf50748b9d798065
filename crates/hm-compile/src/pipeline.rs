//! The `compile` entry point: snapshot + mart config in, objects + issues out.

use crate::branch::BranchSet;
use crate::emit::{emit_all, DdlSettings, EmitContext, LayerObject, ObjectNames};
use crate::error::CompileError;
use crate::issue::{Issue, IssueCollector};
use crate::precedence::FormulaPlan;
use crate::resolver::ResolvedGraph;
use crate::rollup::RollupMap;
use crate::validator::{post_check, pre_check};
use hm_core::{Config, ConfigSeverity, Dialect, MartConfig, Snapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Project-wide compile settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Dynamic-table lag when the mart sets none
    pub target_lag: String,
    /// Dynamic-table warehouse when the mart sets none
    pub warehouse: Option<String>,
    /// Dialect emitted bodies are parsed with
    pub dialect: Dialect,
    pub severity_overrides: BTreeMap<String, ConfigSeverity>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target_lag: "1 hour".to_string(),
            warehouse: None,
            dialect: Dialect::Snowflake,
            severity_overrides: BTreeMap::new(),
        }
    }
}

impl CompileOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_lag: config.defaults.target_lag.clone(),
            warehouse: config.defaults.warehouse.clone(),
            dialect: config.dialect,
            severity_overrides: config.validation.severity_overrides.clone(),
        }
    }
}

/// Result of compiling one mart
#[derive(Debug, Clone, Serialize)]
pub struct CompileOutput {
    pub mart: String,
    /// Empty whenever an error-severity issue exists
    pub objects: Vec<LayerObject>,
    pub issues: Vec<Issue>,
}

impl CompileOutput {
    fn failed(mart: &str, issues: IssueCollector) -> Self {
        Self {
            mart: mart.to_string(),
            objects: Vec::new(),
            issues: issues.into_sorted(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

/// Compile the mart config named `config_name`.
pub fn compile(snapshot: &Snapshot, config_name: &str, options: &CompileOptions) -> CompileOutput {
    match snapshot.mart(config_name) {
        Some(mart) => compile_mart(snapshot, mart, options),
        None => {
            let mut issues = IssueCollector::with_overrides(&options.severity_overrides);
            issues.push(CompileError::MartConfigNotFound {
                name: config_name.to_string(),
            });
            CompileOutput::failed(config_name, issues)
        }
    }
}

/// Compile `mart` against `snapshot`.
///
/// Resolution and formula errors stop the pipeline where they are found.
/// Every other error is collected, and any error withholds all objects.
pub fn compile_mart(snapshot: &Snapshot, mart: &MartConfig, options: &CompileOptions) -> CompileOutput {
    let mut issues = IssueCollector::with_overrides(&options.severity_overrides);
    log::debug!("Compiling mart '{}'", mart.name);

    let graph = match ResolvedGraph::resolve(snapshot) {
        Ok(graph) => graph,
        Err(errors) => {
            log::debug!("Mart '{}': {} unresolved references", mart.name, errors.len());
            issues.extend(errors);
            return CompileOutput::failed(&mart.name, issues);
        }
    };

    pre_check(&graph, mart, &mut issues);

    let plan = match FormulaPlan::build(&graph, &mut issues) {
        Ok(plan) => plan,
        Err(errors) => {
            issues.extend(errors);
            return CompileOutput::failed(&mart.name, issues);
        }
    };

    let branches = BranchSet::build(&graph, mart, &mut issues);
    if issues.has_errors() {
        log::debug!(
            "Mart '{}': {} errors before emission",
            mart.name,
            issues.error_count()
        );
        return CompileOutput::failed(&mart.name, issues);
    }

    let rollup = RollupMap::for_plan(&graph, &plan, &branches);
    let ctx = EmitContext {
        mart,
        graph: &graph,
        plan: &plan,
        branches: &branches,
        rollup: &rollup,
        settings: DdlSettings {
            mart_name: mart.name.clone(),
            target_lag: mart
                .target_lag
                .clone()
                .unwrap_or_else(|| options.target_lag.clone()),
            warehouse: mart.warehouse.clone().or_else(|| options.warehouse.clone()),
        },
    };
    let objects = emit_all(&ctx, &ObjectNames::for_mart(mart));

    post_check(&objects, mart, options.dialect, &mut issues);
    if issues.has_errors() {
        return CompileOutput::failed(&mart.name, issues);
    }

    log::debug!(
        "Mart '{}': {} objects, {} warnings",
        mart.name,
        objects.len(),
        issues.warning_count()
    );
    CompileOutput {
        mart: mart.name.clone(),
        objects,
        issues: issues.into_sorted(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Layer;
    use crate::test_fixtures::income_statement;
    use hm_core::{FormulaRule, Operation, SourceMapping};

    #[test]
    fn test_compiles_four_layers() {
        let output = compile(&income_statement(), "upstream_is", &CompileOptions::default());
        assert!(output.issues.is_empty(), "{:?}", output.issues);
        let layers: Vec<Layer> = output.objects.iter().map(|o| o.layer).collect();
        assert_eq!(layers, Layer::ALL.to_vec());
        assert_eq!(
            output.objects[1].upstream.as_deref(),
            Some("FIN.MART.VW_1_UPSTREAM_INCOME_STATEMENT_TRANSLATED")
        );
    }

    #[test]
    fn test_unknown_mart() {
        let output = compile(&income_statement(), "nope", &CompileOptions::default());
        assert!(output.objects.is_empty());
        assert_eq!(output.issues[0].code, "C020");
        assert_eq!(output.issues[0].message, "Mart config not found: nope");
    }

    #[test]
    fn test_mart_settings_override_defaults() {
        let mut snapshot = income_statement();
        snapshot.marts[0].target_lag = Some("5 minutes".into());
        let options = CompileOptions {
            warehouse: Some("WH".into()),
            ..CompileOptions::default()
        };
        let output = compile(&snapshot, "upstream_is", &options);
        let ddl = &output.objects[3].ddl;
        assert!(ddl.contains("TARGET_LAG = '5 minutes'"));
        assert!(ddl.contains("WAREHOUSE = \"WH\""));
    }

    #[test]
    fn test_any_error_withholds_objects() {
        let mut snapshot = income_statement();
        snapshot
            .source_mappings
            .push(SourceMapping::new("SVC_REV", "4000").in_group("1"));
        let output = compile(&snapshot, "upstream_is", &CompileOptions::default());
        assert!(output.has_errors());
        assert!(output.objects.is_empty());
        assert_eq!(output.issues[0].code, "C014");
    }

    #[test]
    fn test_warning_overrides() {
        let mut snapshot = income_statement();
        snapshot.formula_groups[0]
            .rules
            .push(FormulaRule::new("REV", Operation::Multiply).constant(2.0));

        let output = compile(&snapshot, "upstream_is", &CompileOptions::default());
        assert_eq!(output.warning_count(), 1);
        assert_eq!(output.objects.len(), 4);

        let mut options = CompileOptions::default();
        options
            .severity_overrides
            .insert("W003".into(), ConfigSeverity::Error);
        let output = compile(&snapshot, "upstream_is", &options);
        assert_eq!(output.error_count(), 1);
        assert!(output.objects.is_empty());

        options
            .severity_overrides
            .insert("W003".into(), ConfigSeverity::Off);
        let output = compile(&snapshot, "upstream_is", &options);
        assert!(output.issues.is_empty());
        assert_eq!(output.objects.len(), 4);
    }

    #[test]
    fn test_output_serializes_without_bodies() {
        let output = compile(&income_statement(), "upstream_is", &CompileOptions::default());
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["objects"][0]["layer"], "VW_1");
        assert_eq!(json["objects"][0]["object_type"], "VIEW");
        assert_eq!(json["objects"][1]["object_type"], "DYNAMIC_TABLE");
        assert!(json["objects"][0].get("body").is_none());
        assert!(json["objects"][0].get("upstream").is_none());
    }
}
