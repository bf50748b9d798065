//! Compile command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hm_compile::{CompileOptions, CompileOutput, Issue, Layer, LayerObject, ObjectType};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{CompileArgs, GlobalArgs, OutputFormat};
use crate::commands::common::{
    self, compile_marts, load_project, print_issues, select_marts, status_line,
};

/// Manifest written next to a mart's SQL files
#[derive(Debug, Serialize)]
pub(crate) struct MartManifest<'a> {
    pub project: &'a str,
    pub mart: &'a str,
    /// Fingerprint of the snapshot the mart was compiled from
    pub fingerprint: &'a str,
    pub generated_at: DateTime<Utc>,
    pub objects: Vec<ManifestObject<'a>>,
    pub issues: &'a [Issue],
}

/// One emitted object in the manifest
#[derive(Debug, Serialize)]
pub(crate) struct ManifestObject<'a> {
    pub layer: Layer,
    pub name: &'a str,
    pub object_type: ObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<&'a str>,
    /// SQL file, relative to the mart directory
    pub path: String,
}

/// Per-mart line of the JSON summary
#[derive(Debug, Serialize)]
struct MartSummary<'a> {
    mart: &'a str,
    status: &'static str,
    directory: String,
    objects: usize,
    errors: usize,
    warnings: usize,
    issues: &'a [Issue],
}

/// Execute the compile command
pub async fn execute(args: &CompileArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let names = select_marts(&project, &args.marts);
    let output_dir = args
        .output_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| project.target_dir().join("compiled"));
    if names.is_empty() {
        log::warn!("No marts selected in {}", project.root.display());
    }

    if global.verbose {
        eprintln!(
            "[verbose] Compiling {} marts with {} threads",
            names.len(),
            args.threads
        );
    }
    if args.format == OutputFormat::Text {
        println!("Compiling {} marts...\n", names.len());
    }

    let fingerprint = project
        .snapshot
        .fingerprint()
        .context("Failed to fingerprint snapshot")?;
    let generated_at = Utc::now();
    let options = Arc::new(CompileOptions::from_config(&project.config));
    let snapshot = Arc::new(project.snapshot);
    let outputs = compile_marts(snapshot, &names, options, args.threads).await?;

    let mut summaries = Vec::with_capacity(outputs.len());
    for output in &outputs {
        let mart_dir = output_dir.join(&output.mart);
        let manifest = MartManifest {
            project: &project.config.name,
            mart: &output.mart,
            fingerprint: &fingerprint,
            generated_at,
            objects: output.objects.iter().map(manifest_object).collect(),
            issues: &output.issues,
        };
        write_mart(&mart_dir, &output.objects, &manifest)?;

        if global.verbose {
            eprintln!("[verbose] Wrote {}", mart_dir.display());
        }
        match args.format {
            OutputFormat::Text => {
                println!("{}", status_line(output));
                print_issues(&output.issues);
            }
            OutputFormat::Json => summaries.push(summary(output, &mart_dir)),
        }
    }

    let failed = outputs.iter().filter(|o| o.has_errors()).count();
    match args.format {
        OutputFormat::Text => {
            println!(
                "\nCompiled {} marts to {} ({} failed)",
                outputs.len(),
                output_dir.display(),
                failed
            );
        }
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&summaries).context("Failed to serialize to JSON")?;
            println!("{}", json);
        }
    }

    if failed > 0 {
        return Err(common::ExitCode(1).into());
    }
    Ok(())
}

fn summary<'a>(output: &'a CompileOutput, mart_dir: &Path) -> MartSummary<'a> {
    MartSummary {
        mart: &output.mart,
        status: if output.has_errors() { "error" } else { "success" },
        directory: mart_dir.display().to_string(),
        objects: output.objects.len(),
        errors: output.error_count(),
        warnings: output.warning_count(),
        issues: &output.issues,
    }
}

fn manifest_object(object: &LayerObject) -> ManifestObject<'_> {
    ManifestObject {
        layer: object.layer,
        name: &object.name,
        object_type: object.object_type,
        upstream: object.upstream.as_deref(),
        path: sql_file_name(object),
    }
}

/// `<NN>_<OBJECT>.sql`, numbered in layer order.
pub(crate) fn sql_file_name(object: &LayerObject) -> String {
    let bare = object.name.rsplit('.').next().unwrap_or(&object.name);
    format!("{:02}_{}.sql", object.layer.index(), bare)
}

/// Replace a mart's directory with its SQL files and manifest.
///
/// A mart with errors keeps only the manifest, so stale SQL never sits
/// next to a failed compile.
pub(crate) fn write_mart(dir: &Path, objects: &[LayerObject], manifest: &MartManifest<'_>) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to clear {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for object in objects {
        let path = dir.join(sql_file_name(object));
        std::fs::write(&path, &object.ddl)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
    std::fs::write(dir.join("manifest.json"), json).context("Failed to write manifest")?;
    Ok(())
}

#[cfg(test)]
#[path = "compile_test.rs"]
mod tests;
