//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use hm_compile::{compile, CompileOptions, CompileOutput, Issue};
use hm_core::{Project, Snapshot};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main exits without printing it.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load a project from the directory specified in global CLI arguments.
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    Project::load(Path::new(&global.project_dir)).context("Failed to load project")
}

/// Mart names from a comma-separated `--marts` value, or every mart in the
/// project. Unknown names are kept so the compiler reports them.
pub(crate) fn select_marts(project: &Project, marts_arg: &Option<String>) -> Vec<String> {
    match marts_arg {
        Some(marts) => marts
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => project
            .mart_names()
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

/// Compile `names` against one shared snapshot, at most `threads` at a time.
///
/// Outputs come back in the order of `names`.
pub(crate) async fn compile_marts(
    snapshot: Arc<Snapshot>,
    names: &[String],
    options: Arc<CompileOptions>,
    threads: usize,
) -> Result<Vec<CompileOutput>> {
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let mut handles = Vec::with_capacity(names.len());

    for name in names {
        let snapshot = Arc::clone(&snapshot);
        let options = Arc::clone(&options);
        let semaphore = Arc::clone(&semaphore);
        let name = name.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("Compile semaphore closed")?;
            let output =
                tokio::task::spawn_blocking(move || compile(&snapshot, &name, &options)).await?;
            Ok::<_, anyhow::Error>(output)
        }));
    }

    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.context("Compile task failed")??);
    }
    Ok(outputs)
}

/// Print every issue of a mart, indented under its status line.
pub(crate) fn print_issues(issues: &[Issue]) {
    for issue in issues {
        println!("    {}", issue);
    }
}

/// Status glyph and counts for one mart.
pub(crate) fn status_line(output: &CompileOutput) -> String {
    let glyph = if output.has_errors() { "✗" } else { "✓" };
    format!(
        "  {} {} ({} objects, {} errors, {} warnings)",
        glyph,
        output.mart,
        output.objects.len(),
        output.error_count(),
        output.warning_count()
    )
}
