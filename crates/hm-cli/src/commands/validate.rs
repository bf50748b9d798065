//! Validate command implementation

use anyhow::{Context, Result};
use hm_compile::{CompileOptions, CompileOutput};
use std::sync::Arc;

use crate::cli::{GlobalArgs, ValidateArgs};
use crate::commands::common::{
    self, compile_marts, load_project, print_issues, select_marts, status_line,
};

/// Execute the validate command
pub async fn execute(args: &ValidateArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let names = select_marts(&project, &args.marts);
    println!("Validating {} marts...\n", names.len());

    let options = Arc::new(CompileOptions::from_config(&project.config));
    let snapshot = Arc::new(project.snapshot);
    let outputs = compile_marts(snapshot, &names, options, names.len())
        .await
        .context("Validation did not finish")?;

    for output in &outputs {
        println!("{}", status_line(output));
        print_issues(&output.issues);
    }
    if global.verbose {
        eprintln!("[verbose] Validated {} marts", outputs.len());
    }

    print_summary(&outputs, args.strict)
}

/// Exit code for a validation run: 0 when clean, 3 when a formula cycle
/// was found, 1 for any other failure.
pub(crate) fn exit_code(outputs: &[CompileOutput], strict: bool) -> i32 {
    let errors: usize = outputs.iter().map(CompileOutput::error_count).sum();
    let warnings: usize = outputs.iter().map(CompileOutput::warning_count).sum();
    let has_cycle = outputs
        .iter()
        .flat_map(|o| &o.issues)
        .any(|i| i.code == "C002" || i.code == "C007");

    if errors == 0 && (warnings == 0 || !strict) {
        0
    } else if errors > 0 && has_cycle {
        3
    } else {
        1
    }
}

fn print_summary(outputs: &[CompileOutput], strict: bool) -> Result<()> {
    let errors: usize = outputs.iter().map(CompileOutput::error_count).sum();
    let warnings: usize = outputs.iter().map(CompileOutput::warning_count).sum();

    println!();
    match exit_code(outputs, strict) {
        0 => {
            println!(
                "Validation passed: {} errors, {} warnings",
                errors, warnings
            );
            Ok(())
        }
        code => {
            let mode = if strict && errors == 0 { " (strict mode)" } else { "" };
            println!(
                "Validation failed{}: {} errors, {} warnings",
                mode, errors, warnings
            );
            Err(common::ExitCode(code).into())
        }
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
