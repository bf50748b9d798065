//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Hiermart - compile hierarchy metadata into warehouse mart objects
#[derive(Parser, Debug)]
#[command(name = "hm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".", env = "HIERMART_PROJECT_DIR")]
    pub project_dir: String,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile marts to SQL files and manifests
    Compile(CompileArgs),

    /// Compile marts without writing files and report issues
    Validate(ValidateArgs),

    /// List marts or the hierarchy tree
    Ls(LsArgs),
}

/// Arguments for the compile command
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Mart names to compile (comma-separated, default: all)
    #[arg(short, long)]
    pub marts: Option<String>,

    /// Override output directory
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Marts compiled at once
    #[arg(short = 'j', long, default_value_t = 4)]
    pub threads: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Mart names to validate (comma-separated, default: all)
    #[arg(short, long)]
    pub marts: Option<String>,

    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: LsOutput,
}

/// Compile output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable progress
    Text,
    /// JSON summary
    Json,
}

/// List output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsOutput {
    /// Table of marts
    Table,
    /// JSON list of marts
    Json,
    /// Hierarchy tree
    Tree,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
