//! Configuration types and parsing for hiermart.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main project configuration from hiermart.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name, also the snapshot's project id
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directories containing metadata files (nodes, mappings, formula and
    /// filter groups)
    #[serde(default = "default_metadata_paths")]
    pub metadata_paths: Vec<String>,

    /// Directories containing mart files (`kind: mart`)
    #[serde(default = "default_mart_paths")]
    pub mart_paths: Vec<String>,

    /// Output directory for compiled SQL and manifests
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Dialect used to parse emitted SQL
    #[serde(default)]
    pub dialect: Dialect,

    /// Dynamic table defaults for marts that set none
    #[serde(default)]
    pub defaults: CompileDefaults,

    #[serde(default)]
    pub validation: ValidationConfig,
}

/// SQL dialect selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Snowflake (default)
    #[default]
    Snowflake,
    /// ANSI-ish generic dialect
    Generic,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Snowflake => write!(f, "snowflake"),
            Dialect::Generic => write!(f, "generic"),
        }
    }
}

/// Dynamic table settings applied when a mart does not override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileDefaults {
    #[serde(default = "default_target_lag")]
    pub target_lag: String,

    #[serde(default)]
    pub warehouse: Option<String>,
}

impl Default for CompileDefaults {
    fn default() -> Self {
        Self {
            target_lag: default_target_lag(),
            warehouse: None,
        }
    }
}

/// Severity level for issue overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSeverity {
    /// Warning: reported, output kept
    Warning,
    /// Error: reported, output withheld
    Error,
    /// Disabled: suppress the issue entirely
    Off,
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Override default severities for warning codes.
    ///
    /// Keys are issue codes (e.g. "W001"); errors cannot be downgraded.
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, ConfigSeverity>,
}

/// Issue codes that can be overridden in `validation.severity_overrides`
const OVERRIDABLE_CODES: &[&str] = &["W001", "W002", "W003", "W004"];

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_metadata_paths() -> Vec<String> {
    vec!["metadata".to_string()]
}

fn default_mart_paths() -> Vec<String> {
    vec!["marts".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_target_lag() -> String {
    "1 hour".to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for hiermart.yml or hiermart.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("hiermart.yml");
        let yaml_path = dir.join("hiermart.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.metadata_paths.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "At least one metadata_paths entry must be specified".to_string(),
            });
        }

        if self.defaults.target_lag.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "defaults.target_lag cannot be empty".to_string(),
            });
        }

        for code in self.validation.severity_overrides.keys() {
            if !OVERRIDABLE_CODES.contains(&code.as_str()) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "Unknown or non-overridable code '{}' in validation.severity_overrides. Valid codes: {}",
                        code,
                        OVERRIDABLE_CODES.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    fn paths_absolute(paths: &[String], root: &Path) -> Vec<PathBuf> {
        paths.iter().map(|p| root.join(p)).collect()
    }

    pub fn metadata_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        Self::paths_absolute(&self.metadata_paths, root)
    }

    pub fn mart_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        Self::paths_absolute(&self.mart_paths, root)
    }

    pub fn target_path_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.target_path)
    }

    /// Configured override for an issue code, if any.
    pub fn severity_override(&self, code: &str) -> Option<ConfigSeverity> {
        self.validation.severity_overrides.get(code).copied()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
