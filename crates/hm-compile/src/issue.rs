//! Compile issues and the collector that grades them

use crate::error::CompileError;
use hm_core::ConfigSeverity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported with the output
    Warning,
    /// Output withheld
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single compile issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy_id: Option<String>,
}

impl Issue {
    /// Issue for `error` at its default severity.
    pub fn from_error(error: &CompileError) -> Self {
        let rendered = error.to_string();
        let prefix = format!("[{}] ", error.code());
        let message = rendered
            .strip_prefix(&prefix)
            .map(str::to_string)
            .unwrap_or(rendered);
        Self {
            severity: error.severity(),
            code: error.code().to_string(),
            message,
            hierarchy_id: error.hierarchy_id().map(str::to_string),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}

/// Collects issues and applies warning severity overrides.
#[derive(Debug, Default)]
pub struct IssueCollector {
    overrides: BTreeMap<String, ConfigSeverity>,
    issues: Vec<Issue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that re-grades warning codes. Overrides for error codes are
    /// ignored; errors cannot be downgraded.
    pub fn with_overrides(overrides: &BTreeMap<String, ConfigSeverity>) -> Self {
        Self {
            overrides: overrides.clone(),
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, error: CompileError) {
        let mut issue = Issue::from_error(&error);
        if issue.severity == Severity::Warning {
            match self.overrides.get(&issue.code) {
                Some(ConfigSeverity::Off) => {
                    log::debug!("Suppressed {}", issue);
                    return;
                }
                Some(ConfigSeverity::Error) => issue.severity = Severity::Error,
                Some(ConfigSeverity::Warning) | None => {}
            }
        }
        self.issues.push(issue);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = CompileError>) {
        for error in errors {
            self.push(error);
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

    /// Issues ordered errors first, then by code and message.
    pub fn into_sorted(self) -> Vec<Issue> {
        let mut issues = self.issues;
        issues.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        issues.dedup();
        issues
    }
}
