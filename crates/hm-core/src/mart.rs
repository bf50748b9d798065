//! Mart configurations: the unit of compilation.

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::scalar_string_vec;
use crate::sql_utils::object_name_segment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the pattern used when a mart declares no join patterns.
pub const IMPLICIT_PATTERN_NAME: &str = "ACCOUNT";

/// Columns the mart layers emit next to the dimensions and measures.
pub const RESERVED_COLUMNS: [&str; 8] = [
    "HIERARCHY_ID",
    "HIERARCHY_NAME",
    "SORT_ORDER",
    "VALUE_KIND",
    "ROW_SOURCE",
    "BRANCH_NAME",
    "INCLUDE_FLAG",
    "SURROGATE_KEY",
];

/// Mapping-side discriminator a join pattern keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinKey {
    SourceUid,
    /// `FILTER_GROUP_n`, 1-based slot
    FilterGroup(usize),
}

impl JoinKey {
    /// Parse `SOURCE_UID` or `FILTER_GROUP_1`..`FILTER_GROUP_4`.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_uppercase();
        if upper == "SOURCE_UID" {
            return Some(JoinKey::SourceUid);
        }
        let slot: usize = upper.strip_prefix("FILTER_GROUP_")?.parse().ok()?;
        (1..=4).contains(&slot).then_some(JoinKey::FilterGroup(slot))
    }

    /// Column name on the mapping table / translation view.
    pub fn mapping_column(&self) -> String {
        match self {
            JoinKey::SourceUid => "SOURCE_UID".to_string(),
            JoinKey::FilterGroup(slot) => format!("FILTER_GROUP_{}", slot),
        }
    }
}

impl std::fmt::Display for JoinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.mapping_column())
    }
}

/// A named way of joining mappings to the fact table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinPattern {
    pub name: String,

    /// Mapping-side keys, paired positionally with `fact_keys`
    pub join_keys: Vec<String>,

    /// Fact columns
    pub fact_keys: Vec<String>,

    /// Extra predicate over the fact row (alias `F`)
    #[serde(default)]
    pub optional_filter: Option<String>,

    /// Precedence groups this pattern serves; empty serves all
    #[serde(default, deserialize_with = "scalar_string_vec")]
    pub precedence_groups: Vec<String>,
}

impl JoinPattern {
    pub fn new(name: &str, join_keys: &[&str], fact_keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            join_keys: join_keys.iter().map(|k| k.to_string()).collect(),
            fact_keys: fact_keys.iter().map(|k| k.to_string()).collect(),
            optional_filter: None,
            precedence_groups: Vec::new(),
        }
    }

    /// Restrict the pattern to the given precedence groups.
    pub fn for_groups(mut self, groups: &[&str]) -> Self {
        self.precedence_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Parsed `(join key, fact column)` pairs.
    ///
    /// Fails with a description of the first shape problem: unknown key,
    /// length mismatch, duplicate key, blank fact column, or no `SOURCE_UID`.
    pub fn key_pairs(&self) -> Result<Vec<(JoinKey, String)>, String> {
        if self.join_keys.len() != self.fact_keys.len() {
            return Err(format!(
                "join pattern '{}' pairs {} join keys with {} fact keys",
                self.name,
                self.join_keys.len(),
                self.fact_keys.len()
            ));
        }
        let mut seen = HashSet::new();
        let mut pairs = Vec::with_capacity(self.join_keys.len());
        for (raw, fact) in self.join_keys.iter().zip(&self.fact_keys) {
            let key = JoinKey::parse(raw).ok_or_else(|| {
                format!("join pattern '{}' has unknown join key '{}'", self.name, raw)
            })?;
            if !seen.insert(key) {
                return Err(format!(
                    "join pattern '{}' repeats join key {}",
                    self.name, key
                ));
            }
            if fact.trim().is_empty() {
                return Err(format!(
                    "join pattern '{}' has a blank fact key for {}",
                    self.name, key
                ));
            }
            pairs.push((key, fact.trim().to_string()));
        }
        if !seen.contains(&JoinKey::SourceUid) {
            return Err(format!(
                "join pattern '{}' must key on SOURCE_UID",
                self.name
            ));
        }
        Ok(pairs)
    }

    /// Filter-group slots the pattern keys on, ascending.
    pub fn filter_slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .join_keys
            .iter()
            .filter_map(|k| match JoinKey::parse(k) {
                Some(JoinKey::FilterGroup(slot)) => Some(slot),
                _ => None,
            })
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Whether the pattern serves `precedence_group`.
    pub fn serves(&self, precedence_group: &str) -> bool {
        self.precedence_groups.is_empty()
            || self
                .precedence_groups
                .iter()
                .any(|g| g.trim() == precedence_group.trim())
    }
}

/// Whether a measure carries monetary amounts or volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    Amount,
    Volume,
}

/// A fact measure carried through the mart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasureColumn {
    /// Output column name
    pub name: String,
    /// Fact column
    pub column: String,
    pub kind: MeasureKind,
}

impl MeasureColumn {
    pub fn new(name: &str, column: &str, kind: MeasureKind) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            kind,
        }
    }
}

fn default_measures() -> Vec<MeasureColumn> {
    vec![
        MeasureColumn::new("AMOUNT", "AMOUNT", MeasureKind::Amount),
        MeasureColumn::new("VOLUME", "VOLUME", MeasureKind::Volume),
    ]
}

/// Per-layer object name overrides (bare names, unqualified).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerNameOverrides {
    #[serde(default)]
    pub vw_1: Option<String>,
    #[serde(default)]
    pub dt_2: Option<String>,
    #[serde(default)]
    pub dt_3a: Option<String>,
    #[serde(default)]
    pub dt_3: Option<String>,
}

/// Configuration of one data mart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MartConfig {
    /// Config name used to look the mart up
    pub name: String,

    pub project_name: String,

    pub report_type: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Qualified hierarchy table (`DB.SCHEMA.TABLE`)
    pub hierarchy_table: String,

    /// Qualified mapping table
    pub mapping_table: String,

    /// Qualified fact table
    pub fact_table: String,

    /// Fact column holding account codes
    #[serde(default)]
    pub account_segment: String,

    pub target_database: String,

    pub target_schema: String,

    /// Fact foreign-key columns kept as mart dimensions
    #[serde(default)]
    pub dimensions: Vec<String>,

    #[serde(default = "default_measures")]
    pub measures: Vec<MeasureColumn>,

    #[serde(default)]
    pub join_patterns: Vec<JoinPattern>,

    #[serde(default)]
    pub target_lag: Option<String>,

    #[serde(default)]
    pub warehouse: Option<String>,

    #[serde(default)]
    pub object_names: LayerNameOverrides,
}

impl MartConfig {
    /// Create a mart with default measures and no join patterns.
    pub fn new(name: &str, project_name: &str, report_type: &str) -> Self {
        Self {
            name: name.to_string(),
            project_name: project_name.to_string(),
            report_type: report_type.to_string(),
            description: None,
            hierarchy_table: String::new(),
            mapping_table: String::new(),
            fact_table: String::new(),
            account_segment: String::new(),
            target_database: String::new(),
            target_schema: String::new(),
            dimensions: Vec::new(),
            measures: default_measures(),
            join_patterns: Vec::new(),
            target_lag: None,
            warehouse: None,
            object_names: LayerNameOverrides::default(),
        }
    }

    /// Add a join pattern; names must be unique (case-insensitive).
    pub fn add_join_pattern(&mut self, pattern: JoinPattern) -> CoreResult<()> {
        if pattern.name.trim().is_empty() {
            return Err(CoreError::EmptyName {
                context: format!("join pattern of mart '{}'", self.name),
            });
        }
        if self.find_join_pattern(&pattern.name).is_some() {
            return Err(CoreError::DuplicateJoinPattern {
                mart: self.name.clone(),
                pattern: pattern.name,
            });
        }
        self.join_patterns.push(pattern);
        Ok(())
    }

    /// Remove a join pattern by name, returning it.
    pub fn remove_join_pattern(&mut self, name: &str) -> CoreResult<JoinPattern> {
        let idx = self
            .join_patterns
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::JoinPatternNotFound {
                mart: self.name.clone(),
                pattern: name.to_string(),
            })?;
        Ok(self.join_patterns.remove(idx))
    }

    pub fn find_join_pattern(&self, name: &str) -> Option<&JoinPattern> {
        self.join_patterns
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// The pattern used when `join_patterns` is empty:
    /// `SOURCE_UID` against `account_segment`.
    pub fn implicit_join_pattern(&self) -> JoinPattern {
        JoinPattern::new(
            IMPLICIT_PATTERN_NAME,
            &["SOURCE_UID"],
            &[self.account_segment.trim()],
        )
    }

    /// Upper snake base for generated object names.
    pub fn base_name(&self) -> String {
        object_name_segment(&format!("{}_{}", self.project_name, self.report_type))
    }

    /// Every shape problem of the config, in a stable order.
    pub fn shape_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let required = [
            ("name", &self.name),
            ("project_name", &self.project_name),
            ("report_type", &self.report_type),
            ("hierarchy_table", &self.hierarchy_table),
            ("mapping_table", &self.mapping_table),
            ("fact_table", &self.fact_table),
            ("target_database", &self.target_database),
            ("target_schema", &self.target_schema),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("'{}' must not be empty", field));
            }
        }
        if self.join_patterns.is_empty() && self.account_segment.trim().is_empty() {
            problems.push("'account_segment' is required when no join patterns are declared".into());
        }
        if !self.report_type.trim().is_empty() && self.base_name().is_empty() {
            problems.push("project_name/report_type yield an empty object name".into());
        }

        if self.measures.is_empty() {
            problems.push("at least one measure is required".into());
        }
        let mut measure_names = HashSet::new();
        for measure in &self.measures {
            let normalized = object_name_segment(&measure.name);
            if normalized.is_empty() || measure.column.trim().is_empty() {
                problems.push(format!("measure '{}' needs a name and a column", measure.name));
            } else if !measure_names.insert(normalized) {
                problems.push(format!("measure '{}' is declared twice", measure.name));
            }
        }

        let mut dims = HashSet::new();
        for dim in &self.dimensions {
            let upper = dim.trim().to_uppercase();
            if upper.is_empty() {
                problems.push("dimension names must not be empty".into());
            } else if RESERVED_COLUMNS.contains(&upper.as_str()) {
                problems.push(format!("dimension '{}' clashes with a generated column", dim));
            } else if measure_names.contains(&upper) {
                problems.push(format!("dimension '{}' clashes with a measure", dim));
            } else if !dims.insert(upper) {
                problems.push(format!("dimension '{}' is declared twice", dim));
            }
        }
        for measure in &self.measures {
            if RESERVED_COLUMNS.contains(&object_name_segment(&measure.name).as_str()) {
                problems.push(format!("measure '{}' clashes with a generated column", measure.name));
            }
        }

        let mut pattern_names = HashSet::new();
        for pattern in &self.join_patterns {
            if pattern.name.trim().is_empty() {
                problems.push("join pattern names must not be empty".into());
            } else if !pattern_names.insert(pattern.name.to_uppercase()) {
                problems.push(format!("join pattern '{}' is declared twice", pattern.name));
            }
            if let Err(problem) = pattern.key_pairs() {
                problems.push(problem);
            }
        }
        problems
    }
}
