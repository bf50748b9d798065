//! Source mappings: bindings from leaf nodes to physical source values.

use crate::ids::HierarchyId;
use crate::serde_helpers::{
    default_precedence_group, default_true, opt_scalar_string, scalar_string,
};
use serde::{Deserialize, Serialize};

/// Specificity assigned to exact (non-wildcard) patterns.
///
/// Exact matches outrank every wildcard; wildcards rank by literal prefix
/// length. The same constant is emitted into VW_1's `MATCH_SPECIFICITY`.
pub const EXACT_SPECIFICITY: usize = 1_000_000;

/// Upper-case and trim a source value the way the mart compares them.
pub fn normalize_source_value(value: &str) -> String {
    value.trim().to_uppercase()
}

/// A binding from a leaf node to a physical source value or pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceMapping {
    /// Leaf node receiving the matched rows
    pub hierarchy_id: HierarchyId,

    /// Disambiguates multiple mappings contributing to the same node
    #[serde(default = "default_precedence_group", deserialize_with = "scalar_string")]
    pub precedence_group: String,

    #[serde(default)]
    pub source_database: String,

    #[serde(default)]
    pub source_schema: String,

    #[serde(default)]
    pub source_table: String,

    #[serde(default)]
    pub source_column: String,

    /// Exact value or trailing-`%` wildcard
    #[serde(deserialize_with = "scalar_string")]
    pub source_uid: String,

    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub filter_group_1: Option<String>,

    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub filter_group_2: Option<String>,

    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub filter_group_3: Option<String>,

    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub filter_group_4: Option<String>,

    #[serde(default = "default_true")]
    pub active_flag: bool,

    #[serde(default = "default_true")]
    pub include_flag: bool,

    #[serde(default)]
    pub exclude_flag: bool,

    /// Bridge weight for many-to-many allocations (fraction of 1.0)
    #[serde(default)]
    pub allocation_weight: Option<f64>,
}

impl SourceMapping {
    /// Create an active mapping of `source_uid` onto `hierarchy_id`.
    pub fn new(hierarchy_id: &str, source_uid: &str) -> Self {
        Self {
            hierarchy_id: HierarchyId::new(hierarchy_id),
            precedence_group: default_precedence_group(),
            source_database: String::new(),
            source_schema: String::new(),
            source_table: String::new(),
            source_column: String::new(),
            source_uid: source_uid.to_string(),
            filter_group_1: None,
            filter_group_2: None,
            filter_group_3: None,
            filter_group_4: None,
            active_flag: true,
            include_flag: true,
            exclude_flag: false,
            allocation_weight: None,
        }
    }

    /// Set the precedence group.
    pub fn in_group(mut self, precedence_group: &str) -> Self {
        self.precedence_group = precedence_group.to_string();
        self
    }

    /// Set one of the four filter-group discriminators (1-based slot).
    pub fn with_filter_group(mut self, slot: usize, value: &str) -> Self {
        let value = Some(value.to_string());
        match slot {
            1 => self.filter_group_1 = value,
            2 => self.filter_group_2 = value,
            3 => self.filter_group_3 = value,
            4 => self.filter_group_4 = value,
            _ => {}
        }
        self
    }

    /// Set the bridge allocation weight.
    pub fn weighted(mut self, weight: f64) -> Self {
        self.allocation_weight = Some(weight);
        self
    }

    /// Set the physical source location.
    pub fn at(mut self, database: &str, schema: &str, table: &str, column: &str) -> Self {
        self.source_database = database.to_string();
        self.source_schema = schema.to_string();
        self.source_table = table.to_string();
        self.source_column = column.to_string();
        self
    }

    /// Parsed match pattern of `source_uid`.
    pub fn pattern(&self) -> SourcePattern {
        SourcePattern::parse(&self.source_uid)
    }

    /// Normalized filter-group discriminators; blank values count as absent.
    pub fn filter_groups(&self) -> [Option<String>; 4] {
        [
            &self.filter_group_1,
            &self.filter_group_2,
            &self.filter_group_3,
            &self.filter_group_4,
        ]
        .map(|slot| {
            slot.as_deref()
                .map(normalize_source_value)
                .filter(|v| !v.is_empty())
        })
    }

    /// Physical location as `DB.SCHEMA.TABLE.COLUMN` (empty parts skipped).
    pub fn source_location(&self) -> String {
        [
            self.source_database.as_str(),
            self.source_schema.as_str(),
            self.source_table.as_str(),
            self.source_column.as_str(),
        ]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
    }
}

/// A normalized `source_uid` match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePattern {
    key: String,
    prefix: String,
    wildcard: bool,
}

impl SourcePattern {
    /// Parse a raw `source_uid`. Trailing `%` characters make a wildcard.
    pub fn parse(raw: &str) -> Self {
        let key = normalize_source_value(raw);
        let wildcard = key.ends_with('%');
        let prefix = key.trim_end_matches('%').to_string();
        Self {
            key,
            prefix,
            wildcard,
        }
    }

    /// Full normalized pattern (including `%`).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Literal part of the pattern.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Ranking used for most-specific-prefix-wins resolution.
    pub fn specificity(&self) -> usize {
        if self.wildcard {
            self.prefix.chars().count()
        } else {
            EXACT_SPECIFICITY
        }
    }

    /// Whether a fact value matches, after upper-trimming it.
    pub fn matches(&self, value: &str) -> bool {
        let value = normalize_source_value(value);
        if self.wildcard {
            value.starts_with(&self.prefix)
        } else {
            value == self.prefix
        }
    }

    /// Whether some fact value could match both patterns.
    pub fn overlaps(&self, other: &SourcePattern) -> bool {
        match (self.wildcard, other.wildcard) {
            (true, true) => {
                self.prefix.starts_with(&other.prefix) || other.prefix.starts_with(&self.prefix)
            }
            (true, false) => other.prefix.starts_with(&self.prefix),
            (false, true) => self.prefix.starts_with(&other.prefix),
            (false, false) => self.prefix == other.prefix,
        }
    }
}

impl std::fmt::Display for SourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
#[path = "mapping_test.rs"]
mod tests;
