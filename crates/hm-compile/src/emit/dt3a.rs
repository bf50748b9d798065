//! DT_3A: fact rows aggregated per branch, plus the rollup pass
//!
//! `BRANCHES` holds one arm per branch joining DT_2 to the fact table.
//! `ROLLUP_ROWS` re-aggregates `BRANCHES` (never DT_2) into the ancestors
//! formulas read raw, so a fact row reaches each ancestor exactly once.

use super::{col, in_list, normalized, DdlSettings, EmitContext, Layer, LayerEmitter};
use crate::branch::Branch;
use hm_core::sql_utils::{quote_ident, quote_qualified, string_literal};
use std::collections::BTreeMap;

pub struct Dt3aEmitter<'c, 'a> {
    ctx: &'c EmitContext<'c, 'a>,
}

impl<'c, 'a> Dt3aEmitter<'c, 'a> {
    pub fn new(ctx: &'c EmitContext<'c, 'a>) -> Self {
        Self { ctx }
    }

    /// Output columns, in order.
    fn output_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = ["HIERARCHY_ID", "ROW_SOURCE", "BRANCH_NAME", "INCLUDE_FLAG"]
            .iter()
            .map(|c| quote_ident(c))
            .collect();
        columns.extend(self.ctx.dimensions().iter().map(|d| quote_ident(d)));
        columns.extend(
            self.ctx
                .mart
                .measures
                .iter()
                .map(|m| quote_ident(&EmitContext::measure_name(m))),
        );
        columns
    }

    /// `CASE` predicate: does the fact value match the mapping row `alias`?
    fn match_predicate(alias: &str, fact_value: &str) -> String {
        format!(
            "(CASE WHEN {} THEN STARTSWITH({}, {}) ELSE {} = {} END)",
            col(alias, "IS_WILDCARD"),
            fact_value,
            col(alias, "MATCH_PREFIX"),
            fact_value,
            col(alias, "MATCH_KEY")
        )
    }

    /// `<alias>` rows of the branch's precedence group and nodes.
    fn membership_predicate(branch: &Branch<'_>, alias: &str) -> String {
        let members: Vec<&str> = branch
            .contributing_node_ids()
            .into_iter()
            .map(|id| id.as_str())
            .collect();
        format!(
            "{} = {} AND {}",
            col(alias, "PRECEDENCE_GROUP"),
            string_literal(&branch.precedence_group),
            in_list(&col(alias, "HIERARCHY_ID"), &members)
        )
    }

    fn filter_value_predicates(branch: &Branch<'_>, alias: &str) -> Vec<String> {
        branch
            .filter_values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let column = col(alias, &format!("FILTER_GROUP_{}", i + 1));
                match value {
                    Some(value) => format!("{} = {}", column, string_literal(value)),
                    None => format!("{} IS NULL", column),
                }
            })
            .collect()
    }

    /// Predicates pinning mapping rows of `alias` to the branch.
    fn branch_predicates(branch: &Branch<'_>, alias: &str) -> Vec<String> {
        let mut predicates = vec![Self::membership_predicate(branch, alias)];
        predicates.extend(Self::filter_value_predicates(branch, alias));
        predicates
    }

    /// Predicates pinning mapping rows of `alias` to any branch sharing
    /// `branch`'s fact rows, whatever its precedence group.
    fn family_predicates(&self, branch: &Branch<'_>, alias: &str) -> Vec<String> {
        let arms: Vec<String> = self
            .ctx
            .branches
            .family(branch)
            .into_iter()
            .map(|b| format!("({})", Self::membership_predicate(b, alias)))
            .collect();
        let mut predicates = vec![format!("({})", arms.join(" OR "))];
        predicates.extend(Self::filter_value_predicates(branch, alias));
        predicates
    }

    /// Node filter groups restricting fact rows, as
    /// `(node NOT IN (...) OR predicate)` guards.
    fn filter_group_predicates(&self, branch: &Branch<'_>) -> Vec<String> {
        let mut by_group: BTreeMap<&str, (String, Vec<&str>)> = BTreeMap::new();
        for id in branch.contributing_node_ids() {
            let Some(group) = self.ctx.graph.filter_group_of(id.as_str()) else {
                continue;
            };
            let Ok(Some(predicate)) = group.render_predicate("F") else {
                continue;
            };
            by_group
                .entry(group.filter_group_id.as_str())
                .or_insert_with(|| (predicate, Vec::new()))
                .1
                .push(id.as_str());
        }
        by_group
            .into_values()
            .map(|(predicate, nodes)| {
                format!(
                    "(NOT {} OR {})",
                    in_list(&col("M", "HIERARCHY_ID"), &nodes),
                    predicate
                )
            })
            .collect()
    }

    fn branch_arm(&self, branch: &Branch<'_>, source: &str) -> String {
        let mart = self.ctx.mart;
        let source_column = branch
            .source_column()
            .unwrap_or_else(|| mart.account_segment.trim());
        let fact_value = normalized(&col("F", source_column));

        let mut columns = vec![
            format!("{} AS {}", col("M", "HIERARCHY_ID"), quote_ident("HIERARCHY_ID")),
            format!("'BRANCH' AS {}", quote_ident("ROW_SOURCE")),
            format!(
                "{} AS {}",
                string_literal(&branch.name),
                quote_ident("BRANCH_NAME")
            ),
            format!("{} AS {}", col("M", "INCLUDE_FLAG"), quote_ident("INCLUDE_FLAG")),
        ];
        for dim in self.ctx.dimensions() {
            columns.push(format!("{} AS {}", col("F", dim), quote_ident(dim)));
        }
        for measure in &mart.measures {
            let name = EmitContext::measure_name(measure);
            columns.push(format!(
                "SUM(CASE WHEN {} = {} THEN {} * {} END) AS {}",
                col("M", "MEASURE_NAME"),
                string_literal(&name),
                col("F", measure.column.trim()),
                col("M", "MEASURE_VALUE"),
                quote_ident(&name)
            ));
        }

        let mut join = vec![Self::match_predicate("M", &fact_value)];
        for (slot, column) in branch.filter_columns() {
            join.push(format!(
                "{} = {}",
                normalized(&col("F", column)),
                col("M", &format!("FILTER_GROUP_{}", slot))
            ));
        }

        let mut predicates = Self::branch_predicates(branch, "M");
        if let Some(filter) = branch
            .join_pattern
            .optional_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
        {
            predicates.push(format!("({})", filter));
        }
        predicates.extend(self.filter_group_predicates(branch));
        if branch.has_overlaps() {
            let mut guard = self.family_predicates(branch, "X");
            guard.push(format!(
                "{} = {}",
                col("X", "MEASURE_NAME"),
                col("M", "MEASURE_NAME")
            ));
            guard.push(format!(
                "{} > {}",
                col("X", "MATCH_SPECIFICITY"),
                col("M", "MATCH_SPECIFICITY")
            ));
            guard.push(Self::match_predicate("X", &fact_value));
            predicates.push(format!(
                "NOT EXISTS (\n        SELECT 1\n        FROM {} AS X\n        WHERE {}\n    )",
                source,
                guard.join("\n            AND ")
            ));
        }

        let mut group_by = vec![col("M", "HIERARCHY_ID"), col("M", "INCLUDE_FLAG")];
        group_by.extend(self.ctx.dimensions().iter().map(|d| col("F", d)));

        format!(
            "SELECT\n    {}\nFROM {} AS M\nJOIN {} AS F\n    ON {}\nWHERE {}\nGROUP BY {}",
            columns.join(",\n    "),
            source,
            quote_qualified(mart.fact_table.trim()),
            join.join("\n    AND "),
            predicates.join("\n    AND "),
            group_by.join(", ")
        )
    }

    fn rollup_cte(&self) -> Option<String> {
        let pairs = self.ctx.rollup.pairs();
        if pairs.is_empty() {
            return None;
        }
        let values: Vec<String> = pairs
            .iter()
            .map(|(child, ancestor)| {
                format!(
                    "({}, {})",
                    string_literal(child.as_str()),
                    string_literal(ancestor.as_str())
                )
            })
            .collect();

        let mut columns = vec![
            format!("{} AS {}", col("R", "ANCESTOR_ID"), quote_ident("HIERARCHY_ID")),
            format!("'ROLLUP' AS {}", quote_ident("ROW_SOURCE")),
            format!("{} AS {}", col("B", "BRANCH_NAME"), quote_ident("BRANCH_NAME")),
            format!("{} AS {}", col("B", "INCLUDE_FLAG"), quote_ident("INCLUDE_FLAG")),
        ];
        let mut group_by = vec![
            col("R", "ANCESTOR_ID"),
            col("B", "BRANCH_NAME"),
            col("B", "INCLUDE_FLAG"),
        ];
        for dim in self.ctx.dimensions() {
            columns.push(format!("{} AS {}", col("B", dim), quote_ident(dim)));
            group_by.push(col("B", dim));
        }
        for measure in &self.ctx.mart.measures {
            let name = EmitContext::measure_name(measure);
            columns.push(format!("SUM({}) AS {}", col("B", &name), quote_ident(&name)));
        }

        Some(format!(
            "SELECT\n    {}\nFROM BRANCHES AS B\nJOIN (VALUES\n    {}\n) AS R ({}, {})\n    ON {} = {}\nWHERE {}\nGROUP BY {}",
            columns.join(",\n    "),
            values.join(",\n    "),
            quote_ident("CHILD_ID"),
            quote_ident("ANCESTOR_ID"),
            col("R", "CHILD_ID"),
            col("B", "HIERARCHY_ID"),
            col("B", "INCLUDE_FLAG"),
            group_by.join(", ")
        ))
    }

    /// Typed, always-empty result for a mart without branches.
    fn empty_body(&self) -> String {
        let mut columns = vec![
            format!("CAST(NULL AS VARCHAR) AS {}", quote_ident("HIERARCHY_ID")),
            format!("CAST(NULL AS VARCHAR) AS {}", quote_ident("ROW_SOURCE")),
            format!("CAST(NULL AS VARCHAR) AS {}", quote_ident("BRANCH_NAME")),
            format!("CAST(NULL AS BOOLEAN) AS {}", quote_ident("INCLUDE_FLAG")),
        ];
        for dim in self.ctx.dimensions() {
            columns.push(format!("CAST(NULL AS VARCHAR) AS {}", quote_ident(dim)));
        }
        for measure in &self.ctx.mart.measures {
            columns.push(format!(
                "CAST(NULL AS NUMBER) AS {}",
                quote_ident(&EmitContext::measure_name(measure))
            ));
        }
        format!("SELECT\n    {}\nWHERE 1 = 0", columns.join(",\n    "))
    }
}

impl LayerEmitter for Dt3aEmitter<'_, '_> {
    fn layer(&self) -> Layer {
        Layer::Dt3a
    }

    fn settings(&self) -> &DdlSettings {
        &self.ctx.settings
    }

    fn body(&self, upstream: Option<&str>) -> String {
        let branches = self.ctx.branches.branches();
        if branches.is_empty() {
            return self.empty_body();
        }
        let source = quote_qualified(upstream.unwrap_or_default());
        let arms: Vec<String> = branches
            .iter()
            .map(|branch| self.branch_arm(branch, &source))
            .collect();

        let columns = self.output_columns().join(", ");
        let mut sql = format!("WITH BRANCHES AS (\n{}\n)", arms.join("\nUNION ALL\n"));
        let rollup = self.rollup_cte();
        if let Some(rollup) = &rollup {
            sql.push_str(&format!(",\nROLLUP_ROWS AS (\n{}\n)", rollup));
        }
        sql.push_str(&format!("\nSELECT {} FROM BRANCHES", columns));
        if rollup.is_some() {
            sql.push_str(&format!("\nUNION ALL\nSELECT {} FROM ROLLUP_ROWS", columns));
        }
        sql
    }
}

#[cfg(test)]
#[path = "dt3a_test.rs"]
mod tests;
