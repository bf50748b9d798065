//! VW_1: hierarchy joined to its source mappings
//!
//! One row per mapping of a compiled node, carrying the node's flags, its
//! level path, the normalized match columns the branch join uses, and the
//! compile-time formula metadata.

use super::{col, in_list, normalized, DdlSettings, EmitContext, Layer, LayerEmitter};
use hm_core::sql_utils::{quote_ident, quote_qualified, string_literal};
use hm_core::EXACT_SPECIFICITY;
use std::collections::BTreeSet;

pub struct Vw1Emitter<'c, 'a> {
    ctx: &'c EmitContext<'c, 'a>,
}

impl<'c, 'a> Vw1Emitter<'c, 'a> {
    pub fn new(ctx: &'c EmitContext<'c, 'a>) -> Self {
        Self { ctx }
    }

    /// Non-calculated nodes with at least one active mapping.
    fn leaf_ids(&self) -> Vec<&'a str> {
        let graph = self.ctx.graph;
        let ids: BTreeSet<&'a str> = graph
            .mappings()
            .iter()
            .map(|m| m.hierarchy_id.as_str())
            .filter(|id| !graph.is_calculated(id))
            .collect();
        ids.into_iter().collect()
    }

    fn formula_columns(&self, leaf_ids: &[&'a str]) -> Vec<String> {
        let memberships: Vec<_> = leaf_ids
            .iter()
            .filter_map(|id| self.ctx.graph.membership(id).map(|m| (*id, m)))
            .collect();
        let node = col("H", "HIERARCHY_ID");

        let case_column = |alias: &str, sql_type: &str, arms: Vec<(&str, String)>| -> String {
            if arms.is_empty() {
                return format!("CAST(NULL AS {}) AS {}", sql_type, quote_ident(alias));
            }
            let whens: Vec<String> = arms
                .into_iter()
                .map(|(id, value)| format!("WHEN {} THEN {}", string_literal(id), value))
                .collect();
            format!("CASE {} {} END AS {}", node, whens.join(" "), quote_ident(alias))
        };

        vec![
            case_column(
                "FORMULA_GROUP",
                "VARCHAR",
                memberships
                    .iter()
                    .map(|(id, m)| (*id, string_literal(m.formula_group_id)))
                    .collect(),
            ),
            case_column(
                "FORMULA_ROLE",
                "VARCHAR",
                memberships
                    .iter()
                    .map(|(id, m)| (*id, string_literal(&m.role.to_string())))
                    .collect(),
            ),
            case_column(
                "FORMULA_PRECEDENCE",
                "INTEGER",
                memberships
                    .iter()
                    .filter_map(|(id, m)| m.precedence.map(|p| (*id, p.to_string())))
                    .collect(),
            ),
            case_column(
                "SIGN_CHANGE_FLAG",
                "BOOLEAN",
                memberships
                    .iter()
                    .filter_map(|(id, m)| {
                        m.sign_change_flag
                            .map(|flag| (*id, if flag { "TRUE" } else { "FALSE" }.to_string()))
                    })
                    .collect(),
            ),
        ]
    }
}

impl LayerEmitter for Vw1Emitter<'_, '_> {
    fn layer(&self) -> Layer {
        Layer::Vw1
    }

    fn settings(&self) -> &DdlSettings {
        &self.ctx.settings
    }

    fn body(&self, _upstream: Option<&str>) -> String {
        let mart = self.ctx.mart;
        let leaf_ids = self.leaf_ids();
        let match_key = normalized(&col("M", "SOURCE_UID"));
        let wildcard = format!("ENDSWITH({}, '%')", match_key);
        let prefix = format!("RTRIM({}, '%')", match_key);

        let mut columns = vec![
            format!("{} AS {}", col("H", "HIERARCHY_ID"), quote_ident("HIERARCHY_ID")),
            format!("{} AS {}", col("H", "HIERARCHY_NAME"), quote_ident("HIERARCHY_NAME")),
            format!("{} AS {}", col("H", "PARENT_ID"), quote_ident("PARENT_ID")),
            format!("{} AS {}", col("H", "SORT_ORDER"), quote_ident("SORT_ORDER")),
        ];
        for level in 1..=self.ctx.graph.tree().depth() {
            let name = format!("LEVEL_{}", level);
            columns.push(format!("{} AS {}", col("H", &name), quote_ident(&name)));
        }
        columns.push(format!(
            "TRIM(CAST({} AS VARCHAR)) AS {}",
            col("M", "PRECEDENCE_GROUP"),
            quote_ident("PRECEDENCE_GROUP")
        ));
        for location in ["SOURCE_DATABASE", "SOURCE_SCHEMA", "SOURCE_TABLE", "SOURCE_COLUMN", "SOURCE_UID"] {
            columns.push(format!("{} AS {}", col("M", location), quote_ident(location)));
        }
        columns.push(format!("{} AS {}", match_key, quote_ident("MATCH_KEY")));
        columns.push(format!("{} AS {}", prefix, quote_ident("MATCH_PREFIX")));
        columns.push(format!("{} AS {}", wildcard, quote_ident("IS_WILDCARD")));
        columns.push(format!(
            "CASE WHEN {} THEN LENGTH({}) ELSE {} END AS {}",
            wildcard,
            prefix,
            EXACT_SPECIFICITY,
            quote_ident("MATCH_SPECIFICITY")
        ));
        for slot in 1..=4 {
            let name = format!("FILTER_GROUP_{}", slot);
            columns.push(format!(
                "NULLIF({}, '') AS {}",
                normalized(&col("M", &name)),
                quote_ident(&name)
            ));
        }
        columns.push(format!(
            "(COALESCE({}, TRUE) AND COALESCE({}, TRUE)) AS {}",
            col("H", "INCLUDE_FLAG"),
            col("M", "INCLUDE_FLAG"),
            quote_ident("INCLUDE_FLAG")
        ));
        columns.push(format!(
            "COALESCE({}, FALSE) AS {}",
            col("H", "EXCLUDE_FLAG"),
            quote_ident("NODE_EXCLUDE_FLAG")
        ));
        columns.push(format!(
            "COALESCE({}, FALSE) AS {}",
            col("M", "EXCLUDE_FLAG"),
            quote_ident("MAPPING_EXCLUDE_FLAG")
        ));
        for measure in &mart.measures {
            columns.push(format!(
                "COALESCE({}, 1) AS {}",
                col("M", "ALLOCATION_WEIGHT"),
                quote_ident(&format!("{}_WEIGHT", EmitContext::measure_name(measure)))
            ));
        }
        columns.extend(self.formula_columns(&leaf_ids));

        format!(
            "SELECT\n    {}\nFROM {} AS H\nJOIN {} AS M\n    ON {} = {}\nWHERE COALESCE({}, TRUE)\n    AND COALESCE({}, TRUE)\n    AND {}",
            columns.join(",\n    "),
            quote_qualified(mart.hierarchy_table.trim()),
            quote_qualified(mart.mapping_table.trim()),
            col("M", "HIERARCHY_ID"),
            col("H", "HIERARCHY_ID"),
            col("H", "ACTIVE_FLAG"),
            col("M", "ACTIVE_FLAG"),
            in_list(&col("H", "HIERARCHY_ID"), &leaf_ids)
        )
    }
}
