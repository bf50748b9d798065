//! DT_3: the final mart
//!
//! `LEVEL_0` pivots DT_3A into one `RAW` row per node and dimension tuple.
//! Each `LEVEL_k` appends the `CALC` rows of the k-th formula layer, computed
//! from the level before it. The final select adds the surrogate key and the
//! node's name and sort order.

use super::{col, DdlSettings, EmitContext, Layer, LayerEmitter};
use crate::precedence::{CalcPlan, Operand};
use hm_core::sql_utils::{quote_ident, quote_qualified, string_literal};

pub struct Dt3Emitter<'c, 'a> {
    ctx: &'c EmitContext<'c, 'a>,
}

impl<'c, 'a> Dt3Emitter<'c, 'a> {
    pub fn new(ctx: &'c EmitContext<'c, 'a>) -> Self {
        Self { ctx }
    }

    fn measure_names(&self) -> Vec<String> {
        self.ctx
            .mart
            .measures
            .iter()
            .map(EmitContext::measure_name)
            .collect()
    }

    fn level_zero(&self, source: &str) -> String {
        let dims = self.ctx.dimensions();
        let mut columns = vec![
            format!("{} AS {}", col("P", "HIERARCHY_ID"), quote_ident("HIERARCHY_ID")),
            format!("'RAW' AS {}", quote_ident("VALUE_KIND")),
        ];
        let mut group_by = vec![col("P", "HIERARCHY_ID")];
        for dim in &dims {
            columns.push(format!("{} AS {}", col("P", dim), quote_ident(dim)));
            group_by.push(col("P", dim));
        }
        for name in self.measure_names() {
            columns.push(format!("SUM({}) AS {}", col("P", &name), quote_ident(&name)));
        }
        format!(
            "SELECT\n    {}\nFROM {} AS P\nGROUP BY {}",
            columns.join(",\n    "),
            source,
            group_by.join(", ")
        )
    }

    /// Rows of the previous level, unchanged.
    fn passthrough(&self, previous: &str) -> String {
        let mut columns = vec![col("L", "HIERARCHY_ID"), col("L", "VALUE_KIND")];
        columns.extend(self.ctx.dimensions().iter().map(|d| col("L", d)));
        columns.extend(self.measure_names().iter().map(|m| col("L", m)));
        format!("SELECT {} FROM {} AS L", columns.join(", "), previous)
    }

    /// `CALC` rows of one calculated node, or `None` when its formula
    /// reads nothing.
    fn calc_arm(&self, calc: &CalcPlan, previous: &str) -> Option<String> {
        let operands = calc.expr.operands();
        if operands.is_empty() {
            return None;
        }
        let present = |op: &Operand| {
            format!(
                "{} = {} AND {} = {}",
                col("L", "HIERARCHY_ID"),
                string_literal(op.hierarchy_id().as_str()),
                col("L", "VALUE_KIND"),
                string_literal(op.value_kind())
            )
        };

        let dims = self.ctx.dimensions();
        let mut columns = vec![
            format!(
                "{} AS {}",
                string_literal(calc.hierarchy_id.as_str()),
                quote_ident("HIERARCHY_ID")
            ),
            format!("'CALC' AS {}", quote_ident("VALUE_KIND")),
        ];
        for dim in &dims {
            columns.push(format!("{} AS {}", col("L", dim), quote_ident(dim)));
        }
        for measure in &self.ctx.mart.measures {
            let name = EmitContext::measure_name(measure);
            let read = |op: &Operand| {
                format!("SUM(CASE WHEN {} THEN {} END)", present(op), col("L", &name))
            };
            columns.push(format!(
                "{} AS {}",
                calc.expr.render(measure.kind, &read),
                quote_ident(&name)
            ));
        }

        let presence: Vec<String> = operands.iter().map(|op| format!("({})", present(op))).collect();
        let mut sql = format!(
            "SELECT\n    {}\nFROM {} AS L",
            columns.join(",\n    "),
            previous
        );
        if !dims.is_empty() {
            let group_by: Vec<String> = dims.iter().map(|d| col("L", d)).collect();
            sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
        }
        sql.push_str(&format!(
            "\nHAVING COUNT(CASE WHEN {} THEN 1 END) > 0",
            presence.join(" OR ")
        ));
        Some(sql)
    }

    fn final_select(&self, last_level: &str) -> String {
        let dims = self.ctx.dimensions();
        let mut key_parts = vec![col("R", "HIERARCHY_ID"), col("R", "VALUE_KIND")];
        key_parts.extend(
            dims.iter()
                .map(|d| format!("COALESCE(CAST({} AS VARCHAR), '')", col("R", d))),
        );

        let mut columns = vec![
            format!(
                "SHA2(CONCAT_WS('|', {}), 256) AS {}",
                key_parts.join(", "),
                quote_ident("SURROGATE_KEY")
            ),
            format!("{} AS {}", col("R", "HIERARCHY_ID"), quote_ident("HIERARCHY_ID")),
            format!("{} AS {}", col("H", "HIERARCHY_NAME"), quote_ident("HIERARCHY_NAME")),
            format!("{} AS {}", col("H", "SORT_ORDER"), quote_ident("SORT_ORDER")),
            format!("{} AS {}", col("R", "VALUE_KIND"), quote_ident("VALUE_KIND")),
        ];
        for dim in &dims {
            columns.push(format!("{} AS {}", col("R", dim), quote_ident(dim)));
        }
        for name in self.measure_names() {
            columns.push(format!("{} AS {}", col("R", &name), quote_ident(&name)));
        }

        format!(
            "SELECT\n    {}\nFROM {} AS R\nLEFT JOIN (\n    SELECT {}, {}, {}\n    FROM {}\n    WHERE COALESCE({}, TRUE)\n) AS H\n    ON {} = {}",
            columns.join(",\n    "),
            last_level,
            quote_ident("HIERARCHY_ID"),
            quote_ident("HIERARCHY_NAME"),
            quote_ident("SORT_ORDER"),
            quote_qualified(self.ctx.mart.hierarchy_table.trim()),
            quote_ident("ACTIVE_FLAG"),
            col("H", "HIERARCHY_ID"),
            col("R", "HIERARCHY_ID")
        )
    }
}

impl LayerEmitter for Dt3Emitter<'_, '_> {
    fn layer(&self) -> Layer {
        Layer::Dt3
    }

    fn settings(&self) -> &DdlSettings {
        &self.ctx.settings
    }

    fn body(&self, upstream: Option<&str>) -> String {
        let source = quote_qualified(upstream.unwrap_or_default());
        let plan = self.ctx.plan;
        let mut ctes = vec![format!("LEVEL_0 AS (\n{}\n)", self.level_zero(&source))];

        for layer in 1..=plan.layer_count() {
            let previous = format!("LEVEL_{}", layer - 1);
            let mut arms = vec![self.passthrough(&previous)];
            arms.extend(plan.layer(layer).filter_map(|calc| self.calc_arm(calc, &previous)));
            ctes.push(format!(
                "LEVEL_{} AS (\n{}\n)",
                layer,
                arms.join("\nUNION ALL\n")
            ));
        }

        let last = format!("LEVEL_{}", plan.layer_count());
        format!("WITH {}\n{}", ctes.join(",\n"), self.final_select(&last))
    }
}
