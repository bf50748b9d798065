//! DT_2: one row per mapping and measure
//!
//! Unpivots the per-measure weight columns of VW_1 into
//! `(MEASURE_NAME, MEASURE_VALUE)` and drops excluded rows.

use super::{col, DdlSettings, EmitContext, Layer, LayerEmitter};
use hm_core::sql_utils::{quote_ident, quote_qualified, string_literal};

/// VW_1 columns carried through unchanged.
pub(crate) const CARRIED_COLUMNS: [&str; 12] = [
    "HIERARCHY_ID",
    "HIERARCHY_NAME",
    "PRECEDENCE_GROUP",
    "SOURCE_UID",
    "MATCH_KEY",
    "MATCH_PREFIX",
    "IS_WILDCARD",
    "MATCH_SPECIFICITY",
    "FILTER_GROUP_1",
    "FILTER_GROUP_2",
    "FILTER_GROUP_3",
    "FILTER_GROUP_4",
];

pub struct Dt2Emitter<'c, 'a> {
    ctx: &'c EmitContext<'c, 'a>,
}

impl<'c, 'a> Dt2Emitter<'c, 'a> {
    pub fn new(ctx: &'c EmitContext<'c, 'a>) -> Self {
        Self { ctx }
    }
}

impl LayerEmitter for Dt2Emitter<'_, '_> {
    fn layer(&self) -> Layer {
        Layer::Dt2
    }

    fn settings(&self) -> &DdlSettings {
        &self.ctx.settings
    }

    fn body(&self, upstream: Option<&str>) -> String {
        let source = quote_qualified(upstream.unwrap_or_default());
        let mut carried: Vec<String> = CARRIED_COLUMNS
            .iter()
            .map(|c| format!("{} AS {}", col("V", c), quote_ident(c)))
            .collect();
        carried.push(format!(
            "{} AS {}",
            col("V", "INCLUDE_FLAG"),
            quote_ident("INCLUDE_FLAG")
        ));

        let arms: Vec<String> = self
            .ctx
            .mart
            .measures
            .iter()
            .map(|measure| {
                let name = EmitContext::measure_name(measure);
                format!(
                    "SELECT\n    {},\n    {} AS {},\n    {} AS {}\nFROM {} AS V\nWHERE NOT ({} OR {})",
                    carried.join(",\n    "),
                    string_literal(&name),
                    quote_ident("MEASURE_NAME"),
                    col("V", &format!("{}_WEIGHT", name)),
                    quote_ident("MEASURE_VALUE"),
                    source,
                    col("V", "NODE_EXCLUDE_FLAG"),
                    col("V", "MAPPING_EXCLUDE_FLAG")
                )
            })
            .collect();
        arms.join("\nUNION ALL\n")
    }
}
