//! Layer emitters: one SQL object per pipeline layer
//!
//! Every emitter is pure. It sees the compile context and the name of the
//! layer before it, and returns the object's DDL. Rendering the same context
//! twice yields byte-identical text.

pub mod dt2;
pub mod dt3;
pub mod dt3a;
pub mod vw1;

use crate::branch::BranchSet;
use crate::precedence::FormulaPlan;
use crate::resolver::ResolvedGraph;
use crate::rollup::RollupMap;
use hm_core::sql_utils::{object_name_segment, quote_ident, quote_qualified, string_literal};
use hm_core::{MartConfig, MeasureColumn};
use serde::Serialize;

pub use dt2::Dt2Emitter;
pub use dt3::Dt3Emitter;
pub use dt3a::Dt3aEmitter;
pub use vw1::Vw1Emitter;

/// Pipeline layer of an emitted object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Layer {
    #[serde(rename = "VW_1")]
    Vw1,
    #[serde(rename = "DT_2")]
    Dt2,
    #[serde(rename = "DT_3A")]
    Dt3a,
    #[serde(rename = "DT_3")]
    Dt3,
}

impl Layer {
    /// Layers in emission order
    pub const ALL: [Layer; 4] = [Layer::Vw1, Layer::Dt2, Layer::Dt3a, Layer::Dt3];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Vw1 => "VW_1",
            Layer::Dt2 => "DT_2",
            Layer::Dt3a => "DT_3A",
            Layer::Dt3 => "DT_3",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Layer::Vw1 => "translation view",
            Layer::Dt2 => "granularity",
            Layer::Dt3a => "pre-aggregation",
            Layer::Dt3 => "final mart",
        }
    }

    pub fn object_type(self) -> ObjectType {
        match self {
            Layer::Vw1 => ObjectType::View,
            Layer::Dt2 | Layer::Dt3a | Layer::Dt3 => ObjectType::DynamicTable,
        }
    }

    /// 1-based position in the pipeline
    pub fn index(self) -> usize {
        match self {
            Layer::Vw1 => 1,
            Layer::Dt2 => 2,
            Layer::Dt3a => 3,
            Layer::Dt3 => 4,
        }
    }

    /// Bare object name for a mart base name, e.g. `DT_2_<BASE>_GRANULARITY`.
    pub fn default_name(self, base: &str) -> String {
        let suffix = match self {
            Layer::Vw1 => "TRANSLATED",
            Layer::Dt2 => "GRANULARITY",
            Layer::Dt3a => "PREAGG",
            Layer::Dt3 => "MART",
        };
        format!("{}_{}_{}", self.as_str(), base, suffix)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warehouse object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    View,
    DynamicTable,
}

impl ObjectType {
    pub fn as_sql(self) -> &'static str {
        match self {
            ObjectType::View => "VIEW",
            ObjectType::DynamicTable => "DYNAMIC TABLE",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectType::View => write!(f, "VIEW"),
            ObjectType::DynamicTable => write!(f, "DYNAMIC_TABLE"),
        }
    }
}

/// One emitted warehouse object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerObject {
    pub layer: Layer,
    /// Qualified name, unquoted (`DB.SCHEMA.NAME`)
    pub name: String,
    pub object_type: ObjectType,
    /// Object this layer reads from, if it reads a prior layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub ddl: String,
    /// The `SELECT` inside the DDL
    #[serde(skip)]
    pub body: String,
}

/// Qualified object names of the four layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNames {
    names: [String; 4],
}

impl ObjectNames {
    /// Default names under the mart's target schema, with per-layer overrides.
    pub fn for_mart(mart: &MartConfig) -> Self {
        let base = mart.base_name();
        let overrides = &mart.object_names;
        let names = Layer::ALL.map(|layer| {
            let custom = match layer {
                Layer::Vw1 => &overrides.vw_1,
                Layer::Dt2 => &overrides.dt_2,
                Layer::Dt3a => &overrides.dt_3a,
                Layer::Dt3 => &overrides.dt_3,
            };
            let bare = custom
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| layer.default_name(&base));
            format!(
                "{}.{}.{}",
                mart.target_database.trim(),
                mart.target_schema.trim(),
                bare
            )
        });
        Self { names }
    }

    pub fn get(&self, layer: Layer) -> &str {
        &self.names[layer.index() - 1]
    }
}

/// DDL options shared by every layer of a mart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlSettings {
    pub mart_name: String,
    pub target_lag: String,
    pub warehouse: Option<String>,
}

/// Everything the emitters may read
pub struct EmitContext<'c, 'a> {
    pub mart: &'c MartConfig,
    pub graph: &'c ResolvedGraph<'a>,
    pub plan: &'c FormulaPlan,
    pub branches: &'c BranchSet<'a>,
    pub rollup: &'c RollupMap,
    pub settings: DdlSettings,
}

impl EmitContext<'_, '_> {
    /// Output column name of a measure
    pub fn measure_name(measure: &MeasureColumn) -> String {
        object_name_segment(&measure.name)
    }

    pub fn dimensions(&self) -> Vec<&str> {
        self.mart.dimensions.iter().map(|d| d.trim()).collect()
    }
}

/// A layer of the pipeline
pub trait LayerEmitter {
    fn layer(&self) -> Layer;

    fn settings(&self) -> &DdlSettings;

    /// The layer's `SELECT`, reading from `upstream` when the layer has one.
    fn body(&self, upstream: Option<&str>) -> String;

    fn emit(&self, object_name: &str, upstream: Option<&str>) -> LayerObject {
        let layer = self.layer();
        let body = self.body(upstream);
        LayerObject {
            layer,
            name: object_name.to_string(),
            object_type: layer.object_type(),
            upstream: upstream.map(str::to_string),
            ddl: render_ddl(layer, object_name, self.settings(), &body),
            body,
        }
    }
}

/// Emit the four layers in order, each reading the one before it.
pub fn emit_all(ctx: &EmitContext<'_, '_>, names: &ObjectNames) -> Vec<LayerObject> {
    let translated = Vw1Emitter::new(ctx);
    let granularity = Dt2Emitter::new(ctx);
    let preagg = Dt3aEmitter::new(ctx);
    let mart = Dt3Emitter::new(ctx);
    let emitters: [&dyn LayerEmitter; 4] = [&translated, &granularity, &preagg, &mart];

    let mut objects = Vec::with_capacity(emitters.len());
    let mut upstream: Option<String> = None;
    for emitter in emitters {
        let object = emitter.emit(names.get(emitter.layer()), upstream.as_deref());
        log::debug!("Emitted {} {}", object.layer, object.name);
        upstream = Some(object.name.clone());
        objects.push(object);
    }
    objects
}

/// `CREATE OR REPLACE` statement around a body, with a one-line header.
pub fn render_ddl(layer: Layer, name: &str, settings: &DdlSettings, body: &str) -> String {
    let object_type = layer.object_type();
    let mut ddl = format!(
        "-- {} {} of mart {}\nCREATE OR REPLACE {} {}",
        layer,
        layer.description(),
        settings.mart_name,
        object_type.as_sql(),
        quote_qualified(name)
    );
    if object_type == ObjectType::DynamicTable {
        ddl.push_str(&format!(
            "\n    TARGET_LAG = {}",
            string_literal(&settings.target_lag)
        ));
        if let Some(warehouse) = &settings.warehouse {
            ddl.push_str(&format!("\n    WAREHOUSE = {}", quote_ident(warehouse)));
        }
    }
    ddl.push_str("\nAS\n");
    ddl.push_str(body);
    ddl.push_str(";\n");
    ddl
}

/// `<expr> IN (...)`, or an always-false predicate for an empty list.
pub(crate) fn in_list<S: AsRef<str>>(expr: &str, values: &[S]) -> String {
    if values.is_empty() {
        return "1 = 0".to_string();
    }
    let items: Vec<String> = values.iter().map(|v| string_literal(v.as_ref())).collect();
    format!("{} IN ({})", expr, items.join(", "))
}

/// `<alias>."<column>"`
pub(crate) fn col(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_ident(column))
}

/// `UPPER(TRIM(CAST(<expr> AS VARCHAR)))`, the normalization shared by
/// mapping keys and fact values.
pub(crate) fn normalized(expr: &str) -> String {
    format!("UPPER(TRIM(CAST({} AS VARCHAR)))", expr)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::issue::IssueCollector;
    use crate::test_fixtures::income_statement;
    use hm_core::Snapshot;

    /// Run `f` against the income statement's emit context.
    pub(crate) fn with_context(f: impl FnOnce(&EmitContext<'_, '_>)) {
        with_snapshot(&income_statement(), f)
    }

    /// Run `f` against the emit context of the snapshot's first mart.
    pub(crate) fn with_snapshot(snapshot: &Snapshot, f: impl FnOnce(&EmitContext<'_, '_>)) {
        let mart = &snapshot.marts[0];
        let graph = ResolvedGraph::resolve(snapshot).unwrap();
        let mut issues = IssueCollector::new();
        let plan = FormulaPlan::build(&graph, &mut issues).unwrap();
        let branches = BranchSet::build(&graph, mart, &mut issues);
        let rollup = RollupMap::for_plan(&graph, &plan, &branches);
        let ctx = EmitContext {
            mart,
            graph: &graph,
            plan: &plan,
            branches: &branches,
            rollup: &rollup,
            settings: DdlSettings {
                mart_name: mart.name.clone(),
                target_lag: "1 hour".into(),
                warehouse: None,
            },
        };
        f(&ctx)
    }
}
