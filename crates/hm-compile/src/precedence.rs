//! Formula precedence resolution.
//!
//! Calculated nodes form their own dependency graph, separate from the
//! ownership tree. The graph is layered with Kahn's algorithm and each
//! node's formula group is folded, stage by stage, into one [`FormulaExpr`].
//! The same expression renders SQL for the final mart layer and evaluates
//! in memory.

use crate::error::CompileError;
use crate::issue::IssueCollector;
use crate::resolver::ResolvedGraph;
use hm_core::sql_utils::number_literal;
use hm_core::{
    CoreError, FormulaDag, FormulaGroup, FormulaGroupId, FormulaRule, HierarchyId, MeasureKind,
    Operation,
};
use std::collections::{BTreeMap, BTreeSet};

/// A value a formula reads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    /// Mapped or rolled-up value of a node
    Raw(HierarchyId),
    /// Computed value of a calculated node
    Calc(HierarchyId),
}

impl Operand {
    pub fn hierarchy_id(&self) -> &HierarchyId {
        match self {
            Operand::Raw(id) | Operand::Calc(id) => id,
        }
    }

    /// `VALUE_KIND` of the rows carrying this operand.
    pub fn value_kind(&self) -> &'static str {
        match self {
            Operand::Raw(_) => "RAW",
            Operand::Calc(_) => "CALC",
        }
    }
}

/// One signed term of an additive stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub negate: bool,
    pub expr: FormulaExpr,
}

/// Expression tree computing a calculated node for one measure.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    Null,
    Value(Operand),
    Neg(Box<FormulaExpr>),
    /// Sum of terms, each missing term counting as zero
    Sum(Vec<Term>),
    /// Constant scaling applied to volume measures; amounts become NULL
    VolumeScaled {
        expr: Box<FormulaExpr>,
        factor: f64,
        divide: bool,
    },
    Mul(Box<FormulaExpr>, Box<FormulaExpr>),
    /// Division; a zero divisor yields NULL
    Div(Box<FormulaExpr>, Box<FormulaExpr>),
    Mean(Vec<FormulaExpr>),
    Least(Vec<FormulaExpr>),
    Greatest(Vec<FormulaExpr>),
}

impl FormulaExpr {
    /// Render SQL for a measure of `kind`; `operand` renders each read.
    pub fn render(&self, kind: MeasureKind, operand: &dyn Fn(&Operand) -> String) -> String {
        match self {
            FormulaExpr::Null => "NULL".to_string(),
            FormulaExpr::Value(op) => operand(op),
            FormulaExpr::Neg(inner) => format!("(-{})", inner.render(kind, operand)),
            FormulaExpr::Sum(terms) => {
                let mut sql = String::from("(");
                for (i, term) in terms.iter().enumerate() {
                    let rendered = if term.expr.is_null_for(kind) {
                        "NULL".to_string()
                    } else {
                        format!("COALESCE({}, 0)", term.expr.render(kind, operand))
                    };
                    match (i, term.negate) {
                        (0, false) => {}
                        (0, true) => sql.push('-'),
                        (_, false) => sql.push_str(" + "),
                        (_, true) => sql.push_str(" - "),
                    }
                    sql.push_str(&rendered);
                }
                sql.push(')');
                sql
            }
            FormulaExpr::VolumeScaled {
                expr,
                factor,
                divide,
            } => match kind {
                MeasureKind::Amount => "NULL".to_string(),
                MeasureKind::Volume => format!(
                    "({} {} {})",
                    expr.render(kind, operand),
                    if *divide { "/" } else { "*" },
                    number_literal(*factor).unwrap_or_else(|| "NULL".to_string())
                ),
            },
            FormulaExpr::Mul(a, b) => {
                format!("({} * {})", a.render(kind, operand), b.render(kind, operand))
            }
            FormulaExpr::Div(a, b) => format!(
                "({} / NULLIF({}, 0))",
                a.render(kind, operand),
                b.render(kind, operand)
            ),
            FormulaExpr::Mean(items) => format!(
                "(({}) / {})",
                render_list(items, " + ", kind, operand),
                items.len()
            ),
            FormulaExpr::Least(items) => {
                format!("LEAST({})", render_list(items, ", ", kind, operand))
            }
            FormulaExpr::Greatest(items) => {
                format!("GREATEST({})", render_list(items, ", ", kind, operand))
            }
        }
    }

    /// Evaluate for a measure of `kind`; `None` plays the part of SQL NULL.
    pub fn evaluate(&self, kind: MeasureKind, operand: &dyn Fn(&Operand) -> Option<f64>) -> Option<f64> {
        match self {
            FormulaExpr::Null => None,
            FormulaExpr::Value(op) => operand(op),
            FormulaExpr::Neg(inner) => inner.evaluate(kind, operand).map(|v| -v),
            FormulaExpr::Sum(terms) => {
                let mut total = 0.0;
                for term in terms {
                    if term.expr.is_null_for(kind) {
                        return None;
                    }
                    let value = term.expr.evaluate(kind, operand).unwrap_or(0.0);
                    total += if term.negate { -value } else { value };
                }
                Some(total)
            }
            FormulaExpr::VolumeScaled {
                expr,
                factor,
                divide,
            } => match kind {
                MeasureKind::Amount => None,
                MeasureKind::Volume => expr
                    .evaluate(kind, operand)
                    .map(|v| if *divide { v / factor } else { v * factor }),
            },
            FormulaExpr::Mul(a, b) => Some(a.evaluate(kind, operand)? * b.evaluate(kind, operand)?),
            FormulaExpr::Div(a, b) => {
                let divisor = b.evaluate(kind, operand)?;
                let dividend = a.evaluate(kind, operand)?;
                (divisor != 0.0).then(|| dividend / divisor)
            }
            FormulaExpr::Mean(items) => {
                let values = evaluate_all(items, kind, operand)?;
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
            FormulaExpr::Least(items) => evaluate_all(items, kind, operand)?
                .into_iter()
                .reduce(f64::min),
            FormulaExpr::Greatest(items) => evaluate_all(items, kind, operand)?
                .into_iter()
                .reduce(f64::max),
        }
    }

    /// Every operand read by the expression.
    pub fn operands(&self) -> BTreeSet<Operand> {
        let mut out = BTreeSet::new();
        self.collect_operands(&mut out);
        out
    }

    fn collect_operands(&self, out: &mut BTreeSet<Operand>) {
        match self {
            FormulaExpr::Null => {}
            FormulaExpr::Value(op) => {
                out.insert(op.clone());
            }
            FormulaExpr::Neg(inner) | FormulaExpr::VolumeScaled { expr: inner, .. } => {
                inner.collect_operands(out)
            }
            FormulaExpr::Sum(terms) => {
                for term in terms {
                    term.expr.collect_operands(out);
                }
            }
            FormulaExpr::Mul(a, b) | FormulaExpr::Div(a, b) => {
                a.collect_operands(out);
                b.collect_operands(out);
            }
            FormulaExpr::Mean(items) | FormulaExpr::Least(items) | FormulaExpr::Greatest(items) => {
                for item in items {
                    item.collect_operands(out);
                }
            }
        }
    }

    /// True when the expression is NULL for every row of a `kind` measure.
    fn is_null_for(&self, kind: MeasureKind) -> bool {
        match self {
            FormulaExpr::Null => true,
            FormulaExpr::VolumeScaled { .. } => kind == MeasureKind::Amount,
            FormulaExpr::Neg(inner) => inner.is_null_for(kind),
            _ => false,
        }
    }
}

fn render_list(
    items: &[FormulaExpr],
    separator: &str,
    kind: MeasureKind,
    operand: &dyn Fn(&Operand) -> String,
) -> String {
    items
        .iter()
        .map(|item| item.render(kind, operand))
        .collect::<Vec<_>>()
        .join(separator)
}

fn evaluate_all(
    items: &[FormulaExpr],
    kind: MeasureKind,
    operand: &dyn Fn(&Operand) -> Option<f64>,
) -> Option<Vec<f64>> {
    items.iter().map(|item| item.evaluate(kind, operand)).collect()
}

/// Compiled formula of one calculated node.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcPlan {
    pub hierarchy_id: HierarchyId,
    pub formula_group_id: FormulaGroupId,
    /// 1-based Kahn layer; layer k reads only raw values and layers below k
    pub layer: usize,
    pub expr: FormulaExpr,
}

/// Ordered formulas of every calculated node of a project.
#[derive(Debug, Clone, Default)]
pub struct FormulaPlan {
    calcs: Vec<CalcPlan>,
    layer_count: usize,
}

impl FormulaPlan {
    /// Build the plan. Cycles, division by a zero constant and non-finite
    /// constants are fatal and returned together; warnings go to `issues`.
    pub fn build(
        graph: &ResolvedGraph<'_>,
        issues: &mut IssueCollector,
    ) -> Result<Self, Vec<CompileError>> {
        let owners: BTreeMap<HierarchyId, &FormulaGroup> = graph
            .formulas()
            .filter(|(id, _)| graph.is_calculated(id))
            .map(|(id, group)| (HierarchyId::new(id), group))
            .collect();

        let mut errors = Vec::new();
        let mut dependencies: BTreeMap<HierarchyId, Vec<HierarchyId>> = BTreeMap::new();
        for (id, group) in &owners {
            check_constants(group, &mut errors);
            let first_stage = group.precedences().first().copied();
            let mut deps = Vec::new();
            for rule in &group.rules {
                if !reads_computed(graph, rule) {
                    continue;
                }
                if rule.operand() == id {
                    if Some(rule.precedence) == first_stage {
                        errors.push(CompileError::CircularFormula {
                            cycle_node_ids: vec![id.clone()],
                        });
                    }
                } else if owners.contains_key(rule.operand()) {
                    deps.push(rule.operand().clone());
                }
            }
            dependencies.insert(id.clone(), deps);
        }

        let dag = FormulaDag::build(&dependencies);
        let layers = match dag.layers() {
            Ok(layers) => layers,
            Err(CoreError::CircularDependency { cycle }) => {
                errors.push(CompileError::CircularFormula {
                    cycle_node_ids: cycle,
                });
                Vec::new()
            }
            Err(other) => {
                errors.push(CompileError::CircularFormula {
                    cycle_node_ids: dag.find_cycle().unwrap_or_default(),
                });
                log::debug!("Formula layering failed: {}", other);
                Vec::new()
            }
        };
        if !errors.is_empty() {
            errors.dedup();
            return Err(errors);
        }

        let mut calcs = Vec::with_capacity(owners.len());
        for (index, layer) in layers.iter().enumerate() {
            for id in layer {
                let Some(group) = owners.get(id) else {
                    continue;
                };
                calcs.push(CalcPlan {
                    hierarchy_id: id.clone(),
                    formula_group_id: group.formula_group_id.clone(),
                    layer: index + 1,
                    expr: fold_group(graph, id, group, issues),
                });
            }
        }
        log::debug!(
            "Formula plan: {} calculated nodes in {} layers",
            calcs.len(),
            layers.len()
        );
        Ok(Self {
            calcs,
            layer_count: layers.len(),
        })
    }

    /// Plans in evaluation order (layer, then id).
    pub fn calcs(&self) -> &[CalcPlan] {
        &self.calcs
    }

    pub fn calc(&self, id: &str) -> Option<&CalcPlan> {
        self.calcs.iter().find(|c| c.hierarchy_id == id)
    }

    /// Plans of one 1-based layer.
    pub fn layer(&self, layer: usize) -> impl Iterator<Item = &CalcPlan> {
        self.calcs.iter().filter(move |c| c.layer == layer)
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn is_empty(&self) -> bool {
        self.calcs.is_empty()
    }

    /// Nodes read through their raw value by some formula.
    pub fn raw_reads(&self) -> BTreeSet<HierarchyId> {
        self.calcs
            .iter()
            .flat_map(|c| c.expr.operands())
            .filter_map(|op| match op {
                Operand::Raw(id) => Some(id),
                Operand::Calc(_) => None,
            })
            .collect()
    }

    /// Evaluate every calculated node against raw values.
    ///
    /// Missing raw values read as NULL, like a node without rows. A node
    /// none of whose operands has rows gets no row either and reads as
    /// `None`, even where its formula would fold the gaps to zero.
    pub fn evaluate(
        &self,
        raw: &BTreeMap<HierarchyId, f64>,
        kind: MeasureKind,
    ) -> BTreeMap<HierarchyId, Option<f64>> {
        let mut computed: BTreeMap<HierarchyId, Option<f64>> = BTreeMap::new();
        let mut with_rows: BTreeSet<HierarchyId> = BTreeSet::new();
        for calc in &self.calcs {
            let has_rows = calc.expr.operands().iter().any(|op| match op {
                Operand::Raw(id) => raw.contains_key(id),
                Operand::Calc(id) => with_rows.contains(id),
            });
            let value = if has_rows {
                let lookup = |op: &Operand| match op {
                    Operand::Raw(id) => raw.get(id).copied(),
                    Operand::Calc(id) => computed.get(id).copied().flatten(),
                };
                calc.expr.evaluate(kind, &lookup)
            } else {
                None
            };
            if has_rows {
                with_rows.insert(calc.hierarchy_id.clone());
            }
            computed.insert(calc.hierarchy_id.clone(), value);
        }
        computed
    }
}

/// Whether a rule reads the computed value of its operand.
fn reads_computed(graph: &ResolvedGraph<'_>, rule: &FormulaRule) -> bool {
    graph.is_calculated(rule.operand())
        && (rule.formula_param_ref.is_some() || rule.precedence > 1)
}

fn check_constants(group: &FormulaGroup, errors: &mut Vec<CompileError>) {
    for rule in &group.rules {
        let Some(constant) = rule.formula_param2_const_number else {
            continue;
        };
        if !constant.is_finite() {
            errors.push(CompileError::InvalidFormulaConstant {
                formula_group_id: group.formula_group_id.to_string(),
                hierarchy_id: rule.hierarchy_id.to_string(),
            });
        } else if constant == 0.0 && rule.operation == Operation::Divide {
            errors.push(CompileError::DivisionByZeroConstant {
                formula_group_id: group.formula_group_id.to_string(),
                hierarchy_id: rule.hierarchy_id.to_string(),
            });
        }
    }
}

/// Fold a group's stages into one expression.
///
/// A stage without a self-referencing rule carries the running result
/// forward implicitly; a stage with one reads it only through that rule.
fn fold_group(
    graph: &ResolvedGraph<'_>,
    owner: &HierarchyId,
    group: &FormulaGroup,
    issues: &mut IssueCollector,
) -> FormulaExpr {
    if group.rules.is_empty() {
        issues.push(CompileError::EmptyFormulaGroup {
            formula_group_id: group.formula_group_id.to_string(),
            hierarchy_id: owner.to_string(),
        });
        return FormulaExpr::Null;
    }

    let mut running: Option<FormulaExpr> = None;
    for precedence in group.precedences() {
        let mut rules: Vec<(usize, &FormulaRule)> = group
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.precedence == precedence)
            .collect();
        rules.sort_by(|(ia, a), (ib, b)| a.hierarchy_id.cmp(&b.hierarchy_id).then(ia.cmp(ib)));

        let is_self = |rule: &FormulaRule| rule.operand() == owner && reads_computed(graph, rule);
        let previous = running.take();
        let mut acc = if rules.iter().any(|&(_, r)| is_self(r)) {
            None
        } else {
            previous.clone()
        };
        let operand = |rule: &FormulaRule| -> FormulaExpr {
            if is_self(rule) {
                previous.clone().unwrap_or(FormulaExpr::Null)
            } else if reads_computed(graph, rule) {
                FormulaExpr::Value(Operand::Calc(rule.operand().clone()))
            } else {
                FormulaExpr::Value(Operand::Raw(rule.operand().clone()))
            }
        };
        let signed = |rule: &FormulaRule| -> FormulaExpr {
            let value = operand(rule);
            if rule.sign_change_flag {
                FormulaExpr::Neg(Box::new(value))
            } else {
                value
            }
        };

        // Additive family
        let mut terms = Vec::new();
        for &(_, rule) in &rules {
            let expr = match (rule.operation, rule.formula_param2_const_number) {
                (Operation::Sum | Operation::Subtract, _) => operand(rule),
                (Operation::Multiply | Operation::Divide, Some(factor)) => {
                    if rule.volume_flag {
                        FormulaExpr::VolumeScaled {
                            expr: Box::new(operand(rule)),
                            factor,
                            divide: rule.operation == Operation::Divide,
                        }
                    } else {
                        issues.push(CompileError::ConstantIgnored {
                            formula_group_id: group.formula_group_id.to_string(),
                            hierarchy_id: rule.hierarchy_id.to_string(),
                            operation: rule.operation.to_string(),
                        });
                        operand(rule)
                    }
                }
                _ => continue,
            };
            terms.push(Term {
                negate: rule.sign_change_flag,
                expr,
            });
        }
        if !terms.is_empty() {
            let mut all = Vec::with_capacity(terms.len() + 1);
            if let Some(current) = acc.take() {
                all.push(Term {
                    negate: false,
                    expr: current,
                });
            }
            all.extend(terms);
            acc = Some(FormulaExpr::Sum(all));
        }

        // MULTIPLY, then DIVIDE
        for operation in [Operation::Multiply, Operation::Divide] {
            for &(_, rule) in rules.iter().filter(|(_, r)| {
                r.operation == operation && r.formula_param2_const_number.is_none()
            }) {
                let value = signed(rule);
                acc = Some(match acc.take() {
                    None => value,
                    Some(current) if operation == Operation::Multiply => {
                        FormulaExpr::Mul(Box::new(current), Box::new(value))
                    }
                    Some(current) => FormulaExpr::Div(Box::new(current), Box::new(value)),
                });
            }
        }

        // AVERAGE, MIN, MAX
        for operation in [Operation::Average, Operation::Min, Operation::Max] {
            let values: Vec<FormulaExpr> = rules
                .iter()
                .filter(|(_, r)| r.operation == operation)
                .map(|&(_, r)| signed(r))
                .collect();
            if values.is_empty() {
                continue;
            }
            let mut items: Vec<FormulaExpr> = acc.take().into_iter().collect();
            items.extend(values);
            acc = Some(match operation {
                Operation::Average => FormulaExpr::Mean(items),
                Operation::Min => FormulaExpr::Least(items),
                _ => FormulaExpr::Greatest(items),
            });
        }

        running = acc;
    }
    running.unwrap_or(FormulaExpr::Null)
}

#[cfg(test)]
#[path = "precedence_test.rs"]
mod tests;
