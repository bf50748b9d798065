//! Formula groups: ordered rules computing one node's value from others.

use crate::ids::{FormulaGroupId, HierarchyId};
use crate::serde_helpers::default_precedence;
use serde::{Deserialize, Serialize};

/// Arithmetic operation applied by a formula rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Sum,
    Subtract,
    Multiply,
    Divide,
    Average,
    Min,
    Max,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Sum => "SUM",
            Operation::Subtract => "SUBTRACT",
            Operation::Multiply => "MULTIPLY",
            Operation::Divide => "DIVIDE",
            Operation::Average => "AVERAGE",
            Operation::Min => "MIN",
            Operation::Max => "MAX",
        };
        f.write_str(s)
    }
}

/// One rule of a formula group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaRule {
    /// Contributing node
    pub hierarchy_id: HierarchyId,

    #[serde(default)]
    pub hierarchy_name: Option<String>,

    pub operation: Operation,

    /// Evaluation stage inside the group; 1 reads raw aggregates
    #[serde(default = "default_precedence")]
    pub precedence: u32,

    /// Reads another node's computed value instead of `hierarchy_id`'s raw one
    #[serde(default)]
    pub formula_param_ref: Option<HierarchyId>,

    /// Scalar applied by MULTIPLY/DIVIDE on volume rules
    #[serde(default)]
    pub formula_param2_const_number: Option<f64>,

    #[serde(default)]
    pub sign_change_flag: bool,

    #[serde(default)]
    pub volume_flag: bool,
}

impl FormulaRule {
    /// Create a precedence-1 rule over `hierarchy_id`.
    pub fn new(hierarchy_id: &str, operation: Operation) -> Self {
        Self {
            hierarchy_id: HierarchyId::new(hierarchy_id),
            hierarchy_name: None,
            operation,
            precedence: default_precedence(),
            formula_param_ref: None,
            formula_param2_const_number: None,
            sign_change_flag: false,
            volume_flag: false,
        }
    }

    pub fn at_precedence(mut self, precedence: u32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn param_ref(mut self, target: &str) -> Self {
        self.formula_param_ref = Some(HierarchyId::new(target));
        self
    }

    pub fn constant(mut self, value: f64) -> Self {
        self.formula_param2_const_number = Some(value);
        self
    }

    pub fn sign_change(mut self) -> Self {
        self.sign_change_flag = true;
        self
    }

    pub fn volume(mut self) -> Self {
        self.volume_flag = true;
        self
    }

    /// Node whose value the rule reads.
    pub fn operand(&self) -> &HierarchyId {
        self.formula_param_ref.as_ref().unwrap_or(&self.hierarchy_id)
    }

    /// `-1.0` when the sign change flag is set, else `1.0`.
    pub fn sign(&self) -> f64 {
        if self.sign_change_flag {
            -1.0
        } else {
            1.0
        }
    }

    /// True for MULTIPLY/DIVIDE rules carrying a scalar.
    pub fn is_const_scaled(&self) -> bool {
        matches!(self.operation, Operation::Multiply | Operation::Divide)
            && self.formula_param2_const_number.is_some()
    }
}

/// An ordered set of rules computing the value of its MAIN node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaGroup {
    pub formula_group_id: FormulaGroupId,

    pub group_name: String,

    /// Node that owns the group and receives the computed value
    pub main_hierarchy_id: HierarchyId,

    #[serde(default)]
    pub rules: Vec<FormulaRule>,
}

impl FormulaGroup {
    pub fn new(id: &str, main_hierarchy_id: &str, rules: Vec<FormulaRule>) -> Self {
        Self {
            formula_group_id: FormulaGroupId::new(id),
            group_name: id.to_string(),
            main_hierarchy_id: HierarchyId::new(main_hierarchy_id),
            rules,
        }
    }

    /// Distinct precedences in ascending order.
    pub fn precedences(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.rules.iter().map(|r| r.precedence).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_uppercase_serde() {
        let op: Operation = serde_yaml::from_str("SUBTRACT").unwrap();
        assert_eq!(op, Operation::Subtract);
        assert_eq!(op.to_string(), "SUBTRACT");
        assert!(serde_yaml::from_str::<Operation>("subtract").is_err());
    }

    #[test]
    fn test_operand_prefers_param_ref() {
        let rule = FormulaRule::new("COGS_LEAF", Operation::Sum).param_ref("COGS");
        assert_eq!(rule.operand(), "COGS");
        let plain = FormulaRule::new("COGS_LEAF", Operation::Sum);
        assert_eq!(plain.operand(), "COGS_LEAF");
    }

    #[test]
    fn test_sign() {
        assert_eq!(FormulaRule::new("A", Operation::Subtract).sign(), 1.0);
        assert_eq!(
            FormulaRule::new("A", Operation::Subtract).sign_change().sign(),
            -1.0
        );
    }

    #[test]
    fn test_precedences_sorted_distinct() {
        let group = FormulaGroup::new(
            "FG",
            "GP",
            vec![
                FormulaRule::new("A", Operation::Divide).at_precedence(3),
                FormulaRule::new("B", Operation::Sum),
                FormulaRule::new("C", Operation::Sum),
                FormulaRule::new("D", Operation::Subtract).at_precedence(2),
            ],
        );
        assert_eq!(group.precedences(), vec![1, 2, 3]);
    }

    #[test]
    fn test_rule_from_yaml() {
        let yaml = r#"
hierarchy_id: NGL_BBL
operation: MULTIPLY
precedence: 2
formula_param2_const_number: 42.0
volume_flag: true
"#;
        let rule: FormulaRule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.is_const_scaled());
        assert!(rule.volume_flag);
        assert_eq!(rule.precedence, 2);
    }
}
