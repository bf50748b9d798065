//! Filter groups: shared row predicates referenced by hierarchy nodes.

use crate::error::{CoreError, CoreResult};
use crate::ids::FilterGroupId;
use crate::serde_helpers::opt_scalar_string;
use crate::sql_utils::{quote_ident, string_literal, value_literal};
use serde::{Deserialize, Serialize};

/// How a condition combines with the conditions before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

impl std::fmt::Display for FilterLogic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterLogic::And => write!(f, "AND"),
            FilterLogic::Or => write!(f, "OR"),
        }
    }
}

/// Comparison operators a filter condition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Parse an operator as written in metadata (case and spacing insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        let op = match normalized.as_str() {
            "=" => FilterOperator::Eq,
            "<>" | "!=" => FilterOperator::NotEq,
            "<" => FilterOperator::Lt,
            "<=" => FilterOperator::LtEq,
            ">" => FilterOperator::Gt,
            ">=" => FilterOperator::GtEq,
            "IN" => FilterOperator::In,
            "NOT IN" => FilterOperator::NotIn,
            "LIKE" => FilterOperator::Like,
            "NOT LIKE" => FilterOperator::NotLike,
            "IS NULL" => FilterOperator::IsNull,
            "IS NOT NULL" => FilterOperator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::LtEq => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::GtEq => ">=",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
        }
    }

    fn takes_value(self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// One `{column, operator, value, logic}` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCondition {
    /// Fact column the condition tests
    pub column: String,

    /// Kept as written so unknown operators surface as validation issues
    pub operator: String,

    /// Comparison value; comma-separated for `IN`/`NOT IN`
    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub value: Option<String>,

    #[serde(default)]
    pub logic: FilterLogic,
}

impl FilterCondition {
    pub fn new(column: &str, operator: &str, value: Option<&str>) -> Self {
        Self {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.map(str::to_string),
            logic: FilterLogic::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logic = FilterLogic::Or;
        self
    }
}

/// A shared set of row predicates, owned by the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterGroup {
    pub filter_group_id: FilterGroupId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub filter_conditions: Vec<FilterCondition>,

    /// Raw predicate ANDed after the conditions
    #[serde(default)]
    pub custom_sql: Option<String>,

    /// Fact columns correlating with mapping `filter_group_1..4`
    #[serde(default)]
    pub filter_group_1: Option<String>,

    #[serde(default)]
    pub filter_group_2: Option<String>,

    #[serde(default)]
    pub filter_group_3: Option<String>,

    #[serde(default)]
    pub filter_group_4: Option<String>,
}

impl FilterGroup {
    pub fn new(id: &str, conditions: Vec<FilterCondition>) -> Self {
        Self {
            filter_group_id: FilterGroupId::new(id),
            name: id.to_string(),
            filter_conditions: conditions,
            custom_sql: None,
            filter_group_1: None,
            filter_group_2: None,
            filter_group_3: None,
            filter_group_4: None,
        }
    }

    /// Name the fact column correlating with mapping slot `slot` (1-based).
    pub fn with_discriminator(mut self, slot: usize, column: &str) -> Self {
        let column = Some(column.to_string());
        match slot {
            1 => self.filter_group_1 = column,
            2 => self.filter_group_2 = column,
            3 => self.filter_group_3 = column,
            4 => self.filter_group_4 = column,
            _ => {}
        }
        self
    }

    /// Fact column correlating with mapping slot `slot` (1-based), if named.
    pub fn discriminator(&self, slot: usize) -> Option<&str> {
        let column = match slot {
            1 => &self.filter_group_1,
            2 => &self.filter_group_2,
            3 => &self.filter_group_3,
            4 => &self.filter_group_4,
            _ => return None,
        };
        column.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// True when the group restricts rows at all.
    pub fn has_predicate(&self) -> bool {
        !self.filter_conditions.is_empty()
            || self
                .custom_sql
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    /// Render the group as one parenthesized SQL predicate over `alias`.
    ///
    /// Returns `Ok(None)` when the group has neither conditions nor custom SQL.
    pub fn render_predicate(&self, alias: &str) -> CoreResult<Option<String>> {
        let mut sql = String::new();
        for (i, condition) in self.filter_conditions.iter().enumerate() {
            let rendered = self.render_condition(condition, alias)?;
            if i > 0 {
                sql.push_str(&format!(" {} ", condition.logic));
            }
            sql.push_str(&rendered);
        }

        let custom = self
            .custom_sql
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (sql.is_empty(), custom) {
            (true, None) => Ok(None),
            (true, Some(custom)) => Ok(Some(format!("({})", custom))),
            (false, None) => Ok(Some(format!("({})", sql))),
            (false, Some(custom)) => Ok(Some(format!("(({}) AND ({}))", sql, custom))),
        }
    }

    fn render_condition(&self, condition: &FilterCondition, alias: &str) -> CoreResult<String> {
        let invalid = |message: String| CoreError::InvalidFilterCondition {
            filter_group_id: self.filter_group_id.to_string(),
            message,
        };

        let column = condition.column.trim();
        if column.is_empty() {
            return Err(invalid("condition has an empty column".to_string()));
        }
        let op = FilterOperator::parse(&condition.operator)
            .ok_or_else(|| invalid(format!("unsupported operator '{}'", condition.operator)))?;
        let lhs = format!("{}.{}", alias, quote_ident(column));

        if !op.takes_value() {
            return Ok(format!("{} {}", lhs, op.as_sql()));
        }

        let value = condition
            .value
            .as_deref()
            .ok_or_else(|| invalid(format!("operator '{}' on '{}' needs a value", op.as_sql(), column)))?;

        let rhs = match op {
            FilterOperator::In | FilterOperator::NotIn => {
                let items: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(value_literal)
                    .collect();
                if items.is_empty() {
                    return Err(invalid(format!("empty {} list on '{}'", op.as_sql(), column)));
                }
                format!("({})", items.join(", "))
            }
            FilterOperator::Like | FilterOperator::NotLike => string_literal(value),
            _ => value_literal(value),
        };
        Ok(format!("{} {} {}", lhs, op.as_sql(), rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_is_lenient_on_case_and_spacing() {
        assert_eq!(FilterOperator::parse("not   in"), Some(FilterOperator::NotIn));
        assert_eq!(FilterOperator::parse("!="), Some(FilterOperator::NotEq));
        assert_eq!(FilterOperator::parse("is null"), Some(FilterOperator::IsNull));
        assert_eq!(FilterOperator::parse("BETWEEN"), None);
    }

    #[test]
    fn test_render_predicate_combines_logic_in_order() {
        let group = FilterGroup::new(
            "FG_OIL",
            vec![
                FilterCondition::new("PRODUCT", "=", Some("OIL")),
                FilterCondition::new("REGION", "in", Some("US, CA")).or(),
                FilterCondition::new("DELETED_AT", "IS NULL", None),
            ],
        );
        let sql = group.render_predicate("F").unwrap().unwrap();
        assert_eq!(
            sql,
            r#"(F."PRODUCT" = 'OIL' OR F."REGION" IN ('US', 'CA') AND F."DELETED_AT" IS NULL)"#
        );
    }

    #[test]
    fn test_render_predicate_with_custom_sql() {
        let mut group = FilterGroup::new("FG", vec![FilterCondition::new("YEAR", ">=", Some("2020"))]);
        group.custom_sql = Some("F.AMOUNT <> 0".to_string());
        assert_eq!(
            group.render_predicate("F").unwrap().unwrap(),
            r#"((F."YEAR" >= 2020) AND (F.AMOUNT <> 0))"#
        );
    }

    #[test]
    fn test_render_predicate_empty_group() {
        let group = FilterGroup::new("FG", vec![]);
        assert!(!group.has_predicate());
        assert_eq!(group.render_predicate("F").unwrap(), None);
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        let group = FilterGroup::new("FG", vec![FilterCondition::new("A", "~", Some("x"))]);
        let err = group.render_predicate("F").unwrap_err();
        assert!(err.to_string().contains("[E012]"));
        assert!(err.to_string().contains("unsupported operator '~'"));
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let group = FilterGroup::new("FG", vec![FilterCondition::new("A", "=", None)]);
        assert!(matches!(
            group.render_predicate("F"),
            Err(CoreError::InvalidFilterCondition { .. })
        ));
    }

    #[test]
    fn test_values_are_escaped() {
        let group = FilterGroup::new(
            "FG",
            vec![FilterCondition::new("NAME", "LIKE", Some("O'Brien%"))],
        );
        assert_eq!(
            group.render_predicate("F").unwrap().unwrap(),
            r#"(F."NAME" LIKE 'O''Brien%')"#
        );
    }

    #[test]
    fn test_discriminator_lookup() {
        let group = FilterGroup::new("FG", vec![]).with_discriminator(2, "PRODUCT_CODE");
        assert_eq!(group.discriminator(2), Some("PRODUCT_CODE"));
        assert_eq!(group.discriminator(1), None);
        assert_eq!(group.discriminator(9), None);
    }
}
