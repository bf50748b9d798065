//! Table dependency extraction from SQL AST

use crate::parser::SqlParser;
use sqlparser::ast::{visit_relations, ObjectName, ObjectNamePart, Query, Statement, Visit, Visitor};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Collects the names of every CTE defined anywhere in a statement.
struct CteCollector<'p> {
    parser: &'p SqlParser,
    names: BTreeSet<String>,
}

impl Visitor for CteCollector<'_> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.names.insert(self.parser.canonical_ident(&cte.alias.name));
            }
        }
        ControlFlow::Continue(())
    }
}

/// Canonical CTE names defined in the statements.
pub fn extract_cte_names(parser: &SqlParser, statements: &[Statement]) -> BTreeSet<String> {
    let mut collector = CteCollector {
        parser,
        names: BTreeSet::new(),
    };
    for stmt in statements {
        let _ = stmt.visit(&mut collector);
    }
    collector.names
}

fn canonical_name(parser: &SqlParser, name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => parser.canonical_ident(ident),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Extract all table references from SQL statements
///
/// Walks FROM clauses, JOINs and subqueries with `visit_relations`. Names
/// are returned in canonical form (`DB.SCHEMA.TABLE`, unquoted); references
/// to CTEs of the same statements are left out.
pub fn extract_dependencies(parser: &SqlParser, statements: &[Statement]) -> BTreeSet<String> {
    let ctes = extract_cte_names(parser, statements);
    let mut deps = BTreeSet::new();

    for stmt in statements {
        let _ = visit_relations(stmt, |relation| {
            let name = canonical_name(parser, relation);
            if !(relation.0.len() == 1 && ctes.contains(&name)) {
                deps.insert(name);
            }
            ControlFlow::<()>::Continue(())
        });
    }

    deps
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod tests;
