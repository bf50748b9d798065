//! Validation of emitted SELECT bodies

use crate::error::{SqlError, SqlResult};
use crate::parser::SqlParser;
use sqlparser::ast::Statement;

/// Parse `sql` and require exactly one query statement.
///
/// Returns the parsed statement list so callers can go on to extract
/// dependencies without parsing twice.
pub fn validate_select(parser: &SqlParser, sql: &str) -> SqlResult<Vec<Statement>> {
    let statements = parser.parse(sql)?;
    match statements.as_slice() {
        [] => Err(SqlError::EmptySql),
        [Statement::Query(_)] => Ok(statements),
        [other] => Err(SqlError::NotAQuery {
            kind: statement_kind(other),
        }),
        many => Err(SqlError::MultipleStatements { count: many.len() }),
    }
}

/// Short label for an unsupported statement (its leading keywords).
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}
