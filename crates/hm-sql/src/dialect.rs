//! SQL dialect abstraction

use sqlparser::ast::{Ident, Statement};
use sqlparser::dialect::{
    Dialect, GenericDialect as SqlParserGeneric, SnowflakeDialect as SqlParserSnowflake,
};
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Get the underlying sqlparser dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Parse SQL into AST statements
    fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let msg = e.to_string();
            let (line, column) = parse_location_from_error(&msg);
            SqlError::ParseError {
                message: msg,
                line,
                column,
            }
        })
    }

    /// Canonical spelling of an identifier for name comparison.
    ///
    /// Quoted identifiers keep their case; unquoted ones fold the way the
    /// warehouse folds them.
    fn canonical_ident(&self, ident: &Ident) -> String;
}

/// Parse line and column from a sqlparser error message.
///
/// `ParserError` carries no structured location, so "Line: N, Column: M" is
/// read back out of the message text.
pub(crate) fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let Some(line_idx) = msg.find("Line: ") else {
        return (0, 0);
    };
    let line_start = line_idx + 6;
    let Some(comma_idx) = msg[line_start..].find(',') else {
        return (0, 0);
    };
    let Ok(line) = msg[line_start..line_start + comma_idx]
        .trim()
        .parse::<usize>()
    else {
        return (0, 0);
    };
    let Some(col_idx) = msg.find("Column: ") else {
        return (0, 0);
    };
    let col_start = col_idx + 8;
    let col_end = msg[col_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| col_start + i)
        .unwrap_or(msg.len());
    let Ok(column) = msg[col_start..col_end].trim().parse::<usize>() else {
        return (0, 0);
    };
    (line, column)
}

/// Snowflake SQL dialect (unquoted identifiers fold to upper case)
pub struct SnowflakeDialect {
    dialect: SqlParserSnowflake,
}

impl SnowflakeDialect {
    /// Create a new Snowflake dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserSnowflake {},
        }
    }
}

impl Default for SnowflakeDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SnowflakeDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn canonical_ident(&self, ident: &Ident) -> String {
        match ident.quote_style {
            Some(_) => ident.value.clone(),
            None => ident.value.to_uppercase(),
        }
    }
}

/// Generic SQL dialect (identifiers compared as written)
pub struct GenericDialect {
    dialect: SqlParserGeneric,
}

impl GenericDialect {
    /// Create a new generic dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserGeneric {},
        }
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for GenericDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn canonical_ident(&self, ident: &Ident) -> String {
        ident.value.clone()
    }
}
