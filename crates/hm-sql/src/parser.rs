//! SQL parser wrapper

use crate::dialect::{GenericDialect, SnowflakeDialect, SqlDialect};
use crate::error::{SqlError, SqlResult};
use sqlparser::ast::{Ident, Statement};

/// SQL parser that wraps sqlparser-rs with dialect support
pub struct SqlParser {
    dialect: Box<dyn SqlDialect>,
}

impl SqlParser {
    /// Create a new parser with Snowflake dialect
    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect::new()),
        }
    }

    /// Create a new parser with the generic dialect
    pub fn generic() -> Self {
        Self {
            dialect: Box::new(GenericDialect::new()),
        }
    }

    /// Parse SQL into AST statements.
    ///
    /// Blank input is rejected before it reaches the dialect.
    pub fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlError::EmptySql);
        }

        self.dialect.parse(sql)
    }

    /// Canonical spelling of an identifier in the current dialect
    pub fn canonical_ident(&self, ident: &Ident) -> String {
        self.dialect.canonical_ident(ident)
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::snowflake()
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
