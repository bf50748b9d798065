//! Errors raised while checking emitted layer bodies

use thiserror::Error;

/// Why an emitted body is not a single parseable query
#[derive(Error, Debug)]
pub enum SqlError {
    /// S001: The dialect parser rejected the body
    #[error("[S001] Emitted body does not parse at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// S002: Nothing but whitespace
    #[error("[S002] Emitted body is empty")]
    EmptySql,

    /// S003: One statement, but not a query
    #[error("[S003] Emitted body is a {kind} statement; a layer body must be a single query")]
    NotAQuery { kind: String },

    /// S004: More than one statement
    #[error("[S004] Emitted body holds {count} statements; a layer body must be a single query")]
    MultipleStatements { count: usize },
}

impl SqlError {
    /// Stable code, as printed in the message prefix.
    pub fn code(&self) -> &'static str {
        match self {
            SqlError::ParseError { .. } => "S001",
            SqlError::EmptySql => "S002",
            SqlError::NotAQuery { .. } => "S003",
            SqlError::MultipleStatements { .. } => "S004",
        }
    }
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_starts_with_code() {
        let errors = [
            SqlError::ParseError {
                message: "Expected: end of statement".into(),
                line: 3,
                column: 7,
            },
            SqlError::EmptySql,
            SqlError::NotAQuery {
                kind: "DROP TABLE".into(),
            },
            SqlError::MultipleStatements { count: 2 },
        ];
        for err in &errors {
            assert!(err.to_string().starts_with(&format!("[{}]", err.code())), "{}", err);
        }
        assert_eq!(
            errors[3].to_string(),
            "[S004] Emitted body holds 2 statements; a layer body must be a single query"
        );
    }
}
