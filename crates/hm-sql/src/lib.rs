//! hm-sql - SQL parsing layer for Hiermart
//!
//! This crate wraps sqlparser-rs with dialect support and provides the checks
//! the compiler runs over emitted SQL: single-`SELECT` validation and table
//! dependency extraction (CTE names excluded).

pub mod dialect;
pub mod error;
pub mod extractor;
pub mod parser;
pub mod validator;

pub use dialect::{GenericDialect, SnowflakeDialect, SqlDialect};
pub use error::{SqlError, SqlResult};
pub use extractor::{extract_cte_names, extract_dependencies};
pub use parser::SqlParser;
pub use validator::validate_select;
