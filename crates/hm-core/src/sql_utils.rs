//! SQL identifier and literal helpers
//!
//! Every identifier and literal the emitters write goes through these helpers
//! so metadata values (node ids, filter values, pattern keys) can never break
//! out of their SQL context.

/// Quote a SQL identifier.
///
/// Wraps the identifier in double quotes and escapes embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use hm_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("AMOUNT"), r#""AMOUNT""#);
/// assert_eq!(quote_ident(r#"my"col"#), r#""my""col""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a potentially qualified name (e.g. `DB.SCHEMA.TABLE`).
///
/// Splits on `.` and individually quotes each component.
///
/// # Examples
/// ```
/// use hm_core::sql_utils::quote_qualified;
/// assert_eq!(quote_qualified("GL_FACT"), r#""GL_FACT""#);
/// assert_eq!(quote_qualified("RAW.GL.GL_FACT"), r#""RAW"."GL"."GL_FACT""#);
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a SQL string literal value by doubling single quotes.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a single-quoted SQL string literal.
///
/// # Examples
/// ```
/// use hm_core::sql_utils::string_literal;
/// assert_eq!(string_literal("O'Brien"), "'O''Brien'");
/// ```
pub fn string_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

/// Render a finite number as a SQL numeric literal, `None` for NaN/infinity.
///
/// # Examples
/// ```
/// use hm_core::sql_utils::number_literal;
/// assert_eq!(number_literal(6.0).as_deref(), Some("6"));
/// assert_eq!(number_literal(-0.25).as_deref(), Some("-0.25"));
/// assert_eq!(number_literal(f64::NAN), None);
/// ```
pub fn number_literal(value: f64) -> Option<String> {
    value.is_finite().then(|| format!("{}", value))
}

/// Render a filter value: numbers stay bare, everything else is quoted.
pub fn value_literal(value: &str) -> String {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        trimmed.to_string()
    } else {
        string_literal(value)
    }
}

/// Normalize free text into an upper-case SQL object name segment.
///
/// Runs of characters other than ASCII letters and digits collapse into a
/// single `_`; leading/trailing underscores are dropped.
///
/// # Examples
/// ```
/// use hm_core::sql_utils::object_name_segment;
/// assert_eq!(object_name_segment("Upstream Oil & Gas"), "UPSTREAM_OIL_GAS");
/// assert_eq!(object_name_segment("p&l-2024"), "P_L_2024");
/// ```
pub fn object_name_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_with_dots() {
        // Dots are not special inside quote_ident
        assert_eq!(quote_ident("schema.table"), r#""schema.table""#);
    }

    #[test]
    fn test_quote_qualified_with_embedded_quotes() {
        assert_eq!(
            quote_qualified(r#"my"db.my"table"#),
            r#""my""db"."my""table""#
        );
    }

    #[test]
    fn test_escape_sql_string() {
        assert_eq!(escape_sql_string("it's"), "it''s");
        assert_eq!(escape_sql_string("O'Brien's"), "O''Brien''s");
    }

    #[test]
    fn test_value_literal() {
        assert_eq!(value_literal("42"), "42");
        assert_eq!(value_literal("-1.5"), "-1.5");
        assert_eq!(value_literal("OIL"), "'OIL'");
        assert_eq!(value_literal("1; DROP TABLE x"), "'1; DROP TABLE x'");
        assert_eq!(value_literal("inf"), "'inf'");
        assert_eq!(value_literal(""), "''");
    }

    #[test]
    fn test_number_literal_large_values_have_no_exponent() {
        assert_eq!(number_literal(1e21).as_deref(), Some("1000000000000000000000"));
        assert_eq!(number_literal(f64::INFINITY), None);
    }

    #[test]
    fn test_object_name_segment_edges() {
        assert_eq!(object_name_segment("  __ "), "");
        assert_eq!(object_name_segment("already_OK"), "ALREADY_OK");
        assert_eq!(object_name_segment("--lead"), "LEAD");
    }
}
