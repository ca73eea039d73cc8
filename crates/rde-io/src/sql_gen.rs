//! Identifier sanitisation and literal escaping shared by every SQL-dialect
//! source and destination (§4.4). Nothing here ever concatenates
//! unsanitised user input into a query string.

use chrono::{DateTime, Utc};
use rde_core::Value;

/// Sanitises a column/table identifier: alnum + underscore, max 64 chars,
/// must start with a letter or underscore. Anything else is rejected rather
/// than silently stripped, so a malicious or malformed identifier never
/// reaches a query string in a partially-sanitised form.
pub fn sanitize_identifier(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("identifier is empty".to_string());
    }
    if raw.len() > 64 {
        return Err(format!("identifier {raw:?} exceeds 64 characters"));
    }
    let mut chars = raw.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!("identifier {raw:?} must start with a letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("identifier {raw:?} contains characters outside [A-Za-z0-9_]"));
    }
    Ok(raw.to_string())
}

/// Type-escapes a literal value for use in a generated WHERE clause.
/// Strings are single-quoted with `'` doubled; timestamps render as
/// ISO-8601; booleans as `TRUE`/`FALSE`; NULL is unquoted.
pub fn escape_literal(value: &Value) -> String {
    match value {
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Binary(b) => format!("'{}'", hex::encode(b)),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
        Value::TimestampUtc(ts) => format!("'{}'", ts.to_rfc3339()),
        Value::Null => "NULL".to_string(),
    }
}

pub fn escape_timestamp(ts: DateTime<Utc>) -> String {
    escape_literal(&Value::TimestampUtc(ts))
}

/// Minimal hex encoding so BYTEA/BINARY literals don't pull in an extra
/// dependency purely for this one call site.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_injection_payload() {
        assert!(sanitize_identifier("id\"; DROP TABLE x; --").is_err());
        assert!(sanitize_identifier("id; DROP TABLE x; --").is_err());
    }

    #[test]
    fn accepts_plain_identifier() {
        assert_eq!(sanitize_identifier("customer_id").unwrap(), "customer_id");
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(sanitize_identifier("1table").is_err());
    }

    #[test]
    fn string_literal_doubles_quotes() {
        assert_eq!(escape_literal(&Value::String("O'Brien".into())), "'O''Brien'");
    }

    #[test]
    fn bool_literal_is_unquoted_keyword() {
        assert_eq!(escape_literal(&Value::Bool(true)), "TRUE");
        assert_eq!(escape_literal(&Value::Bool(false)), "FALSE");
    }

    #[test]
    fn null_is_unquoted() {
        assert_eq!(escape_literal(&Value::Null), "NULL");
    }
}
