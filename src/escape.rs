//! SQL literal escaping and printf-style template substitution.
//!
//! Values are escaped individually into MySQL literals and substituted into
//! `%s` / `%d` (or `%(name)s`) placeholders. Substitution always runs, even
//! against the empty tuple, so templates spell literal percents as `%%`.

use crate::error::QuerysetError;
use crate::types::{SqlArgs, SqlValue};

/// Render one value as a MySQL literal.
///
/// Strings are quoted and backslash-escaped; numerics render bare; booleans
/// render as `1` / `0`; datetimes are first coerced to the
/// seconds.microseconds-since-epoch string and then quoted like any other
/// string.
#[must_use]
pub fn escape_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => quote_str(s),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        SqlValue::Timestamp(dt) => quote_str(&datetime_to_epoch_string(*dt)),
        SqlValue::Blob(bytes) => {
            // Binary payloads travel as hex literals; nothing to escape.
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("0x");
            for b in bytes {
                out.push_str(&format!("{b:02X}"));
            }
            out
        }
        SqlValue::Null => "NULL".to_string(),
    }
}

/// The narrow datetime special case: seconds.microseconds since epoch.
/// Microseconds are not zero padded.
#[must_use]
pub fn datetime_to_epoch_string(dt: chrono::NaiveDateTime) -> String {
    let utc = dt.and_utc();
    format!("{}.{}", utc.timestamp(), utc.timestamp_subsec_micros())
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Escape every argument and substitute it into the template.
///
/// Positional args feed `%s` / `%d` left to right; named args feed
/// `%(name)s`; a scalar behaves like a one-element tuple. `%d` insists on an
/// integer value.
///
/// # Errors
///
/// Returns `QuerysetError::SqlFormatting` on placeholder/argument arity
/// mismatch, an unknown name, a `%d` against a non-integer, or a stray `%`.
pub fn substitute(template: &str, args: &SqlArgs) -> Result<String, QuerysetError> {
    let positional: Option<&[SqlValue]> = match args {
        SqlArgs::Positional(values) => Some(values.as_slice()),
        SqlArgs::Scalar(value) => Some(std::slice::from_ref(value)),
        SqlArgs::Named(_) => None,
    };

    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut idx = 0;
    let mut consumed = 0usize;

    while idx < bytes.len() {
        if bytes[idx] != b'%' {
            // Copy whole UTF-8 code points through untouched.
            let ch_len = utf8_len(bytes[idx]);
            out.push_str(&template[idx..idx + ch_len]);
            idx += ch_len;
            continue;
        }
        match bytes.get(idx + 1).copied() {
            Some(b'%') => {
                out.push('%');
                idx += 2;
            }
            Some(conv @ (b's' | b'd')) => {
                let values = positional.ok_or_else(|| {
                    QuerysetError::SqlFormatting(
                        "positional placeholder used with named arguments".to_string(),
                    )
                })?;
                let value = values.get(consumed).ok_or_else(|| {
                    QuerysetError::SqlFormatting(
                        "not enough arguments for format string".to_string(),
                    )
                })?;
                out.push_str(&render(conv, value)?);
                consumed += 1;
                idx += 2;
            }
            Some(b'(') => {
                let (name, rest) = scan_name(bytes, idx + 2)?;
                let conv = bytes.get(rest).copied();
                let Some(conv @ (b's' | b'd')) = conv else {
                    return Err(QuerysetError::SqlFormatting(format!(
                        "unsupported conversion after %({name})"
                    )));
                };
                let SqlArgs::Named(map) = args else {
                    return Err(QuerysetError::SqlFormatting(format!(
                        "named placeholder %({name})s used without a mapping"
                    )));
                };
                let value = map.get(&name).ok_or_else(|| {
                    QuerysetError::SqlFormatting(format!("missing argument for key `{name}`"))
                })?;
                out.push_str(&render(conv, value)?);
                idx = rest + 1;
            }
            other => {
                return Err(QuerysetError::SqlFormatting(format!(
                    "unsupported format character {:?} in template",
                    other.map(|b| b as char)
                )));
            }
        }
    }

    if let Some(values) = positional {
        if consumed < values.len() {
            return Err(QuerysetError::SqlFormatting(
                "not all arguments converted during string formatting".to_string(),
            ));
        }
    }

    Ok(out)
}

fn render(conv: u8, value: &SqlValue) -> Result<String, QuerysetError> {
    if conv == b'd' && !matches!(value, SqlValue::Int(_)) {
        return Err(QuerysetError::SqlFormatting(format!(
            "%d requires an integer value, got {value:?}"
        )));
    }
    Ok(escape_value(value))
}

fn scan_name(bytes: &[u8], start: usize) -> Result<(String, usize), QuerysetError> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx] != b')' {
        idx += 1;
    }
    if idx >= bytes.len() {
        return Err(QuerysetError::SqlFormatting(
            "unterminated %(name) placeholder".to_string(),
        ));
    }
    let name = std::str::from_utf8(&bytes[start..idx])
        .map_err(|_| QuerysetError::SqlFormatting("non-UTF-8 placeholder name".to_string()))?
        .to_string();
    Ok((name, idx + 1))
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        let v = SqlValue::Text("Robert'); DROP TABLE items; --".to_string());
        assert_eq!(
            escape_value(&v),
            "'Robert\\'); DROP TABLE items; --'"
        );
        let v = SqlValue::Text("a\\b".to_string());
        assert_eq!(escape_value(&v), "'a\\\\b'");
    }

    #[test]
    fn substitutes_positional_args() {
        let sql = substitute(
            "SELECT * FROM `t` WHERE a = %s AND b = %d",
            &SqlArgs::Positional(vec![SqlValue::Text("x".into()), SqlValue::Int(7)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM `t` WHERE a = 'x' AND b = 7");
    }

    #[test]
    fn substitutes_named_args() {
        let mut map = HashMap::new();
        map.insert("title".to_string(), SqlValue::Text("it's".into()));
        let sql = substitute("UPDATE `t` SET title = %(title)s", &SqlArgs::Named(map)).unwrap();
        assert_eq!(sql, "UPDATE `t` SET title = 'it\\'s'");
    }

    #[test]
    fn scalar_acts_as_single_argument() {
        let sql = substitute("WHERE id = %s", &SqlArgs::Scalar(SqlValue::Int(3))).unwrap();
        assert_eq!(sql, "WHERE id = 3");
    }

    #[test]
    fn double_percent_is_literal_even_with_empty_args() {
        let sql = substitute("SELECT '100%%' FROM `t`", &SqlArgs::empty()).unwrap();
        assert_eq!(sql, "SELECT '100%' FROM `t`");
    }

    #[test]
    fn arity_mismatch_is_a_formatting_error() {
        let err = substitute("WHERE a = %s AND b = %s", &SqlArgs::Scalar(SqlValue::Int(1)))
            .unwrap_err();
        assert!(matches!(err, QuerysetError::SqlFormatting(_)));

        let err = substitute(
            "WHERE a = %s",
            &SqlArgs::Positional(vec![SqlValue::Int(1), SqlValue::Int(2)]),
        )
        .unwrap_err();
        assert!(matches!(err, QuerysetError::SqlFormatting(_)));
    }

    #[test]
    fn percent_d_rejects_non_integers() {
        let err = substitute("LIMIT %d", &SqlArgs::Scalar(SqlValue::Text("5".into()))).unwrap_err();
        assert!(matches!(err, QuerysetError::SqlFormatting(_)));
    }

    #[test]
    fn datetime_coerces_to_epoch_string_before_escaping() {
        let dt = NaiveDate::from_ymd_opt(2012, 6, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 15, 42)
            .unwrap();
        let rendered = escape_value(&SqlValue::Timestamp(dt));
        assert_eq!(rendered, format!("'{}.42'", dt.and_utc().timestamp()));
    }
}
