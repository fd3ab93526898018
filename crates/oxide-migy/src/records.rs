//! Loosely-typed row data read from a live database.

use std::fmt;

use chrono::NaiveDateTime;

/// Format used when a timestamp is printed in a row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the textual timestamp forms databases hand back.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_end_matches('Z');
    PARSE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// One column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Any integer column.
    Integer(i64),
    /// Any floating point or decimal column.
    Float(f64),
    /// Character data, and anything without a better match.
    Text(String),
    /// Date and time columns.
    Timestamp(NaiveDateTime),
    /// Binary columns.
    Bytes(Vec<u8>),
}

/// How string literals are spelled when SQL is generated from values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralStyle {
    /// MySQL: control characters, quote and backslash are backslash-escaped.
    Backslash,
    /// Standard SQL: quotes are doubled and nothing else is escaped.
    Doubled,
}

fn escape_into(out: &mut String, s: &str, pattern_chars: bool) {
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\x1a' => out.push_str("\\Z"),
            '\x08' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '%' | '_' if pattern_chars => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    out.push_str("X'");
    for byte in bytes {
        out.push_str(&format!("{byte:02X}"));
    }
    out.push('\'');
}

impl Value {
    /// Spells the value as a SQL literal that reads back as the same value.
    #[must_use]
    pub fn to_sql(&self, style: LiteralStyle) -> String {
        let mut out = String::new();
        match self {
            Self::Null => out.push_str("NULL"),
            Self::Integer(v) => out.push_str(&v.to_string()),
            Self::Float(v) => out.push_str(&v.to_string()),
            Self::Timestamp(ts) => {
                out.push_str(&format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")));
            }
            Self::Bytes(b) => push_hex(&mut out, b),
            // Script splitting reads a backslash as an escape, so such text
            // cannot be spelled as a plain standard literal.
            Self::Text(s) if style == LiteralStyle::Doubled && s.contains('\\') => {
                out.push_str("CAST(");
                push_hex(&mut out, s.as_bytes());
                out.push_str(" AS TEXT)");
            }
            Self::Text(s) => {
                out.push('\'');
                match style {
                    LiteralStyle::Backslash => escape_into(&mut out, s, false),
                    LiteralStyle::Doubled => out.push_str(&s.replace('\'', "''")),
                }
                out.push('\'');
            }
        }
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Timestamp(ts) => write!(f, "'{}'", ts.format(TIMESTAMP_FORMAT)),
            Self::Text(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                escape_into(&mut out, s, true);
                out.push('\'');
                f.write_str(&out)
            }
            Self::Bytes(b) => {
                let mut out = String::with_capacity(b.len() + 2);
                out.push('\'');
                escape_into(&mut out, &String::from_utf8_lossy(b), true);
                out.push('\'');
                f.write_str(&out)
            }
        }
    }
}

/// One table row, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<Value>);

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// The rows of one table or query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Records {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Rows in the order the database returned them.
    pub rows: Vec<Row>,
}

impl Records {
    /// Index of the column named `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_row_display() {
        let row = Row(vec![
            Value::Integer(42),
            Value::Timestamp(ts("2025-04-26 19:22:30")),
            Value::Text("line1\r\n\t'%'".into()),
        ]);
        assert_eq!(
            row.to_string(),
            r"(42, '2025-04-26 19:22:30', 'line1\r\n\t\'\%\'')"
        );
    }

    #[test]
    fn test_null_is_bare_in_rows() {
        let row = Row(vec![Value::Integer(1), Value::Null, Value::Text("NULL".into())]);
        assert_eq!(row.to_string(), "(1, NULL, 'NULL')");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Integer(-7).to_string(), "-7");
        assert_eq!(
            Value::Text("a\0b\x1ac\x08d\\e_f".into()).to_string(),
            r"'a\0b\Zc\bd\\e\_f'"
        );
        assert_eq!(Value::Bytes(b"ab'".to_vec()).to_string(), r"'ab\''");
        assert_eq!(Row::default().to_string(), "()");
    }

    #[test]
    fn test_timestamp_display_drops_fraction() {
        let v = Value::Timestamp(ts("2025-01-02 03:04:05.678"));
        assert_eq!(v.to_string(), "'2025-01-02 03:04:05'");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(ts("2025-04-19T00:33:32Z"), ts("2025-04-19 00:33:32"));
        assert_eq!(ts("2025-04-19"), ts("2025-04-19 00:00:00"));
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_to_sql() {
        let text = Value::Text("it's 100%_\\".into());
        assert_eq!(text.to_sql(LiteralStyle::Backslash), r"'it\'s 100%_\\'");
        assert_eq!(
            text.to_sql(LiteralStyle::Doubled),
            "CAST(X'6974277320313030255F5C' AS TEXT)"
        );
        assert_eq!(
            Value::Text("it's".into()).to_sql(LiteralStyle::Doubled),
            "'it''s'"
        );
        assert_eq!(Value::Bytes(vec![0, 0xab]).to_sql(LiteralStyle::Doubled), "X'00AB'");
        assert_eq!(Value::Null.to_sql(LiteralStyle::Doubled), "NULL");
        assert_eq!(
            Value::Timestamp(ts("2025-01-02 03:04:05")).to_sql(LiteralStyle::Backslash),
            "'2025-01-02 03:04:05'"
        );
    }
}
