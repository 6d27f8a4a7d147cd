use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

use crate::schema::ColumnType;

/// Tokens read as missing values rather than text, matching what pandas treats as NA by default.
const MISSING_VALUE_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>", "N/A",
    "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Literals read as booleans; mixed-case spellings such as `tRuE` stay text.
const BOOLEAN_TOKENS: &[&str] = &["True", "TRUE", "true", "False", "FALSE", "false"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Converts a value detected at parse time into the representation stored for a column of `ty`.
    /// `raw` is the original cell text, kept verbatim for text-like columns.
    pub fn coerce(&self, ty: &ColumnType, raw: &str) -> Value {
        match (self, ty) {
            (Value::Null, _) => Value::Null,
            (Value::Integer(i), ColumnType::Float) => Value::Float(*i as f64),
            (Value::Integer(_), ColumnType::Integer)
            | (Value::Float(_), ColumnType::Float)
            | (Value::Timestamp(_), ColumnType::DateTime) => self.clone(),
            _ => Value::Text(raw.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// One parsed CSV cell: the text as uploaded plus the value detected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub text: String,
    pub value: Value,
}

impl Cell {
    pub fn parse(text: &str) -> Self {
        Cell {
            text: text.to_string(),
            value: parse_cell(text),
        }
    }

    pub fn null() -> Self {
        Cell {
            text: String::new(),
            value: Value::Null,
        }
    }
}

pub fn is_missing_token(value: &str) -> bool {
    value.is_empty() || MISSING_VALUE_TOKENS.contains(&value)
}

pub fn is_boolean_token(value: &str) -> bool {
    BOOLEAN_TOKENS.contains(&value.trim())
}

/// Detects the value of a single cell. Numbers win over timestamps, so `20240101` is an integer.
pub fn parse_cell(raw: &str) -> Value {
    if is_missing_token(raw) {
        return Value::Null;
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Text(raw.to_string());
    }
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Value::Integer(parsed);
    }
    if looks_numeric(trimmed)
        && let Ok(parsed) = trimmed.parse::<f64>()
    {
        return Value::Float(parsed);
    }
    if let Ok(parsed) = parse_naive_datetime(trimmed) {
        return Value::Timestamp(parsed);
    }
    if let Ok(parsed) = parse_naive_date(trimmed) {
        return Value::Timestamp(parsed.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    Value::Text(raw.to_string())
}

// Rust's f64 parser also accepts words such as "infinity"; only digit-bearing tokens count as numbers.
fn looks_numeric(value: &str) -> bool {
    value.bytes().any(|b| b.is_ascii_digit())
        || matches!(
            value.to_ascii_lowercase().as_str(),
            "inf" | "-inf" | "+inf"
        )
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}
