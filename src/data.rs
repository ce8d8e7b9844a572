use std::{borrow::Cow, cmp::Ordering, fmt};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ColumnType;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl Eq for Value {}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn as_display(&self) -> String {
        self.as_text().into_owned()
    }

    /// Textual form used by validators and key comparison; borrows for strings.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Integer(i) => Cow::Owned(i.to_string()),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Cow::Owned(format!("{f:.1}"))
                } else {
                    Cow::Owned(f.to_string())
                }
            }
            Value::Boolean(b) => Cow::Owned(b.to_string()),
            Value::Date(d) => Cow::Owned(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => Cow::Owned(dt.format(DATETIME_FORMAT).to_string()),
            Value::Guid(g) => Cow::Owned(g.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::Date(_) => 3,
            Value::DateTime(_) => 4,
            Value::Guid(_) => 5,
            Value::String(_) => 6,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Guid(a), Value::Guid(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Text of an optional cell, `None` for SQL-style nulls.
pub fn cell_text(cell: &Option<Value>) -> Option<Cow<'_, str>> {
    cell.as_ref().map(Value::as_text)
}

/// Converts a persisted or user-supplied string back into a typed value.
pub fn parse_typed_value(value: &str, ty: &ColumnType) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::Text | ColumnType::VarChar(_) => Value::String(value.to_string()),
        ColumnType::SmallInt | ColumnType::Integer => {
            let parsed: i64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            if matches!(ty, ColumnType::SmallInt) && i16::try_from(parsed).is_err() {
                bail!("Value '{value}' is out of range for smallint");
            }
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Boolean => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "t" => Value::Boolean(true),
            "false" | "f" => Value::Boolean(false),
            _ => bail!("Failed to parse '{value}' as boolean"),
        },
        ColumnType::Date => Value::Date(
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
                .with_context(|| format!("Failed to parse '{value}' as date"))?,
        ),
        ColumnType::DateTime => Value::DateTime(
            NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
                .with_context(|| format!("Failed to parse '{value}' as timestamp"))?,
        ),
        ColumnType::Guid => {
            let trimmed = value.trim().trim_matches(|c| matches!(c, '{' | '}'));
            Value::Guid(
                Uuid::parse_str(trimmed)
                    .map_err(|err| anyhow!("Failed to parse '{value}' as uuid: {err}"))?,
            )
        }
    };
    Ok(Some(parsed))
}

/// Maps a JSON scalar from an API body or object-store document into a cell.
pub fn value_from_json(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Integer(i)),
            None => n.as_f64().map(Value::Float),
        },
        other => Some(Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_text_renders_typed_values_canonically() {
        let date = NaiveDate::from_ymd_opt(1990, 2, 13).unwrap();
        assert_eq!(Value::Date(date).as_text(), "1990-02-13");
        assert_eq!(Value::Float(1.0).as_text(), "1.0");
        assert_eq!(Value::Float(0.25).as_text(), "0.25");
        assert_eq!(Value::Integer(42).as_text(), "42");
        assert!(matches!(Value::text("abc").as_text(), Cow::Borrowed("abc")));
    }

    #[test]
    fn parse_typed_value_treats_empty_as_null() {
        assert_eq!(parse_typed_value("", &ColumnType::Date).unwrap(), None);
        assert_eq!(
            parse_typed_value("12", &ColumnType::SmallInt).unwrap(),
            Some(Value::Integer(12))
        );
        assert!(parse_typed_value("70000", &ColumnType::SmallInt).is_err());
        assert!(parse_typed_value("maybe", &ColumnType::Boolean).is_err());
    }

    #[test]
    fn parse_typed_value_supports_guid_inputs() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        let parsed = parse_typed_value(raw, &ColumnType::Guid).unwrap().unwrap();
        assert_eq!(parsed, Value::Guid(Uuid::parse_str(raw).unwrap()));
        assert!(parse_typed_value("not-a-guid", &ColumnType::Guid).is_err());
    }

    #[test]
    fn mixed_variants_order_without_panicking() {
        let mut values = vec![
            Value::text("b"),
            Value::Integer(3),
            Value::Float(2.5),
            Value::Boolean(true),
        ];
        values.sort();
        assert_eq!(values[0], Value::Boolean(true));
        assert_eq!(values[1], Value::Float(2.5));
        assert_eq!(values[2], Value::Integer(3));
    }

    #[test]
    fn json_scalars_map_to_cells() {
        assert_eq!(value_from_json(&serde_json::json!(null)), None);
        assert_eq!(
            value_from_json(&serde_json::json!(325)),
            Some(Value::Integer(325))
        );
        assert_eq!(
            value_from_json(&serde_json::json!("N/A")),
            Some(Value::text("N/A"))
        );
    }
}
