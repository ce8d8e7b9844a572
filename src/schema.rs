//! Column storage types and per-column metadata.
//!
//! Every [`RecordSet`](crate::record_set::RecordSet) column carries a
//! [`ColumnMeta`] describing its name and current [`ColumnType`]. Raw extracted
//! data is always [`ColumnType::Text`]; the type caster moves columns to their
//! storage types, and the warehouse catalog persists the result as strings such
//! as `varchar(11)` or `smallint`.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Fallback width for bounded strings whose observed maximum cannot be computed.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    VarChar(u32),
    SmallInt,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Guid,
}

impl ColumnType {
    pub fn signature(&self) -> String {
        match self {
            ColumnType::Text => "text".to_string(),
            ColumnType::VarChar(length) => format!("varchar({length})"),
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::Float => "float".to_string(),
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::DateTime => "timestamp".to_string(),
            ColumnType::Guid => "uuid".to_string(),
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::VarChar(_))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let parsed = match normalized.as_str() {
            "text" | "string" => ColumnType::Text,
            "smallint" | "int2" => ColumnType::SmallInt,
            "integer" | "int" | "bigint" => ColumnType::Integer,
            "float" | "double" | "real" => ColumnType::Float,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "timestamp" | "datetime" => ColumnType::DateTime,
            "uuid" | "guid" => ColumnType::Guid,
            other => return parse_varchar(other),
        };
        Ok(parsed)
    }
}

fn parse_varchar(value: &str) -> Result<ColumnType> {
    let inner = value
        .strip_prefix("varchar(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| anyhow!("Unknown column type '{value}'"))?;
    let length: u32 = inner
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid varchar length in '{value}'"))?;
    if length == 0 {
        return Err(anyhow!("Varchar length must be positive in '{value}'"));
    }
    Ok(ColumnType::VarChar(length))
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.signature())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ColumnType::from_str(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, datatype: ColumnType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }
}
