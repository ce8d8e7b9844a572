//! Conversion of cleaned text columns into storage types.
//!
//! Each column of a cleaned entity gets a [`CastTarget`]. String targets may
//! carry a [`FieldRule`]; cells that fail the target's validator are nulled
//! rather than dropped, so the row count never changes here. A column that already carries its target type is skipped,
//! which keeps casting idempotent.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{debug, info};

use crate::{
    clean::WEIGHT_IN_KG,
    data::{DATETIME_FORMAT, Value, cell_text},
    dates::parse_iso_date,
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    schema::{ColumnMeta, ColumnType, DEFAULT_VARCHAR_LENGTH},
    validate::{FieldRule, REMOVED, STILL_AVAILABLE, strip_currency},
    weight::weight_category,
};

pub const WEIGHT_CATEGORY: &str = "weight_category";
pub const IS_REMOVED: &str = "is_removed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    /// Bounded string sized to the longest observed value.
    VarChar(Option<FieldRule>),
    VarChar255(Option<FieldRule>),
    SmallInt,
    Float,
    Date,
    Timestamp,
    Uuid,
    /// Derives the destination column from exact literals in `source`.
    Boolean {
        source: &'static str,
        true_literal: &'static str,
        false_literal: &'static str,
    },
}

impl CastTarget {
    fn column_type(&self) -> ColumnType {
        match self {
            CastTarget::VarChar(_) | CastTarget::VarChar255(_) => {
                ColumnType::VarChar(DEFAULT_VARCHAR_LENGTH)
            }
            CastTarget::SmallInt => ColumnType::SmallInt,
            CastTarget::Float => ColumnType::Float,
            CastTarget::Date => ColumnType::Date,
            CastTarget::Timestamp => ColumnType::DateTime,
            CastTarget::Uuid => ColumnType::Guid,
            CastTarget::Boolean { .. } => ColumnType::Boolean,
        }
    }

    fn is_satisfied_by(&self, current: ColumnType) -> bool {
        match self {
            CastTarget::VarChar(_) => matches!(current, ColumnType::VarChar(_)),
            other => other.column_type() == current,
        }
    }

    /// Pattern a cell must match before conversion, if any.
    pub fn rule(&self) -> Option<FieldRule> {
        match self {
            CastTarget::VarChar(rule) | CastTarget::VarChar255(rule) => *rule,
            CastTarget::Float => Some(FieldRule::Decimal),
            CastTarget::Uuid => Some(FieldRule::Uuid),
            _ => None,
        }
    }

    /// Converts one cell's text, `None` when the text is not valid for the target.
    fn convert(&self, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        match self {
            CastTarget::VarChar(rule) => admit(*rule, text),
            CastTarget::VarChar255(rule) => admit(*rule, text)
                .filter(|_| text.chars().count() <= DEFAULT_VARCHAR_LENGTH as usize),
            CastTarget::SmallInt => trimmed
                .parse::<i64>()
                .ok()
                .filter(|n| i16::try_from(*n).is_ok())
                .map(Value::Integer),
            CastTarget::Float => FieldRule::Decimal
                .accepts(trimmed)
                .then(|| trimmed.parse().ok().map(Value::Float))
                .flatten(),
            CastTarget::Date => parse_iso_date(trimmed).map(Value::Date),
            CastTarget::Timestamp => NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
                .ok()
                .map(Value::DateTime),
            CastTarget::Uuid => FieldRule::Uuid
                .accepts(trimmed)
                .then(|| uuid::Uuid::parse_str(trimmed).ok().map(Value::Guid))
                .flatten(),
            CastTarget::Boolean { .. } => None,
        }
    }
}

fn admit(rule: Option<FieldRule>, text: &str) -> Option<Value> {
    rule.is_none_or(|rule| rule.accepts(text)).then(|| Value::text(text))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastReport {
    pub column: String,
    pub datatype: ColumnType,
    pub skipped: bool,
    pub nulled: Vec<String>,
}

impl CastReport {
    fn unchanged(column: &str, datatype: ColumnType) -> Self {
        Self {
            column: column.to_string(),
            datatype,
            skipped: true,
            nulled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub records: RecordSet,
    pub columns: Vec<CastReport>,
}

impl CastOutcome {
    pub fn nulled(&self) -> usize {
        self.columns.iter().map(|c| c.nulled.len()).sum()
    }
}

/// Casts one column in place, nulling cells the target rejects.
pub fn cast_column(
    set: &mut RecordSet,
    column: &str,
    target: CastTarget,
) -> Result<CastReport, RecordSetError> {
    if let CastTarget::Boolean {
        source,
        true_literal,
        false_literal,
    } = target
    {
        return cast_boolean(set, column, source, true_literal, false_literal);
    }

    let current = set
        .column_type(column)
        .ok_or_else(|| RecordSetError::MissingColumn(column.to_string()))?;
    if target.is_satisfied_by(current) {
        debug!("Column '{column}' is already {current}; nothing to cast");
        return Ok(CastReport::unchanged(column, current));
    }

    let mut nulled = Vec::new();
    set.map_column(column, |cell| {
        let value = cell?;
        let text = value.as_text();
        let converted = target.convert(&text);
        if converted.is_none() {
            nulled.push(text.into_owned());
        }
        converted
    })?;
    let datatype = match target {
        CastTarget::VarChar(_) => ColumnType::VarChar(observed_max_length(set, column)?),
        other => other.column_type(),
    };
    set.set_column_type(column, datatype)?;
    if !nulled.is_empty() {
        match target.rule() {
            Some(rule) => debug!(
                "Nulled {} value(s) of '{column}' not matching {}: {:?}",
                nulled.len(),
                rule.pattern(),
                nulled
            ),
            None => debug!(
                "Nulled {} value(s) of '{column}' invalid as {datatype}: {:?}",
                nulled.len(),
                nulled
            ),
        }
    }
    Ok(CastReport {
        column: column.to_string(),
        datatype,
        skipped: false,
        nulled,
    })
}

/// Longest value in characters; the default width when the column is all null.
fn observed_max_length(set: &RecordSet, column: &str) -> Result<u32, RecordSetError> {
    let longest = set
        .column_values(column)?
        .into_iter()
        .flatten()
        .map(|value| value.as_text().chars().count())
        .max();
    Ok(match longest {
        Some(len) => u32::try_from(len).unwrap_or(u32::MAX).max(1),
        None => DEFAULT_VARCHAR_LENGTH,
    })
}

fn cast_boolean(
    set: &mut RecordSet,
    column: &str,
    source: &str,
    true_literal: &str,
    false_literal: &str,
) -> Result<CastReport, RecordSetError> {
    if set.column_type(column) == Some(ColumnType::Boolean) {
        return Ok(CastReport::unchanged(column, ColumnType::Boolean));
    }
    let source_idx = set.require_column(source)?;
    set.add_column(ColumnMeta::new(column, ColumnType::Boolean), None);
    let mut nulled = Vec::new();
    set.derive_column(column, |row| match cell_text(&row[source_idx]) {
        Some(text) if text == true_literal => Some(Value::Boolean(true)),
        Some(text) if text == false_literal => Some(Value::Boolean(false)),
        Some(text) => {
            nulled.push(text.into_owned());
            None
        }
        None => None,
    })?;
    set.set_column_type(column, ColumnType::Boolean)?;
    Ok(CastReport {
        column: column.to_string(),
        datatype: ColumnType::Boolean,
        skipped: false,
        nulled,
    })
}

/// Storage type of every column the warehouse keeps for `entity`.
pub fn cast_plan(entity: Entity) -> Vec<(&'static str, CastTarget)> {
    use CastTarget::*;
    use FieldRule::{Code, CountryCode, Digits, Expiry, Name, ProductCode, Text};
    match entity {
        Entity::Order => vec![
            ("date_uuid", Uuid),
            ("user_uuid", Uuid),
            ("card_number", VarChar(Some(Digits))),
            ("store_code", VarChar(Some(Code))),
            ("product_code", VarChar(Some(ProductCode))),
            ("product_quantity", SmallInt),
        ],
        Entity::User => vec![
            ("first_name", VarChar255(Some(Name))),
            ("last_name", VarChar255(Some(Name))),
            ("date_of_birth", Date),
            ("country_code", VarChar(Some(CountryCode))),
            ("user_uuid", Uuid),
            ("join_date", Date),
        ],
        Entity::Store => vec![
            ("longitude", Float),
            ("locality", VarChar255(Some(Text))),
            ("store_code", VarChar(Some(Code))),
            ("staff_numbers", SmallInt),
            ("opening_date", Date),
            ("store_type", VarChar255(Some(Text))),
            ("latitude", Float),
            ("country_code", VarChar(Some(CountryCode))),
            ("continent", VarChar255(Some(Text))),
        ],
        Entity::Product => vec![
            (WEIGHT_CATEGORY, VarChar(None)),
            ("product_price", Float),
            (WEIGHT_IN_KG, Float),
            ("EAN", VarChar(Some(Digits))),
            ("product_code", VarChar(Some(ProductCode))),
            ("date_added", Date),
            ("uuid", Uuid),
            (
                IS_REMOVED,
                Boolean {
                    source: "removed",
                    true_literal: REMOVED,
                    false_literal: STILL_AVAILABLE,
                },
            ),
        ],
        Entity::DateEvent => vec![
            ("day", VarChar(Some(Digits))),
            ("year", VarChar(Some(Digits))),
            ("month", VarChar(Some(Digits))),
            ("time_period", VarChar(Some(Text))),
            ("date_uuid", Uuid),
            ("event_timestamp", Timestamp),
        ],
        Entity::Card => vec![
            ("expiry_date", VarChar(Some(Expiry))),
            ("card_number", VarChar(Some(Digits))),
            ("date_payment_confirmed", Date),
            ("expiry_full_date", Date),
        ],
    }
}

/// Applies the entity's cast plan, deriving the product columns first.
pub fn cast_entity(entity: Entity, mut records: RecordSet) -> Result<CastOutcome> {
    if entity == Entity::Product {
        prepare_products(&mut records).context("Preparing product columns for casting")?;
    }
    let mut columns = Vec::new();
    for (column, target) in cast_plan(entity) {
        let report = cast_column(&mut records, column, target)
            .with_context(|| format!("Casting {}.{column}", entity.table_name()))?;
        columns.push(report);
    }
    let outcome = CastOutcome { records, columns };
    info!(
        "Cast {} column(s) of {}; {} value(s) nulled",
        outcome.columns.iter().filter(|c| !c.skipped).count(),
        entity.table_name(),
        outcome.nulled()
    );
    Ok(outcome)
}

fn prepare_products(set: &mut RecordSet) -> Result<(), RecordSetError> {
    if set.column_type("product_price").is_some_and(|ty| ty.is_textual()) {
        set.map_column("product_price", |cell| {
            cell.map(|value| Value::text(strip_currency(&value.as_text())))
        })?;
    }
    let weight = set.require_column(WEIGHT_IN_KG)?;
    set.add_column(ColumnMeta::text(WEIGHT_CATEGORY), None);
    set.derive_column(WEIGHT_CATEGORY, |row| {
        row[weight]
            .as_ref()
            .and_then(Value::as_f64)
            .map(|kg| Value::text(weight_category(kg)))
    })
}
