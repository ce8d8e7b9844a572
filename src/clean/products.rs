use anyhow::Result;

use super::{CleanOutcome, Pipeline, RejectPolicy, drop_null_rows, filter_column};
use crate::{
    data::Value,
    dates::canonicalize_date,
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    schema::ColumnType,
    validate::{FieldRule, normalize_availability, strip_currency},
    weight::parse_weight_kg,
};

pub const RAW_WEIGHT: &str = "weight";
pub const WEIGHT_IN_KG: &str = "weight_in_kg";

pub fn clean_products(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::Product, records)
        .stage("convert weights and prices", |set| {
            let rejected = convert_weights(set)?;
            set.map_column("product_price", |cell| {
                cell.map(|value| Value::text(strip_currency(&value.as_text())))
            })?;
            Ok(rejected)
        })?
        .stage("normalize availability", |set| {
            Ok(filter_column(set, "removed", RejectPolicy::DropRow, normalize_availability)?)
        })?
        .stage("drop rows with nulls", |set| Ok(drop_null_rows(set)))?
        .stage("validate category", |set| {
            Ok(filter_column(set, "category", RejectPolicy::DropRow, |v| {
                FieldRule::Category.check(v)
            })?)
        })?
        .stage("canonicalize date added", |set| {
            Ok(filter_column(set, "date_added", RejectPolicy::DropRow, canonicalize_date)?)
        })?
        .finish())
}

/// Replaces the free-text `weight` column with `weight_in_kg`. Unparseable
/// weights become null cells for the null stage to remove. A record set that
/// was already converted is left alone.
fn convert_weights(set: &mut RecordSet) -> Result<Vec<String>, RecordSetError> {
    if !set.has_column(RAW_WEIGHT) {
        set.require_column(WEIGHT_IN_KG)?;
        return Ok(Vec::new());
    }
    let mut rejected = Vec::new();
    set.map_column(RAW_WEIGHT, |cell| {
        let raw = cell?;
        match parse_weight_kg(&raw.as_text()) {
            Ok(kg) => Some(Value::Float(kg)),
            Err(err) => {
                rejected.push(err.to_string());
                None
            }
        }
    })?;
    set.rename_column(RAW_WEIGHT, WEIGHT_IN_KG)?;
    set.set_column_type(WEIGHT_IN_KG, ColumnType::Float)?;
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::STILL_AVAILABLE;

    const HEADERS: &[&str] = &[
        "product_name",
        "product_price",
        "weight",
        "category",
        "EAN",
        "date_added",
        "uuid",
        "removed",
        "product_code",
    ];

    fn product<'a>(weight: &'a str, category: &'a str, removed: &'a str, added: &'a str) -> Vec<Option<&'a str>> {
        vec![
            Some("FurReal Dazzlin' Dimples"),
            Some("£39.99"),
            Some(weight),
            Some(category),
            Some("7425710935115"),
            Some(added),
            Some("83dc0a69-f96f-4c34-bcb7-928acae19a94"),
            Some(removed),
            Some("R7-3126933h"),
        ]
    }

    fn raw() -> RecordSet {
        RecordSet::from_text_rows(
            HEADERS,
            vec![
                product("1.6kg", "toys-and-games", "Still_avaliable", "2005-12-02"),
                product("5lbs", "toys-and-games", "Removed", "2005-12-02"),
                product("3 x 100g", "S1YB74MLMJ", "Removed", "2005-12-02"),
                product("200g", "homeware", "Removed", "not-a-date"),
                product("500ml", "homeware", "VLPCU81M30", "2010-01-01"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn unknown_weight_units_drop_the_row() {
        let outcome = clean_products(raw()).unwrap();
        assert_eq!(outcome.stages[0].rejected, 1);
        assert!(outcome.stages[0].samples[0].contains("lbs"));
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn survivors_are_converted_and_normalized() {
        let outcome = clean_products(raw()).unwrap();
        let products = &outcome.records;
        assert!(!products.has_column(RAW_WEIGHT));
        assert_eq!(products.get(0, WEIGHT_IN_KG), Some(&Value::Float(1.6)));
        assert_eq!(products.get(0, "product_price"), Some(&Value::text("39.99")));
        assert_eq!(products.get(0, "removed"), Some(&Value::text(STILL_AVAILABLE)));
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let once = clean_products(raw()).unwrap().records;
        let twice = clean_products(once.clone()).unwrap().records;
        assert_eq!(once, twice);
    }
}
