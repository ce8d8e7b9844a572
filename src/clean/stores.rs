use anyhow::Result;

use super::{CleanOutcome, Pipeline, RejectPolicy, filter_column, is_null_like, replace_literal};
use crate::{
    data::{Value, cell_text},
    dates::canonicalize_date,
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    schema::ColumnType,
    validate::{FieldRule, strip_non_digits},
};

pub const WEB_STORE_TYPE: &str = "Web Portal";
pub const WEB_STORE_LOCATION: &str = "online";
pub const WEB_STORE_COORDINATE: &str = "0.0";

const CONTINENT_TYPOS: &[(&str, &str)] = &[("eeEurope", "Europe"), ("eeAmerica", "America")];

pub fn clean_stores(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::Store, records)
        .stage("fill web store placeholders", |set| {
            fill_web_store_placeholders(set)?;
            Ok(Vec::new())
        })?
        .stage("drop duplicate coordinate column", |set| {
            set.drop_columns(&["lat"]);
            Ok(Vec::new())
        })?
        .stage("validate latitude", |set| {
            Ok(filter_column(set, "latitude", RejectPolicy::DropRow, |v| {
                FieldRule::Decimal.check(v.trim())
            })?)
        })?
        .stage("normalize staff numbers", |set| {
            set.map_column("staff_numbers", |cell| {
                let digits = cell
                    .map(|value| strip_non_digits(&value.as_text()))
                    .unwrap_or_default();
                Some(Value::Integer(digits.parse().unwrap_or(0)))
            })?;
            set.set_column_type("staff_numbers", ColumnType::Integer)?;
            Ok(Vec::new())
        })?
        .stage("correct continent typos", |set| {
            for (typo, fixed) in CONTINENT_TYPOS {
                replace_literal(set, "continent", typo, fixed)?;
            }
            Ok(Vec::new())
        })?
        .stage("validate locality", |set| Ok(retain_valid_localities(set)?))?
        .stage("canonicalize opening date", |set| {
            Ok(filter_column(set, "opening_date", RejectPolicy::DropRow, canonicalize_date)?)
        })?
        .finish())
}

pub fn is_web_store(row: &[Option<Value>], store_type: usize) -> bool {
    cell_text(&row[store_type]).is_some_and(|text| text == WEB_STORE_TYPE)
}

/// The web store has no physical location; give it values that survive the
/// locality and coordinate filters.
fn fill_web_store_placeholders(set: &mut RecordSet) -> Result<(), RecordSetError> {
    let store_type = set.require_column("store_type")?;
    let placeholders = [
        ("address", WEB_STORE_LOCATION),
        ("locality", WEB_STORE_LOCATION),
        ("longitude", WEB_STORE_COORDINATE),
        ("latitude", WEB_STORE_COORDINATE),
    ]
    .into_iter()
    .map(|(column, value)| set.require_column(column).map(|idx| (idx, value)))
    .collect::<Result<Vec<_>, _>>()?;
    set.update_rows(|row| {
        if !is_web_store(row, store_type) {
            return;
        }
        for (idx, value) in &placeholders {
            if is_null_like(&row[*idx]) {
                row[*idx] = Some(Value::text(*value));
            }
        }
    });
    Ok(())
}

fn retain_valid_localities(set: &mut RecordSet) -> Result<Vec<String>, RecordSetError> {
    let store_type = set.require_column("store_type")?;
    let locality = set.require_column("locality")?;
    let removed = set.retain_rows(|row| {
        is_web_store(row, store_type)
            || cell_text(&row[locality]).is_some_and(|text| FieldRule::Place.accepts(&text))
    });
    Ok(removed
        .iter()
        .map(|row| cell_text(&row[locality]).unwrap_or_default().into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &[
        "address",
        "longitude",
        "lat",
        "latitude",
        "locality",
        "store_code",
        "staff_numbers",
        "opening_date",
        "store_type",
        "country_code",
        "continent",
    ];

    fn raw() -> RecordSet {
        RecordSet::from_text_rows(
            HEADERS,
            vec![
                vec![
                    Some("N/A"), Some("N/A"), None, Some("N/A"), Some("N/A"), Some("WEB-1388012W"),
                    Some("325"), Some("2010-06-12"), Some("Web Portal"), Some("GB"), Some("Europe"),
                ],
                vec![
                    Some("Flat 72W, Sally isle"), Some("51.62907"), None, Some("-0.1234"),
                    Some("High Wycombe"), Some("HI-9B97EE4E"), Some("3n4"), Some("1996-10-25"),
                    Some("Local"), Some("GB"), Some("eeEurope"),
                ],
                vec![
                    Some("Heckerstr. 4/5"), Some("13.4"), None, Some("NULL"), Some("Berlin"),
                    Some("BE-1B2E3C4D"), Some("12"), Some("2005-02-03"), Some("Local"), Some("DE"),
                    Some("Europe"),
                ],
                vec![
                    Some("Somewhere 9"), Some("10.1"), None, Some("41.3"), Some("13KJZ890JH"),
                    Some("XX-00000000"), Some("15"), Some("2001-01-01"), Some("Outlet"), Some("US"),
                    Some("America"),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn web_store_survives_every_filter() {
        let outcome = clean_stores(raw()).unwrap();
        let stores = &outcome.records;
        assert!(!stores.has_column("lat"));
        assert_eq!(stores.len(), 2);
        assert_eq!(stores.get(0, "store_code"), Some(&Value::text("WEB-1388012W")));
        assert_eq!(stores.get(0, "locality"), Some(&Value::text("online")));
        assert_eq!(stores.get(0, "latitude"), Some(&Value::text("0.0")));
    }

    #[test]
    fn staff_numbers_and_continents_are_repaired() {
        let outcome = clean_stores(raw()).unwrap();
        let stores = &outcome.records;
        assert_eq!(stores.get(1, "staff_numbers"), Some(&Value::Integer(34)));
        assert_eq!(stores.get(1, "continent"), Some(&Value::text("Europe")));
        assert_eq!(stores.column_type("staff_numbers"), Some(ColumnType::Integer));
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let once = clean_stores(raw()).unwrap().records;
        let twice = clean_stores(once.clone()).unwrap().records;
        assert_eq!(once, twice);
    }
}
