use anyhow::Result;

use super::{
    CleanOutcome, Pipeline, RejectPolicy, drop_duplicate_rows, drop_null_rows, filter_column,
    replace_literal,
};
use crate::{
    data::cell_text,
    dates::canonicalize_date,
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    validate::{FieldRule, is_valid_country_pair, normalize_name},
};

const NAME_COLUMNS: &[&str] = &["first_name", "last_name"];
const DATE_COLUMNS: &[&str] = &["date_of_birth", "join_date"];

pub fn clean_users(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::User, records)
        .stage("drop null and duplicate rows", |set| {
            let mut rejected = drop_null_rows(set);
            rejected.extend(drop_duplicate_rows(set));
            Ok(rejected)
        })?
        .stage("correct country code typo", |set| {
            replace_literal(set, "country_code", "GGB", "GB")?;
            Ok(Vec::new())
        })?
        .stage("validate country code", |set| {
            Ok(filter_column(set, "country_code", RejectPolicy::DropRow, |v| {
                FieldRule::CountryCode.check(v)
            })?)
        })?
        .stage("validate country", |set| {
            let mut rejected = filter_column(set, "country", RejectPolicy::DropRow, |v| {
                FieldRule::Place.check(v)
            })?;
            rejected.extend(retain_valid_country_pairs(set)?);
            Ok(rejected)
        })?
        .stage("normalize names", |set| {
            let mut rejected = Vec::new();
            for column in NAME_COLUMNS {
                rejected.extend(filter_column(set, column, RejectPolicy::DropRow, normalize_name)?);
            }
            Ok(rejected)
        })?
        .stage("canonicalize dates", |set| {
            let mut rejected = Vec::new();
            for column in DATE_COLUMNS {
                rejected.extend(filter_column(set, column, RejectPolicy::DropRow, canonicalize_date)?);
            }
            Ok(rejected)
        })?
        .stage("drop duplicates after normalization", |set| Ok(drop_duplicate_rows(set)))?
        .finish())
}

fn retain_valid_country_pairs(set: &mut RecordSet) -> Result<Vec<String>, RecordSetError> {
    let country = set.require_column("country")?;
    let code = set.require_column("country_code")?;
    let removed = set.retain_rows(|row| {
        match (cell_text(&row[country]), cell_text(&row[code])) {
            (Some(name), Some(iso)) => is_valid_country_pair(&name, &iso),
            _ => false,
        }
    });
    Ok(removed
        .iter()
        .map(|row| {
            format!(
                "{}/{}",
                cell_text(&row[country]).unwrap_or_default(),
                cell_text(&row[code]).unwrap_or_default()
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    const HEADERS: &[&str] = &[
        "first_name",
        "last_name",
        "date_of_birth",
        "company",
        "email_address",
        "address",
        "country",
        "country_code",
        "phone_number",
        "join_date",
        "user_uuid",
    ];

    fn user(first: &str, dob: &str, country: Option<&str>, code: &str, uuid: &str) -> Vec<Option<String>> {
        vec![
            Some(first.to_string()),
            Some("Smith".to_string()),
            Some(dob.to_string()),
            Some("Acme".to_string()),
            Some("a@example.com".to_string()),
            Some("1 High Street".to_string()),
            country.map(str::to_string),
            Some(code.to_string()),
            Some("+44 20 7946 0000".to_string()),
            Some("2015-05-01".to_string()),
            Some(uuid.to_string()),
        ]
    }

    #[test]
    fn country_checks_reject_garbage_and_mismatched_pairs() {
        let raw = RecordSet::from_text_rows(
            HEADERS,
            vec![
                user("Ann", "1990-02-13", Some("Germany"), "DE", "u1"),
                user("Bob", "1990-02-13", Some("Germany"), "GB", "u2"),
                user("Cid", "1990-02-13", Some("I7JM1EEA4M"), "DE", "u3"),
            ],
        )
        .unwrap();
        let outcome = clean_users(raw).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records.get(0, "user_uuid"), Some(&Value::text("u1")));
    }

    #[test]
    fn names_and_dates_are_normalized() {
        let raw = RecordSet::from_text_rows(
            HEADERS,
            vec![
                user("  Renée ", "Feb 13 1990", Some("United States"), "US", "u1"),
                user("Eve", "not-a-date", Some("United States"), "US", "u2"),
            ],
        )
        .unwrap();
        let outcome = clean_users(raw).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records.get(0, "first_name"), Some(&Value::text("renee")));
        assert_eq!(outcome.records.get(0, "last_name"), Some(&Value::text("smith")));
        assert_eq!(
            outcome.records.get(0, "date_of_birth"),
            Some(&Value::text("1990-02-13"))
        );
    }

    #[test]
    fn missing_column_fails_with_stage_context() {
        let raw = RecordSet::from_text_rows(&["first_name"], vec![vec![Some("Ann")]]).unwrap();
        let err = clean_users(raw).unwrap_err();
        assert!(format!("{err:#}").contains("country_code"));
    }
}
