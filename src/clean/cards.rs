use anyhow::Result;
use chrono::{Months, NaiveDate};

use super::{CleanOutcome, Pipeline, RejectPolicy, filter_column};
use crate::{
    data::{DATE_FORMAT, Value, cell_text},
    dates::canonicalize_date,
    entity::Entity,
    record_set::RecordSet,
    schema::ColumnMeta,
    validate::{FieldRule, is_card_provider, strip_card_noise},
};

pub const EXPIRY_FULL_DATE: &str = "expiry_full_date";

pub fn clean_cards(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::Card, records)
        .stage("validate expiry date", |set| {
            let rejected = filter_column(set, "expiry_date", RejectPolicy::DropRow, |v| {
                FieldRule::Expiry.check(v.trim())
            })?;
            let expiry = set.require_column("expiry_date")?;
            set.add_column(ColumnMeta::text(EXPIRY_FULL_DATE), None);
            set.derive_column(EXPIRY_FULL_DATE, |row| {
                cell_text(&row[expiry])
                    .and_then(|text| expiry_month_end(&text))
                    .map(|date| Value::text(date.format(DATE_FORMAT).to_string()))
            })?;
            Ok(rejected)
        })?
        .stage("validate card number", |set| {
            Ok(filter_column(set, "card_number", RejectPolicy::DropRow, |v| {
                FieldRule::Digits.check(&strip_card_noise(v))
            })?)
        })?
        .stage("canonicalize payment date", |set| {
            Ok(filter_column(
                set,
                "date_payment_confirmed",
                RejectPolicy::DropRow,
                canonicalize_date,
            )?)
        })?
        .stage("validate card provider", |set| {
            Ok(filter_column(set, "card_provider", RejectPolicy::DropRow, |v| {
                is_card_provider(v).then(|| v.to_string())
            })?)
        })?
        .finish())
}

/// Last calendar day of an `MM/YY` expiry, in the 2000s.
pub fn expiry_month_end(expiry: &str) -> Option<NaiveDate> {
    let (month, year) = expiry.trim().split_once('/')?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::NULL_MARKER;

    const HEADERS: &[&str] = &[
        "card_number",
        "expiry_date",
        "card_provider",
        "date_payment_confirmed",
    ];

    #[test]
    fn expiry_month_end_handles_leap_years() {
        assert_eq!(expiry_month_end("02/24"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(expiry_month_end("12/26"), NaiveDate::from_ymd_opt(2026, 12, 31));
        assert_eq!(expiry_month_end("13/26"), None);
    }

    #[test]
    fn cleans_noise_and_rejects_unknown_providers() {
        let raw = RecordSet::from_text_rows(
            HEADERS,
            vec![
                vec![Some("??4971858637664481"), Some("09/26"), Some("VISA 16 digit"), Some("2015-11-25")],
                vec![Some("3554954842403828"), Some("NB71VBAHJE"), Some("JCB 16 digit"), Some("2001-06-18")],
                vec![Some("213174667750869"), Some("04/25"), Some("NULL"), Some("2002-10-10")],
                vec![Some("XGZBYBYGUW"), Some("10/23"), Some("Mastercard"), Some("2007-10-22")],
                vec![Some("4654492346226715"), Some("03/29"), Some("Maestro"), Some("December 2021 17")],
            ],
        )
        .unwrap();
        let outcome = clean_cards(raw).unwrap();
        let cards = &outcome.records;
        assert_eq!(cards.len(), 2);
        assert_eq!(cards.get(0, "card_number"), Some(&Value::text("4971858637664481")));
        assert_eq!(cards.get(0, EXPIRY_FULL_DATE), Some(&Value::text("2026-09-30")));
        assert_eq!(
            cards.get(1, "date_payment_confirmed"),
            Some(&Value::text("2021-12-17"))
        );
        assert_eq!(outcome.stages[0].samples, vec!["NB71VBAHJE".to_string()]);
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let raw = RecordSet::from_text_rows(
            HEADERS,
            vec![vec![Some("4971858637664481"), Some("09/26"), Some("Discover"), Some("2015-11-25")]],
        )
        .unwrap();
        let once = clean_cards(raw).unwrap().records;
        let twice = clean_cards(once.clone()).unwrap().records;
        assert_eq!(once, twice);
    }

    #[test]
    fn rows_dropped_for_null_cells_are_reported() {
        let raw = RecordSet::from_text_rows(
            HEADERS,
            vec![
                vec![Some("4971858637664481"), Some("09/26"), Some("VISA 16 digit"), Some("2015-11-25")],
                vec![None, Some("10/23"), Some("Mastercard"), Some("2007-10-22")],
                vec![Some("3554954842403828"), None, Some("JCB 16 digit"), Some("2001-06-18")],
            ],
        )
        .unwrap();
        let outcome = clean_cards(raw).unwrap();
        assert_eq!(outcome.records.len(), 1);
        for stage in &outcome.stages {
            assert_eq!(stage.rows_removed(), stage.rejected, "{}", stage.name);
        }
        let reported: usize = outcome.stages.iter().map(|stage| stage.rejected).sum();
        assert_eq!(outcome.rows_removed(), reported);
        assert_eq!(outcome.stages[0].samples, vec![NULL_MARKER.to_string()]);
    }
}
