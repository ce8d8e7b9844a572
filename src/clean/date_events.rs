use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::{CleanOutcome, Pipeline, RejectPolicy, filter_column};
use crate::{
    data::{DATETIME_FORMAT, Value, cell_text},
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    schema::ColumnMeta,
    validate::FieldRule,
};

pub const EVENT_TIMESTAMP: &str = "event_timestamp";

pub fn clean_date_events(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::DateEvent, records)
        .stage("validate year", |set| {
            Ok(filter_column(set, "year", RejectPolicy::DropRow, |v| {
                FieldRule::Year.check(v.trim())
            })?)
        })?
        .stage("build event timestamp", |set| Ok(derive_event_timestamps(set)?))?
        .finish())
}

fn derive_event_timestamps(set: &mut RecordSet) -> Result<Vec<String>, RecordSetError> {
    let [year, month, day, time] =
        ["year", "month", "day", "timestamp"].map(|name| set.require_column(name));
    let (year, month, day, time) = (year?, month?, day?, time?);
    set.add_column(ColumnMeta::text(EVENT_TIMESTAMP), None);
    set.derive_column(EVENT_TIMESTAMP, |row| {
        let text = |idx: usize| cell_text(&row[idx]).map(|t| t.trim().to_string());
        event_timestamp(&text(year)?, &text(month)?, &text(day)?, &text(time)?)
            .map(|ts| Value::text(ts.format(DATETIME_FORMAT).to_string()))
    })?;
    let target = set.require_column(EVENT_TIMESTAMP)?;
    let removed = set.retain_rows(|row| row[target].is_some());
    Ok(removed
        .iter()
        .map(|row| {
            [year, month, day, time]
                .map(|idx| cell_text(&row[idx]).unwrap_or_default().into_owned())
                .join(" ")
        })
        .collect())
}

/// Combines the split date parts and the time of day; `None` when they do not
/// name a real instant.
pub fn event_timestamp(year: &str, month: &str, day: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S").ok()?;
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RecordSet {
        RecordSet::from_text_rows(
            &["timestamp", "month", "year", "day", "time_period", "date_uuid"],
            vec![
                vec![Some("22:00:06"), Some("9"), Some("2012"), Some("19"), Some("Evening"), Some("3b7ca996-37f9-433f-b6d0-ce8391b615ad")],
                vec![Some("NULL"), Some("NULL"), Some("NULL"), Some("NULL"), Some("NULL"), Some("NULL")],
                vec![Some("11:04:53"), Some("2"), Some("1994"), Some("30"), Some("Morning"), Some("adc86836-6c35-49ca-bb0d-65b6507a00fa")],
                vec![Some("SXFPE40VFF"), Some("7"), Some("2001"), Some("1"), Some("Late_Hours"), Some("4a3b2c1d-0000-4000-8000-000000000000")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn impossible_dates_and_times_are_dropped() {
        let outcome = clean_date_events(raw()).unwrap();
        assert_eq!(outcome.stages[0].rows_out, 3);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records.get(0, EVENT_TIMESTAMP),
            Some(&Value::text("2012-09-19 22:00:06"))
        );
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let once = clean_date_events(raw()).unwrap().records;
        let twice = clean_date_events(once.clone()).unwrap().records;
        assert_eq!(once, twice);
    }
}
