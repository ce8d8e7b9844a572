//! Per-entity cleaning pipelines.
//!
//! A cleaner takes ownership of a raw [`RecordSet`] and threads it through a
//! fixed sequence of named stages built with [`Pipeline`]. Every stage logs
//! its before/after row counts at `info` and the values it rejected at
//! `debug`, and leaves a [`StageReport`] in the returned [`CleanOutcome`].

mod cards;
mod date_events;
mod orders;
mod products;
mod stores;
mod users;

pub use cards::{EXPIRY_FULL_DATE, clean_cards, expiry_month_end};
pub use date_events::{EVENT_TIMESTAMP, clean_date_events, event_timestamp};
pub use orders::{DROPPED_ORDER_COLUMNS, clean_orders};
pub use products::{RAW_WEIGHT, WEIGHT_IN_KG, clean_products};
pub use stores::{WEB_STORE_COORDINATE, WEB_STORE_LOCATION, WEB_STORE_TYPE, clean_stores, is_web_store};
pub use users::clean_users;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    data::{Value, cell_text},
    entity::Entity,
    record_set::{RecordSet, RecordSetError},
    validate::is_sentinel_null,
};

/// Rejected values kept per stage report; the full list is only logged.
pub const MAX_REJECT_SAMPLES: usize = 20;

/// How a rejected null cell appears in stage reports.
pub const NULL_MARKER: &str = "<null>";

/// What happens to a record whose cell fails a column rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectPolicy {
    DropRow,
    NullCell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: &'static str,
    pub rows_in: usize,
    pub rows_out: usize,
    pub rejected: usize,
    pub samples: Vec<String>,
}

impl StageReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_in.saturating_sub(self.rows_out)
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub entity: Entity,
    pub records: RecordSet,
    pub stages: Vec<StageReport>,
}

impl CleanOutcome {
    pub fn rows_removed(&self) -> usize {
        self.stages.iter().map(StageReport::rows_removed).sum()
    }
}

/// Runs the cleaner registered for `entity`.
pub fn clean_entity(entity: Entity, records: RecordSet) -> Result<CleanOutcome> {
    match entity {
        Entity::User => clean_users(records),
        Entity::Card => clean_cards(records),
        Entity::Store => clean_stores(records),
        Entity::Product => clean_products(records),
        Entity::DateEvent => clean_date_events(records),
        Entity::Order => clean_orders(records),
    }
}

pub struct Pipeline {
    entity: Entity,
    records: RecordSet,
    stages: Vec<StageReport>,
}

impl Pipeline {
    pub fn new(entity: Entity, records: RecordSet) -> Self {
        info!("Cleaning {} record(s) for {entity}", records.len());
        Self {
            entity,
            records,
            stages: Vec::new(),
        }
    }

    /// Applies one stage. The closure returns the values it rejected.
    pub fn stage<F>(mut self, name: &'static str, apply: F) -> Result<Self>
    where
        F: FnOnce(&mut RecordSet) -> Result<Vec<String>>,
    {
        let rows_in = self.records.len();
        let rejected = apply(&mut self.records)
            .with_context(|| format!("{} cleaner stage '{name}'", self.entity))?;
        let rows_out = self.records.len();
        info!(
            "[{}] {name}: {rows_in} -> {rows_out} row(s), {} rejected",
            self.entity,
            rejected.len()
        );
        if !rejected.is_empty() {
            debug!("[{}] {name} rejected: {:?}", self.entity, rejected);
        }
        let count = rejected.len();
        let mut samples = rejected;
        samples.truncate(MAX_REJECT_SAMPLES);
        self.stages.push(StageReport {
            name,
            rows_in,
            rows_out,
            rejected: count,
            samples,
        });
        Ok(self)
    }

    pub fn finish(self) -> CleanOutcome {
        info!(
            "Cleaned {entity}: {} row(s) kept after {} stage(s)",
            self.records.len(),
            self.stages.len(),
            entity = self.entity
        );
        CleanOutcome {
            entity: self.entity,
            records: self.records,
            stages: self.stages,
        }
    }
}

/// Runs `accept` over every non-null cell of `column`, replacing the cell with
/// the accepted text. Rejected cells drop their row or become null per `policy`;
/// a null cell whose row is dropped is reported as [`NULL_MARKER`].
pub fn filter_column<F>(
    records: &mut RecordSet,
    column: &str,
    policy: RejectPolicy,
    mut accept: F,
) -> Result<Vec<String>, RecordSetError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    let mut keep = Vec::with_capacity(records.len());
    let keep_rejected = policy == RejectPolicy::NullCell;
    records.map_column(column, |cell| {
        let Some(value) = cell else {
            if !keep_rejected {
                rejected.push(NULL_MARKER.to_string());
            }
            keep.push(keep_rejected);
            return None;
        };
        let text = value.as_text();
        match accept(&text) {
            Some(accepted) => {
                keep.push(true);
                Some(Value::String(accepted))
            }
            None => {
                rejected.push(text.into_owned());
                keep.push(keep_rejected);
                None
            }
        }
    })?;
    if policy == RejectPolicy::DropRow {
        let mut flags = keep.into_iter();
        records.retain_rows(|_| flags.next().unwrap_or(true));
    }
    Ok(rejected)
}

/// Replaces every cell of `column` whose text equals `from`; returns the count.
pub fn replace_literal(
    records: &mut RecordSet,
    column: &str,
    from: &str,
    to: &str,
) -> Result<usize, RecordSetError> {
    let mut replaced = 0;
    records.map_column(column, |cell| match cell {
        Some(value) if value.as_text() == from => {
            replaced += 1;
            Some(Value::text(to))
        }
        other => other,
    })?;
    Ok(replaced)
}

/// Drops every row containing a null or sentinel-null cell, reporting the
/// first offending `column=value` of each removed row.
pub fn drop_null_rows(records: &mut RecordSet) -> Vec<String> {
    let headers = records.headers();
    let removed = records.retain_rows(|row| row.iter().all(|cell| !is_null_like(cell)));
    removed
        .iter()
        .map(|row| {
            row.iter()
                .position(is_null_like)
                .map(|idx| {
                    let text = cell_text(&row[idx]).unwrap_or_default();
                    let shown = if text.is_empty() { NULL_MARKER } else { text.as_ref() };
                    format!("{}={shown}", headers[idx])
                })
                .unwrap_or_default()
        })
        .collect()
}

pub fn is_null_like(cell: &Option<Value>) -> bool {
    match cell {
        None => true,
        Some(Value::String(text)) => is_sentinel_null(text),
        Some(_) => false,
    }
}

/// Drops exact duplicate rows and reports how many went.
pub fn drop_duplicate_rows(records: &mut RecordSet) -> Vec<String> {
    match records.dedup_rows() {
        0 => Vec::new(),
        count => vec![format!("{count} duplicate row(s)")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::FieldRule;

    fn codes() -> RecordSet {
        RecordSet::from_text_rows(
            &["code"],
            vec![vec![Some("GB")], vec![Some("GGB")], vec![None], vec![Some("US")]],
        )
        .unwrap()
    }

    #[test]
    fn filter_column_drop_row_removes_rejects_and_nulls() {
        let mut set = codes();
        let rejected =
            filter_column(&mut set, "code", RejectPolicy::DropRow, |v| FieldRule::CountryCode.check(v))
                .unwrap();
        assert_eq!(rejected, vec!["GGB".to_string(), NULL_MARKER.to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn filter_column_null_cell_keeps_the_row() {
        let mut set = codes();
        let rejected =
            filter_column(&mut set, "code", RejectPolicy::NullCell, |v| FieldRule::CountryCode.check(v))
                .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(set.len(), 4);
        assert_eq!(set.get(1, "code"), None);
    }

    #[test]
    fn filter_column_reports_missing_columns() {
        let mut set = codes();
        let err = filter_column(&mut set, "absent", RejectPolicy::DropRow, |v| Some(v.into()));
        assert_eq!(err, Err(RecordSetError::MissingColumn("absent".into())));
    }

    #[test]
    fn drop_null_rows_treats_sentinels_as_null() {
        let mut set = RecordSet::from_text_rows(
            &["a", "b"],
            vec![
                vec![Some("1"), Some("NULL")],
                vec![Some("2"), Some("x")],
                vec![None, Some("y")],
            ],
        )
        .unwrap();
        let rejected = drop_null_rows(&mut set);
        assert_eq!(rejected, vec!["b=NULL".to_string(), "a=<null>".to_string()]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn pipeline_records_one_report_per_stage() {
        let outcome = Pipeline::new(Entity::User, codes())
            .stage("fix typo", |set| {
                replace_literal(set, "code", "GGB", "GB")?;
                Ok(Vec::new())
            })
            .unwrap()
            .stage("drop nulls", |set| Ok(drop_null_rows(set)))
            .unwrap()
            .finish();
        assert_eq!(outcome.stages.len(), 2);
        assert_eq!(outcome.stages[1].rows_in, 4);
        assert_eq!(outcome.stages[1].rows_out, 3);
        assert_eq!(outcome.rows_removed(), 1);
        assert_eq!(outcome.records.get(1, "code"), Some(&Value::text("GB")));
    }
}
