use anyhow::Result;

use super::{CleanOutcome, Pipeline};
use crate::{entity::Entity, record_set::RecordSet};

/// Personal data and extraction artifacts that never reach the fact table.
pub const DROPPED_ORDER_COLUMNS: &[&str] = &["first_name", "last_name", "1", "level_0", "index"];

/// Orders are not filtered here; foreign key enforcement removes orphans.
pub fn clean_orders(records: RecordSet) -> Result<CleanOutcome> {
    Ok(Pipeline::new(Entity::Order, records)
        .stage("drop personal and index columns", |set| {
            Ok(set.drop_columns(DROPPED_ORDER_COLUMNS))
        })?
        .finish())
}
