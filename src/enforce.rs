//! Primary and foreign key enforcement over a [`Warehouse`].
//!
//! Keys are compared by the canonical text of their cells, so a `uuid` key
//! and a `varchar` reference holding the same value match. Constraints are
//! only recorded once the data satisfies them: nulls and orphaned rows are
//! deleted first, and a primary key column with duplicates is left keyless.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    data::cell_text,
    entity::Entity,
    record_set::RecordSet,
    warehouse::{Constraint, ForeignKey, PrimaryKey, Warehouse},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnforceError {
    #[error("Table '{0}' is not loaded in the warehouse")]
    MissingTable(String),
    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },
    #[error("Table '{table}' has no primary key on '{column}' to reference")]
    MissingPrimaryKey { table: String, column: String },
    #[error("Column '{table}.{column}' already references '{references}'")]
    ConflictingForeignKey {
        table: String,
        column: String,
        references: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKeyOutcome {
    AlreadyPresent,
    Applied { nulls_removed: usize },
    DuplicatesFound { duplicates: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKeyOutcome {
    AlreadyPresent,
    Applied {
        nulls_removed: usize,
        orphans_removed: usize,
        orphan_values: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforcementReport {
    pub primary_keys: Vec<(PrimaryKey, PrimaryKeyOutcome)>,
    pub foreign_keys: Vec<(ForeignKey, ForeignKeyOutcome)>,
    /// Foreign keys not attempted because their referenced table stayed keyless.
    pub skipped: Vec<(ForeignKey, EnforceError)>,
}

impl EnforcementReport {
    pub fn keyless_tables(&self) -> Vec<&str> {
        self.primary_keys
            .iter()
            .filter(|(_, outcome)| matches!(outcome, PrimaryKeyOutcome::DuplicatesFound { .. }))
            .map(|(pk, _)| pk.table.as_str())
            .collect()
    }

    pub fn orphans_removed(&self) -> usize {
        self.foreign_keys
            .iter()
            .map(|(_, outcome)| match outcome {
                ForeignKeyOutcome::Applied { orphans_removed, .. } => *orphans_removed,
                ForeignKeyOutcome::AlreadyPresent => 0,
            })
            .sum()
    }
}

fn locate<'a>(
    warehouse: &'a mut Warehouse,
    table: &str,
    column: &str,
) -> Result<(&'a mut RecordSet, usize), EnforceError> {
    let records = warehouse
        .table_mut(table)
        .ok_or_else(|| EnforceError::MissingTable(table.to_string()))?;
    let idx = records
        .column_index(column)
        .ok_or_else(|| EnforceError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;
    Ok((records, idx))
}

fn remove_null_keys(records: &mut RecordSet, idx: usize) -> usize {
    records.retain_rows(|row| row[idx].is_some()).len()
}

/// Establishes `table.column` as the table's primary key.
pub fn add_primary_key(
    warehouse: &mut Warehouse,
    table: &str,
    column: &str,
) -> Result<PrimaryKeyOutcome, EnforceError> {
    if let Some(existing) = warehouse.catalog().primary_key(table) {
        debug!("{} already present on '{}'", existing.constraint_name(), existing.column);
        return Ok(PrimaryKeyOutcome::AlreadyPresent);
    }
    let (records, idx) = locate(warehouse, table, column)?;
    let nulls_removed = remove_null_keys(records, idx);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in records.rows() {
        if let Some(key) = cell_text(&row[idx]) {
            *counts.entry(key.into_owned()).or_default() += 1;
        }
    }
    let duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect::<BTreeSet<_>>();
    if !duplicates.is_empty() {
        warn!(
            "Not adding primary key to '{table}': {} duplicate value(s) in '{column}': {:?}",
            duplicates.len(),
            duplicates
        );
        return Ok(PrimaryKeyOutcome::DuplicatesFound {
            duplicates: duplicates.into_iter().collect(),
        });
    }

    let pk = PrimaryKey::new(table, column);
    info!(
        "Added {} on {table}.{column} after removing {nulls_removed} null key row(s)",
        pk.constraint_name()
    );
    warehouse.catalog_mut().add(Constraint::PrimaryKey(pk));
    Ok(PrimaryKeyOutcome::Applied { nulls_removed })
}

/// Deletes orphaned and null-keyed rows from the referencing table, then
/// records the foreign key.
pub fn add_foreign_key(
    warehouse: &mut Warehouse,
    fk: ForeignKey,
) -> Result<ForeignKeyOutcome, EnforceError> {
    if let Some(existing) = warehouse.catalog().foreign_key_for(&fk.table, &fk.column) {
        if *existing == fk {
            debug!("{} already present", fk.constraint_name());
            return Ok(ForeignKeyOutcome::AlreadyPresent);
        }
        return Err(EnforceError::ConflictingForeignKey {
            table: fk.table.clone(),
            column: fk.column.clone(),
            references: existing.references_table.clone(),
        });
    }
    if !warehouse
        .catalog()
        .has_primary_key(&fk.references_table, &fk.references_column)
    {
        return Err(EnforceError::MissingPrimaryKey {
            table: fk.references_table.clone(),
            column: fk.references_column.clone(),
        });
    }

    let keys = referenced_keys(warehouse, &fk.references_table, &fk.references_column)?;
    let (records, idx) = locate(warehouse, &fk.table, &fk.column)?;
    let nulls_removed = remove_null_keys(records, idx);
    let orphans = records.retain_rows(|row| {
        cell_text(&row[idx]).is_some_and(|value| keys.contains(&*value))
    });
    let orphan_values = orphans
        .iter()
        .filter_map(|row| cell_text(&row[idx]).map(|v| v.into_owned()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    if !orphans.is_empty() {
        debug!("Orphaned {} values removed: {:?}", fk, orphan_values);
    }
    info!(
        "Added {} ({fk}) after removing {} orphan and {nulls_removed} null row(s)",
        fk.constraint_name(),
        orphans.len()
    );
    let outcome = ForeignKeyOutcome::Applied {
        nulls_removed,
        orphans_removed: orphans.len(),
        orphan_values,
    };
    warehouse.catalog_mut().add(Constraint::ForeignKey(fk));
    Ok(outcome)
}

fn referenced_keys(
    warehouse: &Warehouse,
    table: &str,
    column: &str,
) -> Result<HashSet<String>, EnforceError> {
    let records = warehouse
        .table(table)
        .ok_or_else(|| EnforceError::MissingTable(table.to_string()))?;
    let idx = records
        .column_index(column)
        .ok_or_else(|| EnforceError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;
    Ok(records
        .rows()
        .iter()
        .filter_map(|row| cell_text(&row[idx]).map(|v| v.into_owned()))
        .collect())
}

/// Rows of the referencing table whose key is missing from the referenced table.
pub fn count_orphans(warehouse: &Warehouse, fk: &ForeignKey) -> Result<usize, EnforceError> {
    let keys = referenced_keys(warehouse, &fk.references_table, &fk.references_column)?;
    let records = warehouse
        .table(&fk.table)
        .ok_or_else(|| EnforceError::MissingTable(fk.table.clone()))?;
    let idx = records
        .column_index(&fk.column)
        .ok_or_else(|| EnforceError::MissingColumn {
            table: fk.table.clone(),
            column: fk.column.clone(),
        })?;
    Ok(records
        .rows()
        .iter()
        .filter(|row| cell_text(&row[idx]).is_some_and(|v| !keys.contains(&*v)))
        .count())
}

/// The five dimension keys and the fact table references to them.
pub fn star_schema_constraints() -> (Vec<PrimaryKey>, Vec<ForeignKey>) {
    let fact = Entity::Order.table_name();
    let mut primary = Vec::new();
    let mut foreign = Vec::new();
    for entity in Entity::dimensions() {
        let Some(column) = entity.primary_key() else {
            continue;
        };
        primary.push(PrimaryKey::new(entity.table_name(), column));
        foreign.push(ForeignKey::new(fact, column, entity.table_name(), column));
    }
    (primary, foreign)
}

/// Applies every dimension primary key, then every fact table foreign key.
pub fn enforce_star_schema(warehouse: &mut Warehouse) -> Result<EnforcementReport, EnforceError> {
    let (primary, foreign) = star_schema_constraints();
    let mut report = EnforcementReport::default();
    for pk in primary {
        let outcome = add_primary_key(warehouse, &pk.table, &pk.column)?;
        report.primary_keys.push((pk, outcome));
    }
    for fk in foreign {
        match add_foreign_key(warehouse, fk.clone()) {
            Ok(outcome) => report.foreign_keys.push((fk, outcome)),
            Err(err @ EnforceError::MissingPrimaryKey { .. }) => {
                warn!("Skipping {}: {err}", fk.constraint_name());
                report.skipped.push((fk, err));
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        "Star schema enforced: {} primary key(s), {} foreign key(s), {} orphan row(s) removed",
        report.primary_keys.len(),
        report.foreign_keys.len(),
        report.orphans_removed()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::TableSink;

    fn table(headers: &[&str], rows: Vec<Vec<Option<&str>>>) -> RecordSet {
        RecordSet::from_text_rows(headers, rows).unwrap()
    }

    fn warehouse_with_users(ids: &[Option<&str>]) -> Warehouse {
        let mut warehouse = Warehouse::new();
        warehouse
            .replace_table(
                "dim_users",
                table(&["user_uuid"], ids.iter().map(|id| vec![*id]).collect()),
            )
            .unwrap();
        warehouse
    }

    #[test]
    fn duplicate_keys_leave_the_table_keyless() {
        let mut warehouse = warehouse_with_users(&[Some("a"), Some("b"), Some("a")]);
        let outcome = add_primary_key(&mut warehouse, "dim_users", "user_uuid").unwrap();
        assert_eq!(
            outcome,
            PrimaryKeyOutcome::DuplicatesFound {
                duplicates: vec!["a".into()]
            }
        );
        assert!(warehouse.catalog().primary_key("dim_users").is_none());
    }

    #[test]
    fn primary_key_applies_after_deduplication() {
        let mut warehouse = warehouse_with_users(&[Some("a"), Some("b"), None]);
        let outcome = add_primary_key(&mut warehouse, "dim_users", "user_uuid").unwrap();
        assert_eq!(outcome, PrimaryKeyOutcome::Applied { nulls_removed: 1 });
        assert!(warehouse.catalog().has_primary_key("dim_users", "user_uuid"));
        assert_eq!(
            add_primary_key(&mut warehouse, "dim_users", "user_uuid").unwrap(),
            PrimaryKeyOutcome::AlreadyPresent
        );
    }

    #[test]
    fn unknown_key_column_is_an_error() {
        let mut warehouse = warehouse_with_users(&[Some("a")]);
        assert_eq!(
            add_primary_key(&mut warehouse, "dim_users", "nope"),
            Err(EnforceError::MissingColumn {
                table: "dim_users".into(),
                column: "nope".into()
            })
        );
    }

    #[test]
    fn foreign_key_removes_orphans_before_applying() {
        let mut warehouse = warehouse_with_users(&[Some("a"), Some("b")]);
        warehouse
            .replace_table(
                "orders_table",
                table(
                    &["user_uuid", "product_quantity"],
                    vec![
                        vec![Some("a"), Some("1")],
                        vec![Some("z"), Some("2")],
                        vec![None, Some("3")],
                        vec![Some("b"), Some("4")],
                    ],
                ),
            )
            .unwrap();
        let fk = ForeignKey::new("orders_table", "user_uuid", "dim_users", "user_uuid");

        assert!(matches!(
            add_foreign_key(&mut warehouse, fk.clone()),
            Err(EnforceError::MissingPrimaryKey { .. })
        ));
        add_primary_key(&mut warehouse, "dim_users", "user_uuid").unwrap();
        let outcome = add_foreign_key(&mut warehouse, fk.clone()).unwrap();
        assert_eq!(
            outcome,
            ForeignKeyOutcome::Applied {
                nulls_removed: 1,
                orphans_removed: 1,
                orphan_values: vec!["z".into()]
            }
        );
        assert_eq!(count_orphans(&warehouse, &fk).unwrap(), 0);
        assert_eq!(warehouse.table("orders_table").unwrap().len(), 2);
        assert_eq!(
            add_foreign_key(&mut warehouse, fk).unwrap(),
            ForeignKeyOutcome::AlreadyPresent
        );
    }

    #[test]
    fn star_schema_references_every_dimension() {
        let (primary, foreign) = star_schema_constraints();
        assert_eq!(primary.len(), 5);
        assert_eq!(foreign.len(), 5);
        assert!(foreign.iter().all(|fk| fk.table == "orders_table"));
        assert!(
            foreign
                .iter()
                .any(|fk| fk.constraint_name() == "orders_table_card_number_fk")
        );
    }
}
