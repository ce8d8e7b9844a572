//! The star-schema warehouse.
//!
//! A [`Warehouse`] holds the loaded tables in memory together with a
//! [`Catalog`] of key constraints. Loading a table replaces it wholesale and
//! discards every constraint that involved it. [`Warehouse::save`] writes one
//! CSV per table plus `catalog.yaml`, which records column types, row counts,
//! content fingerprints and constraints; [`Warehouse::load`] reads it back.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
    data::cell_text,
    io_utils::{read_typed_csv, write_csv},
    record_set::RecordSet,
    schema::ColumnMeta,
};

pub const CATALOG_FILE: &str = "catalog.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub table: String,
    pub column: String,
}

impl PrimaryKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn constraint_name(&self) -> String {
        format!("{}_pk", self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKey {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }

    pub fn constraint_name(&self) -> String {
        format!("{}_{}_fk", self.table, self.column)
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.table, self.column, self.references_table, self.references_column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey(PrimaryKey),
    ForeignKey(ForeignKey),
}

impl Constraint {
    pub fn name(&self) -> String {
        match self {
            Constraint::PrimaryKey(pk) => pk.constraint_name(),
            Constraint::ForeignKey(fk) => fk.constraint_name(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub primary_keys: Vec<PrimaryKey>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Catalog {
    pub fn primary_key(&self, table: &str) -> Option<&PrimaryKey> {
        self.primary_keys.iter().find(|pk| pk.table == table)
    }

    pub fn has_primary_key(&self, table: &str, column: &str) -> bool {
        self.primary_key(table).is_some_and(|pk| pk.column == column)
    }

    pub fn foreign_key_for(&self, table: &str, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.table == table && fk.column == column)
    }

    /// Records a constraint; returns `false` when an identical one is present.
    pub fn add(&mut self, constraint: Constraint) -> bool {
        match constraint {
            Constraint::PrimaryKey(pk) => {
                if self.primary_key(&pk.table).is_some() {
                    return false;
                }
                self.primary_keys.push(pk);
            }
            Constraint::ForeignKey(fk) => {
                if self.foreign_key_for(&fk.table, &fk.column).is_some() {
                    return false;
                }
                self.foreign_keys.push(fk);
            }
        }
        true
    }

    /// Drops every constraint that `table` owns or that references it.
    pub fn forget_table(&mut self, table: &str) -> Vec<Constraint> {
        let mut dropped = Vec::new();
        self.primary_keys.retain(|pk| {
            let keep = pk.table != table;
            if !keep {
                dropped.push(Constraint::PrimaryKey(pk.clone()));
            }
            keep
        });
        self.foreign_keys.retain(|fk| {
            let keep = fk.table != table && fk.references_table != table;
            if !keep {
                dropped.push(Constraint::ForeignKey(fk.clone()));
            }
            keep
        });
        dropped
    }
}

/// Receiver of fully cleaned and cast tables.
pub trait TableSink {
    fn replace_table(&mut self, name: &str, records: RecordSet) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub file: String,
    pub rows: usize,
    pub fingerprint: String,
    pub columns: Vec<ColumnMeta>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    tables: Vec<TableEntry>,
    #[serde(flatten)]
    catalog: Catalog,
}

#[derive(Debug, Clone, Default)]
pub struct Warehouse {
    tables: BTreeMap<String, RecordSet>,
    catalog: Catalog,
}

impl Warehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn table(&self, name: &str) -> Option<&RecordSet> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut RecordSet> {
        self.tables.get_mut(name)
    }

    pub fn require_table(&self, name: &str) -> Result<&RecordSet> {
        self.table(name)
            .ok_or_else(|| anyhow!("Table '{name}' is not loaded in the warehouse"))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("Creating warehouse directory {dir:?}"))?;
        let mut manifest = CatalogFile {
            tables: Vec::with_capacity(self.tables.len()),
            catalog: self.catalog.clone(),
        };
        for (name, records) in &self.tables {
            let file = format!("{name}.csv");
            write_csv(Some(dir.join(&file).as_path()), records)
                .with_context(|| format!("Writing table '{name}'"))?;
            manifest.tables.push(TableEntry {
                name: name.clone(),
                file,
                rows: records.len(),
                fingerprint: fingerprint(records),
                columns: records.columns().to_vec(),
            });
        }
        let path = dir.join(CATALOG_FILE);
        let file = File::create(&path).with_context(|| format!("Creating catalog file {path:?}"))?;
        serde_yaml::to_writer(file, &manifest).context("Writing catalog YAML")?;
        info!(
            "Saved {} table(s) and {} constraint(s) to {dir:?}",
            manifest.tables.len(),
            manifest.catalog.primary_keys.len() + manifest.catalog.foreign_keys.len()
        );
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CATALOG_FILE);
        let file = File::open(&path).with_context(|| format!("Opening catalog file {path:?}"))?;
        let manifest: CatalogFile =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing catalog YAML")?;
        let mut tables = BTreeMap::new();
        for entry in manifest.tables {
            let records = read_typed_csv(&dir.join(&entry.file), &entry.columns)
                .with_context(|| format!("Loading table '{}'", entry.name))?;
            if fingerprint(&records) != entry.fingerprint {
                debug!("Table '{}' changed on disk since it was saved", entry.name);
            }
            tables.insert(entry.name, records);
        }
        info!("Loaded {} table(s) from {dir:?}", tables.len());
        Ok(Self {
            tables,
            catalog: manifest.catalog,
        })
    }
}

impl TableSink for Warehouse {
    fn replace_table(&mut self, name: &str, records: RecordSet) -> Result<()> {
        for constraint in self.catalog.forget_table(name) {
            debug!("Dropped constraint {} with table '{name}'", constraint.name());
        }
        info!(
            "Replacing table '{name}' with {} row(s) across {} column(s)",
            records.len(),
            records.columns().len()
        );
        self.tables.insert(name.to_string(), records);
        Ok(())
    }
}

/// Content hash of a table's columns, types and cells.
pub fn fingerprint(records: &RecordSet) -> String {
    let mut hasher = Sha256::new();
    for column in records.columns() {
        hasher.update(column.name.as_bytes());
        hasher.update(column.datatype.signature().as_bytes());
    }
    for row in records.rows() {
        for cell in row {
            match cell_text(cell) {
                Some(text) => {
                    hasher.update(b"\x01");
                    hasher.update(text.as_bytes());
                }
                None => hasher.update(b"\x00"),
            }
        }
        hasher.update(b"\n");
    }
    let hash = hasher.finalize();
    format!("{hash:x}")
}
