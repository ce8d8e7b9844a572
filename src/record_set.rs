//! In-memory tabular record sets.
//!
//! A [`RecordSet`] is an ordered list of uniquely named, typed columns plus
//! row-major cells. Nulls are `None`; sentinel strings such as `"NULL"` are left
//! untouched here and handled by the cleaners. Every mutating helper keeps the
//! row width equal to the column count.

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    data::{Value, cell_text},
    schema::{ColumnMeta, ColumnType},
};

pub type Row = Vec<Option<Value>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordSetError {
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("Column '{0}' not found")]
    MissingColumn(String),
    #[error("Row {row} has {found} field(s) but {expected} column(s) are defined")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
}

impl RecordSet {
    pub fn new(columns: Vec<ColumnMeta>) -> Result<Self, RecordSetError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(RecordSetError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn with_rows(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Result<Self, RecordSetError> {
        let mut set = Self::new(columns)?;
        for row in rows {
            set.push_row(row)?;
        }
        Ok(set)
    }

    /// Builds an all-text record set, the shape every extractor produces.
    pub fn from_text_rows<H, S>(headers: &[H], rows: Vec<Vec<Option<S>>>) -> Result<Self, RecordSetError>
    where
        H: AsRef<str>,
        S: Into<String>,
    {
        let columns = headers
            .iter()
            .map(|header| ColumnMeta::text(header.as_ref()))
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.map(|value| Value::String(value.into())))
                    .collect()
            })
            .collect();
        Self::with_rows(columns, rows)
    }

    pub fn push_row(&mut self, row: Row) -> Result<(), RecordSetError> {
        if row.len() != self.columns.len() {
            return Err(RecordSetError::RowWidth {
                row: self.rows.len(),
                found: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, RecordSetError> {
        self.column_index(name)
            .ok_or_else(|| RecordSetError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column_index(name).map(|idx| self.columns[idx].datatype)
    }

    pub fn set_column_type(&mut self, name: &str, datatype: ColumnType) -> Result<(), RecordSetError> {
        let idx = self.require_column(name)?;
        self.columns[idx].datatype = datatype;
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<Option<&Value>>, RecordSetError> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_ref()).collect())
    }

    /// Keeps rows for which `keep` returns true and hands back the removed ones.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> Vec<Row>
    where
        F: FnMut(&Row) -> bool,
    {
        let (kept, removed): (Vec<Row>, Vec<Row>) =
            std::mem::take(&mut self.rows).into_iter().partition(|row| keep(row));
        self.rows = kept;
        removed
    }

    /// Removes the named columns that exist and returns the names actually dropped.
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        let mut dropped = Vec::new();
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
            dropped.push((*name).to_string());
        }
        dropped
    }

    /// Appends a column filled with `fill`; returns `false` when it already exists.
    pub fn add_column(&mut self, meta: ColumnMeta, fill: Option<Value>) -> bool {
        if self.has_column(&meta.name) {
            return false;
        }
        self.columns.push(meta);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        true
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<(), RecordSetError>
    where
        F: FnMut(Option<Value>) -> Option<Value>,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            let cell = row[idx].take();
            row[idx] = f(cell);
        }
        Ok(())
    }

    /// Visits every row as a fixed-width slice.
    pub fn update_rows<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut [Option<Value>]),
    {
        for row in &mut self.rows {
            f(row.as_mut_slice());
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), RecordSetError> {
        let idx = self.require_column(from)?;
        if from != to && self.has_column(to) {
            return Err(RecordSetError::DuplicateColumn(to.to_string()));
        }
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// Sets `target` from each whole row; the column must already exist.
    pub fn derive_column<F>(&mut self, target: &str, mut f: F) -> Result<(), RecordSetError>
    where
        F: FnMut(&Row) -> Option<Value>,
    {
        let idx = self.require_column(target)?;
        for row in &mut self.rows {
            let value = f(row);
            row[idx] = value;
        }
        Ok(())
    }

    /// Drops exact duplicate rows, keeping the first occurrence; returns the count removed.
    pub fn dedup_rows(&mut self) -> usize {
        let mut seen = HashSet::new();
        let removed = self.retain_rows(|row| seen.insert(row_key(row)));
        removed.len()
    }

    /// Concatenates another record set, aligning columns by name.
    pub fn concat(mut self, other: RecordSet) -> Result<Self, RecordSetError> {
        for column in other.columns() {
            if !self.has_column(&column.name) {
                self.add_column(column.clone(), None);
            }
        }
        let positions = other
            .columns
            .iter()
            .map(|c| self.require_column(&c.name))
            .collect::<Result<Vec<_>, _>>()?;
        let width = self.columns.len();
        for source in other.rows {
            let mut row: Row = vec![None; width];
            for (value, &target) in source.into_iter().zip(&positions) {
                row[target] = value;
            }
            self.rows.push(row);
        }
        Ok(self)
    }
}

/// Null-aware textual key of a row, used for duplicate detection.
pub fn row_key(row: &Row) -> Vec<Option<String>> {
    row.iter()
        .map(|cell| cell_text(cell).map(|text| text.into_owned()))
        .collect()
}
