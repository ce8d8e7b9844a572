//! CSV and JSON I/O for record sets.
//!
//! All file access in retail-warehouse flows through this module:
//!
//! - **Readers**: CSV with headers, decoded through `encoding_rs` (UTF-8 by
//!   default), and JSON documents in either row (array of objects) or column
//!   (`{column: {row_index: value}}`) orientation.
//! - **Writers**: CSV with `QuoteStyle::Always`; nulls are written as empty fields.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{
    data::{Value, cell_text, parse_typed_value, value_from_json},
    record_set::RecordSet,
    schema::{ColumnMeta, ColumnType},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    Ok(if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    })
}

pub fn open_csv_writer(path: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a CSV file into an all-text record set. Empty fields become nulls.
pub fn read_csv(path: &Path, encoding: &'static Encoding) -> Result<RecordSet> {
    let mut reader = open_csv_reader(open_input(path)?, DEFAULT_CSV_DELIMITER);
    let headers = decode_record(reader.byte_headers()?, encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let fields = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", idx + 2))?;
        rows.push(
            fields
                .into_iter()
                .map(|field| (!field.is_empty()).then_some(field))
                .collect(),
        );
    }
    RecordSet::from_text_rows(&headers, rows).with_context(|| format!("Loading {path:?}"))
}

/// Reads a CSV file whose columns carry known storage types.
pub fn read_typed_csv(path: &Path, columns: &[ColumnMeta]) -> Result<RecordSet> {
    let text = read_csv(path, UTF_8)?;
    if text.headers() != columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>() {
        bail!(
            "Columns of {path:?} do not match the catalog: found {:?}",
            text.headers()
        );
    }
    let mut rows = Vec::with_capacity(text.len());
    for (idx, row) in text.into_rows().into_iter().enumerate() {
        let typed = row
            .iter()
            .zip(columns)
            .map(|(cell, column)| match cell_text(cell) {
                Some(raw) => parse_typed_value(&raw, &column.datatype)
                    .with_context(|| format!("Row {} column '{}'", idx + 2, column.name)),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(typed);
    }
    RecordSet::with_rows(columns.to_vec(), rows).with_context(|| format!("Loading {path:?}"))
}

pub fn write_csv(path: Option<&Path>, records: &RecordSet) -> Result<()> {
    let mut writer = open_csv_writer(path)?;
    writer.write_record(records.headers())?;
    for row in records.rows() {
        writer.write_record(
            row.iter()
                .map(|cell| cell_text(cell).unwrap_or_default().into_owned()),
        )?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

pub fn read_json(path: &Path) -> Result<RecordSet> {
    let mut body = String::new();
    open_input(path)?
        .read_to_string(&mut body)
        .with_context(|| format!("Reading {path:?}"))?;
    let document: serde_json::Value =
        serde_json::from_str(&body).with_context(|| format!("Parsing JSON from {path:?}"))?;
    record_set_from_json(&document).with_context(|| format!("Loading {path:?}"))
}

/// Converts a JSON document into a record set. Arrays of objects are rows;
/// an object of objects is column-oriented with row indices as inner keys.
pub fn record_set_from_json(document: &serde_json::Value) -> Result<RecordSet> {
    match document {
        serde_json::Value::Array(items) => records_from_objects(items.iter()),
        serde_json::Value::Object(map) if map.values().all(|v| v.is_object()) => {
            records_from_columns(map)
        }
        serde_json::Value::Object(_) => records_from_objects(std::iter::once(document)),
        other => bail!("Expected a JSON array or object, found {other}"),
    }
}

/// One record set from a sequence of JSON objects; columns appear in first-seen order.
pub fn records_from_objects<'a, I>(items: I) -> Result<RecordSet>
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let mut headers: Vec<String> = Vec::new();
    let mut objects = Vec::new();
    for item in items {
        let object = item
            .as_object()
            .ok_or_else(|| anyhow!("Expected a JSON object, found {item}"))?;
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(object);
    }
    let rows = objects
        .into_iter()
        .map(|object| {
            headers
                .iter()
                .map(|header| object.get(header).and_then(value_from_json))
                .collect()
        })
        .collect();
    let columns = headers.iter().map(|h| ColumnMeta::text(h.as_str())).collect();
    Ok(RecordSet::with_rows(columns, rows)?)
}

fn records_from_columns(map: &serde_json::Map<String, serde_json::Value>) -> Result<RecordSet> {
    let mut positions = BTreeSet::new();
    for column in map.values().filter_map(|v| v.as_object()) {
        for key in column.keys() {
            let position = key
                .parse::<u64>()
                .map_err(|_| anyhow!("Row key '{key}' is not an integer index"))?;
            positions.insert(position);
        }
    }
    let rows = positions
        .iter()
        .map(|position| {
            let key = position.to_string();
            map.values()
                .map(|column| column.get(&key).and_then(value_from_json))
                .collect()
        })
        .collect();
    let columns = map
        .keys()
        .map(|name| ColumnMeta::new(name.clone(), ColumnType::Text))
        .collect();
    Ok(RecordSet::with_rows(columns, rows)?)
}

/// Reads a CSV or JSON file, chosen by extension.
pub fn read_records(path: &Path) -> Result<RecordSet> {
    if is_json_path(path) {
        read_json(path)
    } else {
        read_csv(path, UTF_8)
    }
}

/// Renders every cell as display text, nulls as empty strings.
pub fn display_rows(records: &RecordSet) -> Vec<Vec<String>> {
    records
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                .collect()
        })
        .collect()
}
