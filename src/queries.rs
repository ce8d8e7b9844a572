//! Business reports over a loaded warehouse.
//!
//! Each report joins the fact table to its dimensions by key text and
//! returns a small typed [`RecordSet`] ready for [`crate::table::render_table`].
//! Orders whose dimension rows are missing do not contribute to sales totals.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDateTime};
use clap::ValueEnum;
use itertools::Itertools;

use crate::{
    clean::{EVENT_TIMESTAMP, WEB_STORE_LOCATION},
    data::{DATETIME_FORMAT, Value, cell_text},
    entity::Entity,
    record_set::{RecordSet, Row},
    schema::{ColumnMeta, ColumnType},
    warehouse::Warehouse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Report {
    /// Number of stores in each country
    StoresPerCountry,
    /// Localities ranked by number of stores
    StoresPerLocality,
    /// Months ranked by total sales
    SalesByMonth,
    /// Year and month pairs ranked by total sales
    SalesByYearMonth,
    /// Sales count and quantity from the web store versus physical stores
    OnlineVsOffline,
    /// Share of total sales per store type
    StoreTypeShare,
    /// Staff headcount per country
    StaffPerCountry,
    /// Sales per store type within one country
    CountryStoreTypeSales,
    /// Average time between consecutive sales, per year
    SalesSpeed,
}

pub fn run_report(warehouse: &Warehouse, report: Report, country: &str) -> Result<RecordSet> {
    match report {
        Report::StoresPerCountry => stores_per(warehouse, "country_code"),
        Report::StoresPerLocality => stores_per(warehouse, "locality"),
        Report::SalesByMonth => sales_by_period(warehouse, &["month"]),
        Report::SalesByYearMonth => sales_by_period(warehouse, &["year", "month"]),
        Report::OnlineVsOffline => online_vs_offline(warehouse),
        Report::StoreTypeShare => store_type_share(warehouse),
        Report::StaffPerCountry => staff_per_country(warehouse),
        Report::CountryStoreTypeSales => country_store_type_sales(warehouse, country),
        Report::SalesSpeed => sales_speed(warehouse),
    }
}

fn text(cell: &Option<Value>) -> String {
    cell_text(cell).map(|t| t.into_owned()).unwrap_or_default()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn column(records: &RecordSet, name: &str) -> Result<usize> {
    Ok(records.require_column(name)?)
}

/// Row position of every non-null key in `column`.
fn key_index(records: &RecordSet, name: &str) -> Result<HashMap<String, usize>> {
    let idx = column(records, name)?;
    Ok(records
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(pos, row)| cell_text(&row[idx]).map(|key| (key.into_owned(), pos)))
        .collect())
}

/// Looks up the dimension row an order points at.
struct Lookup<'a> {
    records: &'a RecordSet,
    fact_column: usize,
    index: HashMap<String, usize>,
}

impl<'a> Lookup<'a> {
    fn new(warehouse: &'a Warehouse, entity: Entity) -> Result<Self> {
        let key = entity
            .primary_key()
            .ok_or_else(|| anyhow!("{entity} has no key to join on"))?;
        let records = warehouse.require_table(entity.table_name())?;
        let orders = warehouse.require_table(Entity::Order.table_name())?;
        Ok(Self {
            records,
            fact_column: column(orders, key)?,
            index: key_index(records, key)?,
        })
    }

    fn row(&self, order: &Row) -> Option<&'a Row> {
        let key = cell_text(&order[self.fact_column])?;
        self.index.get(key.as_ref()).map(|pos| &self.records.rows()[*pos])
    }
}

/// Every order joined to its product, with `quantity * price`.
fn order_amounts(warehouse: &Warehouse) -> Result<Vec<(&Row, f64)>> {
    let orders = warehouse.require_table(Entity::Order.table_name())?;
    let products = Lookup::new(warehouse, Entity::Product)?;
    let quantity = column(orders, "product_quantity")?;
    let price = column(products.records, "product_price")?;
    Ok(orders
        .rows()
        .iter()
        .filter_map(|order| {
            let qty = order[quantity].as_ref()?.as_f64()?;
            let unit = products.row(order)?[price].as_ref()?.as_f64()?;
            Some((order, qty * unit))
        })
        .collect())
}

fn build(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Result<RecordSet> {
    Ok(RecordSet::with_rows(columns, rows)?)
}

fn stores_per(warehouse: &Warehouse, group: &str) -> Result<RecordSet> {
    let stores = warehouse.require_table(Entity::Store.table_name())?;
    let idx = column(stores, group)?;
    let counts = stores.rows().iter().map(|row| text(&row[idx])).counts();
    let rows = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(key, count)| vec![Some(Value::String(key)), Some(Value::Integer(count as i64))])
        .collect();
    build(
        vec![
            ColumnMeta::text(group),
            ColumnMeta::new("total_stores", ColumnType::Integer),
        ],
        rows,
    )
}

fn staff_per_country(warehouse: &Warehouse) -> Result<RecordSet> {
    let stores = warehouse.require_table(Entity::Store.table_name())?;
    let country = column(stores, "country_code")?;
    let staff = column(stores, "staff_numbers")?;
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for row in stores.rows() {
        let headcount = row[staff].as_ref().and_then(Value::as_i64).unwrap_or(0);
        *totals.entry(text(&row[country])).or_default() += headcount;
    }
    let rows = totals
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(key, total)| vec![Some(Value::String(key)), Some(Value::Integer(total))])
        .collect();
    build(
        vec![
            ColumnMeta::text("country_code"),
            ColumnMeta::new("total_staff", ColumnType::Integer),
        ],
        rows,
    )
}

/// Total sales grouped by date-dimension columns, highest first.
fn sales_by_period(warehouse: &Warehouse, groups: &[&str]) -> Result<RecordSet> {
    let dates = Lookup::new(warehouse, Entity::DateEvent)?;
    let positions = groups
        .iter()
        .map(|g| column(dates.records, g))
        .collect::<Result<Vec<_>>>()?;
    let mut totals: BTreeMap<Vec<String>, f64> = BTreeMap::new();
    for (order, amount) in order_amounts(warehouse)? {
        let Some(date) = dates.row(order) else {
            continue;
        };
        let key = positions.iter().map(|idx| text(&date[*idx])).collect();
        *totals.entry(key).or_default() += amount;
    }
    let rows = totals
        .into_iter()
        .sorted_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(key, total)| {
            key.into_iter()
                .map(|k| Some(Value::String(k)))
                .chain(std::iter::once(Some(Value::Float(round2(total)))))
                .collect()
        })
        .collect();
    let mut columns = groups.iter().map(|g| ColumnMeta::text(*g)).collect::<Vec<_>>();
    columns.push(ColumnMeta::new("total_sales", ColumnType::Float));
    build(columns, rows)
}

fn online_vs_offline(warehouse: &Warehouse) -> Result<RecordSet> {
    let orders = warehouse.require_table(Entity::Order.table_name())?;
    let stores = Lookup::new(warehouse, Entity::Store)?;
    let locality = column(stores.records, "locality")?;
    let quantity = column(orders, "product_quantity")?;
    let mut groups: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for order in orders.rows() {
        let Some(store) = stores.row(order) else {
            continue;
        };
        let label = if cell_text(&store[locality]).as_deref() == Some(WEB_STORE_LOCATION) {
            "Web"
        } else {
            "Offline"
        };
        let entry = groups.entry(label).or_default();
        entry.0 += 1;
        entry.1 += order[quantity].as_ref().and_then(Value::as_i64).unwrap_or(0);
    }
    let rows = groups
        .into_iter()
        .map(|(label, (sales, quantity))| {
            vec![
                Some(Value::text(label)),
                Some(Value::Integer(sales)),
                Some(Value::Integer(quantity)),
            ]
        })
        .collect();
    build(
        vec![
            ColumnMeta::text("location"),
            ColumnMeta::new("number_of_sales", ColumnType::Integer),
            ColumnMeta::new("product_quantity_count", ColumnType::Integer),
        ],
        rows,
    )
}

fn sales_per_store_type(warehouse: &Warehouse, country: Option<&str>) -> Result<BTreeMap<String, f64>> {
    let stores = Lookup::new(warehouse, Entity::Store)?;
    let store_type = column(stores.records, "store_type")?;
    let country_code = column(stores.records, "country_code")?;
    let mut totals = BTreeMap::new();
    for (order, amount) in order_amounts(warehouse)? {
        let Some(store) = stores.row(order) else {
            continue;
        };
        if let Some(wanted) = country
            && cell_text(&store[country_code]).as_deref() != Some(wanted)
        {
            continue;
        }
        *totals.entry(text(&store[store_type])).or_default() += amount;
    }
    Ok(totals)
}

fn store_type_share(warehouse: &Warehouse) -> Result<RecordSet> {
    let totals = sales_per_store_type(warehouse, None)?;
    let overall: f64 = totals.values().sum();
    let rows = totals
        .into_iter()
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .map(|(store_type, total)| {
            let share = if overall > 0.0 { total / overall * 100.0 } else { 0.0 };
            vec![
                Some(Value::String(store_type)),
                Some(Value::Float(round2(total))),
                Some(Value::Float(round2(share))),
            ]
        })
        .collect();
    build(
        vec![
            ColumnMeta::text("store_type"),
            ColumnMeta::new("total_sales", ColumnType::Float),
            ColumnMeta::new("percentage_total", ColumnType::Float),
        ],
        rows,
    )
}

fn country_store_type_sales(warehouse: &Warehouse, country: &str) -> Result<RecordSet> {
    let rows = sales_per_store_type(warehouse, Some(country))?
        .into_iter()
        .sorted_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(store_type, total)| {
            vec![
                Some(Value::text(country)),
                Some(Value::String(store_type)),
                Some(Value::Float(round2(total))),
            ]
        })
        .collect();
    build(
        vec![
            ColumnMeta::text("country_code"),
            ColumnMeta::text("store_type"),
            ColumnMeta::new("total_sales", ColumnType::Float),
        ],
        rows,
    )
}

fn timestamp(cell: &Option<Value>) -> Option<NaiveDateTime> {
    match cell.as_ref()? {
        Value::DateTime(dt) => Some(*dt),
        other => NaiveDateTime::parse_from_str(&other.as_text(), DATETIME_FORMAT).ok(),
    }
}

/// Renders whole seconds as `"H hours, M minutes, S seconds"`.
pub fn format_interval(seconds: i64) -> String {
    format!(
        "{} hours, {} minutes, {} seconds",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}

fn sales_speed(warehouse: &Warehouse) -> Result<RecordSet> {
    let dates = warehouse.require_table(Entity::DateEvent.table_name())?;
    let idx = column(dates, EVENT_TIMESTAMP)?;
    let by_year = dates
        .rows()
        .iter()
        .filter_map(|row| timestamp(&row[idx]))
        .map(|ts| (ts.year(), ts))
        .into_group_map();
    let mut averages = Vec::new();
    for (year, mut stamps) in by_year {
        stamps.sort();
        let gaps = stamps
            .iter()
            .tuple_windows()
            .map(|(a, b)| (*b - *a).num_seconds())
            .collect::<Vec<_>>();
        if gaps.is_empty() {
            continue;
        }
        averages.push((year, gaps.iter().sum::<i64>() / gaps.len() as i64));
    }
    let rows = averages
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(year, seconds)| {
            vec![
                Some(Value::Integer(i64::from(year))),
                Some(Value::String(format_interval(seconds))),
            ]
        })
        .collect();
    build(
        vec![
            ColumnMeta::new("year", ColumnType::Integer),
            ColumnMeta::text("actual_time_taken"),
        ],
        rows,
    )
}
