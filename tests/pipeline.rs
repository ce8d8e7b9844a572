mod common;

use common::{TestWorkspace, source_dir};
use retail_warehouse::{
    config::{PipelineConfig, SourceSpec},
    data::Value,
    enforce::{PrimaryKeyOutcome, count_orphans, enforce_star_schema, star_schema_constraints},
    entity::Entity,
    extract::{Extractor, LocalExtractor},
    pipeline::{extract_source, run},
    queries::{Report, run_report},
    schema::ColumnType,
    warehouse::{CATALOG_FILE, Warehouse},
};

fn config(workspace: &TestWorkspace) -> PipelineConfig {
    PipelineConfig::load(&workspace.write_config()).expect("load config")
}

#[test]
fn document_pages_are_concatenated_in_name_order() {
    let extractor = LocalExtractor::new(source_dir());
    let cards = extractor.fetch_document_tables("card_details").expect("cards");
    assert_eq!(cards.len(), 5);
    assert_eq!(cards.get(0, "card_number"), Some(&Value::text("30060773296197")));
}

#[test]
fn paginated_source_records_missing_items_as_skipped() {
    let extractor = LocalExtractor::new(source_dir());
    let source = SourceSpec::Paginated {
        endpoint: "store_details".into(),
        count_endpoint: "number_stores".into(),
    };
    let (stores, skipped) = extract_source(&extractor, &source).expect("stores");
    assert_eq!(stores.len(), 3);
    assert_eq!(skipped, 1);
}

#[test]
fn object_uris_resolve_under_the_source_directory() {
    let extractor = LocalExtractor::new(source_dir());
    let dates = extractor
        .fetch_object("https://data-handling-public.s3.eu-west-1.amazonaws.com/date_details.json")
        .expect("dates");
    assert_eq!(dates.len(), 4);
    assert!(extractor.fetch_object("s3://data-handling-public/missing.csv").is_err());
}

#[test]
fn full_run_loads_a_consistent_star_schema() {
    let workspace = TestWorkspace::new();
    let config = config(&workspace);
    let summary = run(&config).expect("pipeline run");

    let loaded = |entity| summary.entity(entity).map(|run| run.rows_loaded);
    assert_eq!(loaded(Entity::User), Some(2));
    assert_eq!(loaded(Entity::Card), Some(3));
    assert_eq!(loaded(Entity::Store), Some(3));
    assert_eq!(loaded(Entity::Product), Some(3));
    assert_eq!(loaded(Entity::DateEvent), Some(3));
    assert_eq!(summary.entity(Entity::Store).map(|run| run.skipped_items), Some(1));

    let report = &summary.enforcement;
    assert!(report.keyless_tables().is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(report.primary_keys.len(), 5);
    assert_eq!(report.foreign_keys.len(), 5);
    assert_eq!(report.orphans_removed(), 1);

    assert!(config.warehouse_dir.join(CATALOG_FILE).is_file());
    let warehouse = Warehouse::load(&config.warehouse_dir).expect("load warehouse");
    assert_eq!(warehouse.table("orders_table").map(|t| t.len()), Some(3));
    let (_, foreign) = star_schema_constraints();
    for fk in &foreign {
        assert_eq!(count_orphans(&warehouse, fk), Ok(0), "{fk}");
    }
}

#[test]
fn loaded_tables_carry_storage_types() {
    let workspace = TestWorkspace::new();
    let config = config(&workspace);
    run(&config).expect("pipeline run");
    let warehouse = Warehouse::load(&config.warehouse_dir).expect("load warehouse");

    let products = warehouse.require_table("dim_products").expect("products");
    assert_eq!(products.column_type("product_price"), Some(ColumnType::Float));
    assert_eq!(products.column_type("is_removed"), Some(ColumnType::Boolean));
    assert_eq!(products.get(1, "is_removed"), Some(&Value::Boolean(true)));
    assert_eq!(products.get(0, "weight_category"), Some(&Value::text("Light")));

    let users = warehouse.require_table("dim_users").expect("users");
    assert_eq!(users.column_type("user_uuid"), Some(ColumnType::Guid));
    assert_eq!(users.column_type("country_code"), Some(ColumnType::VarChar(2)));

    let dates = warehouse.require_table("dim_date_times").expect("dates");
    assert_eq!(dates.column_type("event_timestamp"), Some(ColumnType::DateTime));
}

#[test]
fn enforcing_a_saved_warehouse_again_is_a_no_op() {
    let workspace = TestWorkspace::new();
    let config = config(&workspace);
    run(&config).expect("pipeline run");

    let mut warehouse = Warehouse::load(&config.warehouse_dir).expect("load warehouse");
    let report = enforce_star_schema(&mut warehouse).expect("enforce");
    assert!(
        report
            .primary_keys
            .iter()
            .all(|(_, outcome)| *outcome == PrimaryKeyOutcome::AlreadyPresent)
    );
    assert_eq!(report.orphans_removed(), 0);
}

#[test]
fn reports_run_over_the_loaded_warehouse() {
    let workspace = TestWorkspace::new();
    let config = config(&workspace);
    run(&config).expect("pipeline run");
    let warehouse = Warehouse::load(&config.warehouse_dir).expect("load warehouse");

    let per_country = run_report(&warehouse, Report::StoresPerCountry, "DE").expect("report");
    assert_eq!(per_country.get(0, "country_code"), Some(&Value::text("GB")));
    assert_eq!(per_country.get(0, "total_stores"), Some(&Value::Integer(2)));

    let by_month = run_report(&warehouse, Report::SalesByMonth, "DE").expect("report");
    assert_eq!(by_month.get(0, "month"), Some(&Value::text("9")));
    assert_eq!(by_month.get(0, "total_sales"), Some(&Value::Float(119.97)));
    assert_eq!(by_month.get(1, "total_sales"), Some(&Value::Float(29.0)));

    let staff = run_report(&warehouse, Report::StaffPerCountry, "DE").expect("report");
    assert_eq!(staff.get(0, "country_code"), Some(&Value::text("GB")));
    assert_eq!(staff.get(0, "total_staff"), Some(&Value::Integer(359)));
}
