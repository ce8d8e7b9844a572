pub mod cast;
pub mod clean;
pub mod cli;
pub mod config;
pub mod data;
pub mod dates;
pub mod enforce;
pub mod entity;
pub mod extract;
pub mod io_utils;
pub mod pipeline;
pub mod queries;
pub mod record_set;
pub mod schema;
pub mod table;
pub mod validate;
pub mod warehouse;
pub mod weight;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    data::Value,
    enforce::{ForeignKeyOutcome, PrimaryKeyOutcome, enforce_star_schema},
    io_utils::{is_json_path, read_csv, read_json, resolve_encoding, write_csv},
    record_set::RecordSet,
    schema::{ColumnMeta, ColumnType},
    warehouse::Warehouse,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("retail_warehouse", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Clean(args) => handle_clean(&args),
        Commands::Init(args) => handle_init(&args),
        Commands::Run(args) => handle_run(&args),
        Commands::Enforce(args) => handle_enforce(&args),
        Commands::Query(args) => handle_query(&args),
    }
}

fn handle_clean(args: &cli::CleanArgs) -> Result<()> {
    info!("Cleaning {:?} as {} data", args.input, args.entity);
    let raw = if is_json_path(&args.input) {
        read_json(&args.input)?
    } else {
        let encoding = resolve_encoding(args.input_encoding.as_deref())?;
        read_csv(&args.input, encoding)?
    };
    let cleaned = clean::clean_entity(args.entity, raw)
        .with_context(|| format!("Cleaning {:?}", args.input))?;
    let stages = stage_summary(&cleaned.stages)?;
    let removed = cleaned.rows_removed();
    let records = if args.cast {
        cast::cast_entity(args.entity, cleaned.records)?.records
    } else {
        cleaned.records
    };
    write_csv(args.output.as_deref(), &records)?;
    if args.summary {
        eprint!("{}", table::render_records(&stages));
    }
    info!(
        "{} row(s) written for {} after removing {removed}",
        records.len(),
        args.entity
    );
    Ok(())
}

fn stage_summary(stages: &[clean::StageReport]) -> Result<RecordSet> {
    let rows = stages
        .iter()
        .map(|stage| {
            vec![
                Some(Value::text(stage.name)),
                Some(Value::Integer(stage.rows_in as i64)),
                Some(Value::Integer(stage.rows_out as i64)),
                Some(Value::Integer(stage.rejected as i64)),
            ]
        })
        .collect();
    Ok(RecordSet::with_rows(
        vec![
            ColumnMeta::text("stage"),
            ColumnMeta::new("rows_in", ColumnType::Integer),
            ColumnMeta::new("rows_out", ColumnType::Integer),
            ColumnMeta::new("rejected", ColumnType::Integer),
        ],
        rows,
    )?)
}

fn handle_init(args: &cli::InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    PipelineConfig::default().save(&args.output)?;
    info!("Default pipeline configuration written to {:?}", args.output);
    Ok(())
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(dir) = &args.warehouse {
        config.warehouse_dir = dir.clone();
    }
    debug!("Pipeline configuration: {config:?}");
    let summary = pipeline::run(&config)?;
    for run in &summary.entities {
        if run.skipped_items > 0 {
            warn!(
                "{}: {} paginated item(s) were skipped after retries",
                run.entity, run.skipped_items
            );
        }
    }
    let rows = summary
        .entities
        .iter()
        .map(|run| {
            vec![
                Some(Value::text(run.entity.table_name())),
                Some(Value::Integer(run.rows_extracted as i64)),
                Some(Value::Integer(run.rows_loaded as i64)),
            ]
        })
        .collect();
    let overview = RecordSet::with_rows(
        vec![
            ColumnMeta::text("table"),
            ColumnMeta::new("extracted", ColumnType::Integer),
            ColumnMeta::new("loaded", ColumnType::Integer),
        ],
        rows,
    )?;
    print!("{}", table::render_records(&overview));
    print_enforcement(&summary.enforcement);
    Ok(())
}

fn handle_enforce(args: &cli::EnforceArgs) -> Result<()> {
    let mut warehouse = Warehouse::load(&args.warehouse)?;
    let report = enforce_star_schema(&mut warehouse)
        .with_context(|| format!("Enforcing keys in {:?}", args.warehouse))?;
    warehouse.save(&args.warehouse)?;
    print_enforcement(&report);
    Ok(())
}

fn print_enforcement(report: &enforce::EnforcementReport) {
    for (pk, outcome) in &report.primary_keys {
        match outcome {
            PrimaryKeyOutcome::AlreadyPresent => {
                println!("{}: already present", pk.constraint_name())
            }
            PrimaryKeyOutcome::Applied { nulls_removed } => println!(
                "{}: applied ({nulls_removed} null key row(s) removed)",
                pk.constraint_name()
            ),
            PrimaryKeyOutcome::DuplicatesFound { duplicates } => println!(
                "{}: NOT applied, {} duplicate key value(s)",
                pk.constraint_name(),
                duplicates.len()
            ),
        }
    }
    for (fk, outcome) in &report.foreign_keys {
        match outcome {
            ForeignKeyOutcome::AlreadyPresent => {
                println!("{}: already present", fk.constraint_name())
            }
            ForeignKeyOutcome::Applied {
                orphans_removed, ..
            } => println!(
                "{}: applied ({orphans_removed} orphan row(s) removed)",
                fk.constraint_name()
            ),
        }
    }
    for (fk, err) in &report.skipped {
        println!("{}: skipped, {err}", fk.constraint_name());
    }
}

fn handle_query(args: &cli::QueryArgs) -> Result<()> {
    let warehouse = Warehouse::load(&args.warehouse)?;
    let result = queries::run_report(&warehouse, args.report, &args.country)
        .with_context(|| format!("Running report {:?}", args.report))?;
    print!("{}", table::render_records(&result));
    Ok(())
}
