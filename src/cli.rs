use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{entity::Entity, queries::Report};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean, cast, and load retail sales data into a star-schema warehouse",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean one entity's raw CSV or JSON file
    Clean(CleanArgs),
    /// Write a pipeline configuration populated with the default sources
    Init(InitArgs),
    /// Extract, clean, cast, and load every entity, then enforce keys
    Run(RunArgs),
    /// Apply the star-schema keys to a saved warehouse
    Enforce(EnforceArgs),
    /// Print an analytical report over a saved warehouse
    Query(QueryArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Entity whose cleaning rules apply
    #[arg(short, long, value_enum)]
    pub entity: Entity,
    /// Raw input file (.csv or .json; '-' reads CSV from stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Output CSV file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Also apply the entity's storage types after cleaning
    #[arg(long)]
    pub cast: bool,
    /// Print a per-stage summary table to stderr
    #[arg(long)]
    pub summary: bool,
    /// Character encoding of a CSV input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Destination configuration file
    #[arg(short, long, default_value = "pipeline.yaml")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline configuration file
    #[arg(short, long, default_value = "pipeline.yaml")]
    pub config: PathBuf,
    /// Overrides the configured warehouse directory
    #[arg(short, long)]
    pub warehouse: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EnforceArgs {
    /// Warehouse directory containing catalog.yaml
    #[arg(short, long)]
    pub warehouse: PathBuf,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Warehouse directory containing catalog.yaml
    #[arg(short, long)]
    pub warehouse: PathBuf,
    /// Report to run
    #[arg(value_enum)]
    pub report: Report,
    /// Country code for country-scoped reports
    #[arg(long, default_value = "DE")]
    pub country: String,
}
