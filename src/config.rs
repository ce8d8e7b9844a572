//! Pipeline configuration.
//!
//! A `pipeline.yaml` names the source directory, the warehouse directory,
//! where each entity's raw data comes from, and how the paginated API is
//! reached. Every field has a default, so an empty file is a valid config.
//! Relative directories are resolved against the config file's location.

use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{entity::Entity, extract::RetryPolicy};

pub const DEFAULT_API_KEY_ENV: &str = "RETAIL_API_KEY";

/// Where one entity's raw data is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// A relational table dump, `<source_dir>/<name>.csv`.
    Table { name: String },
    /// Every `<reference>*.csv` page of a tabular document.
    Document { reference: String },
    /// One API call per item, after reading the item count.
    Paginated {
        endpoint: String,
        count_endpoint: String,
    },
    /// An object storage URI.
    Object { uri: String },
}

impl SourceSpec {
    fn table(name: &str) -> Self {
        SourceSpec::Table {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub user: SourceSpec,
    pub card: SourceSpec,
    pub store: SourceSpec,
    pub product: SourceSpec,
    pub date_event: SourceSpec,
    pub order: SourceSpec,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            user: SourceSpec::table("legacy_users"),
            card: SourceSpec::Document {
                reference: "card_details".to_string(),
            },
            store: SourceSpec::Paginated {
                endpoint: "store_details".to_string(),
                count_endpoint: "number_stores".to_string(),
            },
            product: SourceSpec::Object {
                uri: "s3://data-handling-public/products.csv".to_string(),
            },
            date_event: SourceSpec::Object {
                uri: "https://data-handling-public.s3.eu-west-1.amazonaws.com/date_details.json"
                    .to_string(),
            },
            order: SourceSpec::table("orders_table"),
        }
    }
}

impl Sources {
    pub fn get(&self, entity: Entity) -> &SourceSpec {
        match entity {
            Entity::User => &self.user,
            Entity::Card => &self.card,
            Entity::Store => &self.store,
            Entity::Product => &self.product,
            Entity::DateEvent => &self.date_event,
            Entity::Order => &self.order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// When unset, paginated sources are read from `<source_dir>/<endpoint>/<n>.json`.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub warehouse_dir: PathBuf,
    pub sources: Sources,
    pub api: ApiConfig,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data"),
            warehouse_dir: PathBuf::from("warehouse"),
            sources: Sources::default(),
            api: ApiConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening pipeline config {path:?}"))?;
        let mut config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing pipeline config {path:?}"))?;
        if let Some(base) = path.parent() {
            config.source_dir = resolve(base, &config.source_dir);
            config.warehouse_dir = resolve(base, &config.warehouse_dir);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating pipeline config {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing pipeline config YAML")
    }
}

fn resolve(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}
