//! End-to-end batch run: extract, clean, cast, load, enforce, persist.

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    cast::{CastReport, cast_entity},
    clean::{StageReport, clean_entity},
    config::{PipelineConfig, SourceSpec},
    enforce::{EnforcementReport, enforce_star_schema},
    entity::Entity,
    extract::{Extractor, HttpPageFetcher, LocalExtractor},
    record_set::RecordSet,
    warehouse::{TableSink, Warehouse},
};

#[derive(Debug, Clone)]
pub struct EntityRun {
    pub entity: Entity,
    pub rows_extracted: usize,
    pub rows_loaded: usize,
    pub skipped_items: usize,
    pub stages: Vec<StageReport>,
    pub casts: Vec<CastReport>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub entities: Vec<EntityRun>,
    pub enforcement: EnforcementReport,
}

impl RunSummary {
    pub fn entity(&self, entity: Entity) -> Option<&EntityRun> {
        self.entities.iter().find(|run| run.entity == entity)
    }
}

pub fn build_extractor(config: &PipelineConfig) -> Result<LocalExtractor> {
    let mut extractor = LocalExtractor::new(&config.source_dir).with_retry(config.retry);
    if let Some(base_url) = &config.api.base_url {
        let api_key = config.api.api_key();
        if api_key.is_none() {
            warn!(
                "No API key found in ${}; requests to {base_url} are unauthenticated",
                config.api.api_key_env
            );
        }
        extractor = extractor.with_page_fetcher(Box::new(HttpPageFetcher::new(base_url.as_str(), api_key)?));
    }
    Ok(extractor)
}

/// Raw records for one source, plus the number of paginated items skipped.
pub fn extract_source<E>(extractor: &E, source: &SourceSpec) -> Result<(RecordSet, usize)>
where
    E: Extractor + ?Sized,
{
    Ok(match source {
        SourceSpec::Table { name } => (extractor.fetch_table(name)?, 0),
        SourceSpec::Document { reference } => (extractor.fetch_document_tables(reference)?, 0),
        SourceSpec::Paginated {
            endpoint,
            count_endpoint,
        } => {
            let count = extractor.fetch_count(count_endpoint)?;
            let fetched = extractor.fetch_paginated(endpoint, count)?;
            (fetched.records, fetched.skipped.len())
        }
        SourceSpec::Object { uri } => (extractor.fetch_object(uri)?, 0),
    })
}

/// Cleans and casts `raw`, then replaces the entity's table in `sink`.
pub fn load_entity<S>(sink: &mut S, entity: Entity, raw: RecordSet) -> Result<EntityRun>
where
    S: TableSink + ?Sized,
{
    let rows_extracted = raw.len();
    let cleaned = clean_entity(entity, raw)?;
    let cast = cast_entity(entity, cleaned.records)?;
    let rows_loaded = cast.records.len();
    sink.replace_table(entity.table_name(), cast.records)
        .with_context(|| format!("Loading {}", entity.table_name()))?;
    Ok(EntityRun {
        entity,
        rows_extracted,
        rows_loaded,
        skipped_items: 0,
        stages: cleaned.stages,
        casts: cast.columns,
    })
}

pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let extractor = build_extractor(config)?;
    let mut warehouse = Warehouse::new();
    let mut entities = Vec::with_capacity(Entity::ALL.len());
    for entity in Entity::ALL {
        let source = config.sources.get(entity);
        let (raw, skipped_items) = extract_source(&extractor, source)
            .with_context(|| format!("Extracting {entity} data"))?;
        let mut loaded = load_entity(&mut warehouse, entity, raw)
            .with_context(|| format!("Processing {entity} data"))?;
        loaded.skipped_items = skipped_items;
        info!(
            "{entity}: {} extracted, {} loaded into {}",
            loaded.rows_extracted,
            loaded.rows_loaded,
            entity.table_name()
        );
        entities.push(loaded);
    }
    let enforcement = enforce_star_schema(&mut warehouse).context("Enforcing star schema")?;
    for table in enforcement.keyless_tables() {
        warn!("Table '{table}' has duplicate keys and was left without a primary key");
    }
    warehouse
        .save(&config.warehouse_dir)
        .with_context(|| format!("Saving warehouse to {:?}", config.warehouse_dir))?;
    Ok(RunSummary {
        entities,
        enforcement,
    })
}
