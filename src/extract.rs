//! Raw data acquisition.
//!
//! [`Extractor`] is the supplier interface the pipeline consumes. It returns
//! all-text record sets from relational table dumps, document tables, a
//! paginated JSON API and object storage. [`LocalExtractor`] serves all four
//! from a source directory; its paginated fetch goes through a
//! [`PageFetcher`], either [`DirectoryPageFetcher`] for files on disk or
//! [`HttpPageFetcher`] for the live API.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::{StatusCode, blocking::Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    io_utils::{read_records, records_from_objects},
    record_set::RecordSet,
};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Source '{0}' not found")]
    NotFound(String),
    #[error("Unsupported object URI '{0}'")]
    UnsupportedUri(String),
    #[error("Rate limited while fetching {0}")]
    RateLimited(String),
    #[error("Transient failure fetching {url}: {message}")]
    Transient { url: String, message: String },
    #[error("Request for {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("Request for {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Invalid response body from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

impl ExtractError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::RateLimited(_) | ExtractError::Transient { .. }
        )
    }
}

/// Exponential backoff for the paginated fetch: `base_delay * 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// One JSON document per request path.
pub trait PageFetcher {
    fn fetch_json(&self, path: &str) -> Result<serde_json::Value, ExtractError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PaginatedFetch {
    pub records: RecordSet,
    pub skipped: Vec<SkippedItem>,
}

fn fetch_with_retry<F>(
    fetcher: &F,
    path: &str,
    retry: &RetryPolicy,
) -> Result<serde_json::Value, ExtractError>
where
    F: PageFetcher + ?Sized,
{
    let mut attempt = 0;
    loop {
        match fetcher.fetch_json(path) {
            Ok(body) => return Ok(body),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                let wait = retry.delay_for(attempt);
                info!(
                    "Retrying {path} in {}ms after attempt {} of {}: {err}",
                    wait.as_millis(),
                    attempt + 1,
                    retry.max_retries + 1
                );
                thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetches `endpoint/0` through `endpoint/{count - 1}`. Items that still fail
/// after the retry budget are recorded as skipped and left out.
pub fn fetch_paginated_with<F>(
    fetcher: &F,
    endpoint: &str,
    count: usize,
    retry: &RetryPolicy,
) -> Result<PaginatedFetch>
where
    F: PageFetcher + ?Sized,
{
    let endpoint = endpoint.trim_end_matches('/');
    let mut items = Vec::with_capacity(count);
    let mut skipped = Vec::new();
    for index in 0..count {
        match fetch_with_retry(fetcher, &format!("{endpoint}/{index}"), retry) {
            Ok(serde_json::Value::Array(objects)) => items.extend(objects),
            Ok(body) => items.push(body),
            Err(err) => {
                warn!("Skipping {endpoint}/{index}: {err}");
                skipped.push(SkippedItem {
                    index,
                    reason: err.to_string(),
                });
            }
        }
    }
    let records = records_from_objects(&items)
        .with_context(|| format!("Converting {endpoint} responses"))?;
    info!(
        "Fetched {} of {count} item(s) from {endpoint}; {} skipped",
        records.len(),
        skipped.len()
    );
    Ok(PaginatedFetch { records, skipped })
}

/// Reads an item count from a count endpoint: a bare number, or an object
/// such as `{"statusCode": 200, "number_stores": 451}`. A `number_*` field
/// wins over any other integer field.
pub fn number_of_stores<F>(fetcher: &F, endpoint: &str) -> Result<usize, ExtractError>
where
    F: PageFetcher + ?Sized,
{
    let body = fetcher.fetch_json(endpoint)?;
    let count = match &body {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::Object(map) => map
            .iter()
            .find(|(key, _)| key.starts_with("number_"))
            .and_then(|(_, value)| value.as_u64())
            .or_else(|| map.values().find_map(serde_json::Value::as_u64)),
        _ => None,
    };
    count
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ExtractError::InvalidBody {
            url: endpoint.to_string(),
            message: format!("expected an item count, found {body}"),
        })
}

pub struct HttpPageFetcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPageFetcher {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_json(&self, path: &str) -> Result<serde_json::Value, ExtractError> {
        let url = self.url_for(path);
        debug!("GET {url}");
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = request.send().map_err(|err| {
            if err.is_timeout() || err.is_connect() {
                ExtractError::Transient {
                    url: url.clone(),
                    message: err.to_string(),
                }
            } else {
                ExtractError::Request {
                    url: url.clone(),
                    message: err.to_string(),
                }
            }
        })?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExtractError::RateLimited(url));
        }
        if status.is_server_error() {
            return Err(ExtractError::Transient {
                url,
                message: format!("status {status}"),
            });
        }
        if !status.is_success() {
            return Err(ExtractError::Status {
                url,
                status: status.as_u16(),
            });
        }
        response
            .json::<serde_json::Value>()
            .map_err(|err| ExtractError::InvalidBody {
                url,
                message: err.to_string(),
            })
    }
}

/// Serves API paths from `<root>/<path>.json`.
pub struct DirectoryPageFetcher {
    root: PathBuf,
}

impl DirectoryPageFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PageFetcher for DirectoryPageFetcher {
    fn fetch_json(&self, path: &str) -> Result<serde_json::Value, ExtractError> {
        let file = self.root.join(format!("{}.json", path.trim_matches('/')));
        let body = fs::read_to_string(&file)
            .map_err(|_| ExtractError::NotFound(file.display().to_string()))?;
        serde_json::from_str(&body).map_err(|err| ExtractError::InvalidBody {
            url: file.display().to_string(),
            message: err.to_string(),
        })
    }
}

/// Supplier of raw, all-text record sets.
pub trait Extractor {
    fn fetch_table(&self, name: &str) -> Result<RecordSet>;
    fn fetch_document_tables(&self, reference: &str) -> Result<RecordSet>;
    fn fetch_count(&self, endpoint: &str) -> Result<usize>;
    fn fetch_paginated(&self, endpoint: &str, count: usize) -> Result<PaginatedFetch>;
    fn fetch_object(&self, uri: &str) -> Result<RecordSet>;
}

pub struct LocalExtractor {
    root: PathBuf,
    pages: Box<dyn PageFetcher>,
    retry: RetryPolicy,
}

impl LocalExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            pages: Box::new(DirectoryPageFetcher::new(root.clone())),
            root,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_page_fetcher(mut self, pages: Box<dyn PageFetcher>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Extractor for LocalExtractor {
    fn fetch_table(&self, name: &str) -> Result<RecordSet> {
        let path = self.root.join(format!("{name}.csv"));
        if !path.is_file() {
            return Err(ExtractError::NotFound(path.display().to_string()).into());
        }
        let records = read_records(&path)?;
        info!("Read {} row(s) from table '{name}'", records.len());
        Ok(records)
    }

    fn fetch_document_tables(&self, reference: &str) -> Result<RecordSet> {
        let mut pages = fs::read_dir(&self.root)
            .with_context(|| format!("Listing {:?}", self.root))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(reference) && name.ends_with(".csv"))
            })
            .collect::<Vec<_>>();
        pages.sort();
        let mut combined: Option<RecordSet> = None;
        for page in &pages {
            let records = read_records(page)?;
            combined = Some(match combined {
                Some(existing) => existing
                    .concat(records)
                    .with_context(|| format!("Concatenating {page:?}"))?,
                None => records,
            });
        }
        let combined =
            combined.ok_or_else(|| ExtractError::NotFound(format!("{reference}*.csv")))?;
        info!(
            "Read {} row(s) from {} page(s) of document '{reference}'",
            combined.len(),
            pages.len()
        );
        Ok(combined)
    }

    fn fetch_count(&self, endpoint: &str) -> Result<usize> {
        Ok(number_of_stores(self.pages.as_ref(), endpoint)?)
    }

    fn fetch_paginated(&self, endpoint: &str, count: usize) -> Result<PaginatedFetch> {
        fetch_paginated_with(self.pages.as_ref(), endpoint, count, &self.retry)
    }

    fn fetch_object(&self, uri: &str) -> Result<RecordSet> {
        let (bucket, key) = parse_object_uri(uri)?;
        let path = self.root.join(bucket).join(key);
        if !path.is_file() {
            return Err(ExtractError::NotFound(uri.to_string()).into());
        }
        let records = read_records(&path)?;
        info!("Read {} row(s) from object {uri}", records.len());
        Ok(records)
    }
}

/// Splits `s3://bucket/key` or `https://bucket.s3[.region].amazonaws.com/key`.
pub fn parse_object_uri(uri: &str) -> Result<(String, String), ExtractError> {
    let unsupported = || ExtractError::UnsupportedUri(uri.to_string());
    let (bucket, key) = if let Some(rest) = uri.strip_prefix("s3://") {
        rest.split_once('/').ok_or_else(unsupported)?
    } else if let Some(rest) = uri.strip_prefix("https://") {
        let (host, key) = rest.split_once('/').ok_or_else(unsupported)?;
        let (bucket, _) = host.split_once(".s3").ok_or_else(unsupported)?;
        (bucket, key)
    } else {
        return Err(unsupported());
    };
    if bucket.is_empty() || key.is_empty() {
        return Err(unsupported());
    }
    Ok((bucket.to_string(), key.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use super::*;
    use serde_json::json;

    /// Replays scripted responses per path, then answers 404.
    struct ScriptedFetcher {
        responses: RefCell<HashMap<String, Vec<Result<serde_json::Value, ExtractError>>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<(&str, Vec<Result<serde_json::Value, ExtractError>>)>) -> Self {
            Self {
                responses: RefCell::new(
                    script
                        .into_iter()
                        .map(|(path, mut replies)| {
                            replies.reverse();
                            (path.to_string(), replies)
                        })
                        .collect(),
                ),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch_json(&self, path: &str) -> Result<serde_json::Value, ExtractError> {
            self.calls.borrow_mut().push(path.to_string());
            self.responses
                .borrow_mut()
                .get_mut(path)
                .and_then(Vec::pop)
                .unwrap_or_else(|| {
                    Err(ExtractError::Status {
                        url: path.to_string(),
                        status: 404,
                    })
                })
        }
    }

    fn no_wait(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 0,
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn rate_limited_items_are_retried_then_kept() {
        let fetcher = ScriptedFetcher::new(vec![
            (
                "stores/0",
                vec![
                    Err(ExtractError::RateLimited("stores/0".into())),
                    Ok(json!({"store_code": "A-1"})),
                ],
            ),
            ("stores/1", vec![Ok(json!({"store_code": "B-2"}))]),
        ]);
        let fetched = fetch_paginated_with(&fetcher, "stores", 2, &no_wait(3)).unwrap();
        assert_eq!(fetched.records.len(), 2);
        assert!(fetched.skipped.is_empty());
        assert_eq!(fetcher.calls.borrow().len(), 3);
    }

    #[test]
    fn items_exhausting_retries_are_skipped() {
        let limited = || Err(ExtractError::RateLimited("stores/1".into()));
        let fetcher = ScriptedFetcher::new(vec![
            ("stores/0", vec![Ok(json!({"store_code": "A-1"}))]),
            ("stores/1", vec![limited(), limited(), limited()]),
        ]);
        let fetched = fetch_paginated_with(&fetcher, "stores", 2, &no_wait(2)).unwrap();
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.skipped.len(), 1);
        assert_eq!(fetched.skipped[0].index, 1);
        assert_eq!(fetcher.calls.borrow().len(), 4);
    }

    #[test]
    fn non_retryable_failures_are_skipped_without_retrying() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let fetched = fetch_paginated_with(&fetcher, "stores", 1, &no_wait(3)).unwrap();
        assert_eq!(fetched.skipped.len(), 1);
        assert_eq!(fetcher.calls.borrow().len(), 1);
    }

    #[test]
    fn store_count_reads_the_single_integer_field() {
        let fetcher = ScriptedFetcher::new(vec![(
            "number_stores",
            vec![Ok(json!({"statusCode": 200, "number_stores": 451}))],
        )]);
        assert_eq!(number_of_stores(&fetcher, "number_stores"), Ok(451));
    }

    #[test]
    fn object_uris_map_to_bucket_and_key() {
        assert_eq!(
            parse_object_uri("s3://data-handling-public/products.csv").unwrap(),
            ("data-handling-public".to_string(), "products.csv".to_string())
        );
        assert_eq!(
            parse_object_uri("https://data-handling-public.s3.eu-west-1.amazonaws.com/date_details.json")
                .unwrap(),
            ("data-handling-public".to_string(), "date_details.json".to_string())
        );
        assert!(parse_object_uri("ftp://bucket/key").is_err());
        assert!(parse_object_uri("s3://bucket").is_err());
    }
}
