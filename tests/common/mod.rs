#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use retail_warehouse::config::PipelineConfig;
use retail_warehouse::record_set::RecordSet;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Raw sources for all six entities, laid out the way `LocalExtractor` reads them.
pub fn source_dir() -> PathBuf {
    fixture_path("source")
}

pub const USER_HEADERS: &[&str] = &[
    "first_name",
    "last_name",
    "date_of_birth",
    "company",
    "email_address",
    "address",
    "country",
    "country_code",
    "phone_number",
    "join_date",
    "user_uuid",
];

/// One raw user row with the given country fields and uuid.
pub fn user_row(
    first: &str,
    country: Option<&str>,
    code: &str,
    uuid: &str,
) -> Vec<Option<String>> {
    vec![
        Some(first.to_string()),
        Some("Allen".to_string()),
        Some("Feb 13 1990".to_string()),
        Some("Fox Ltd".to_string()),
        Some("guy@example.com".to_string()),
        Some("Studio 22a".to_string()),
        country.map(str::to_string),
        Some(code.to_string()),
        Some("(0161) 496 0674".to_string()),
        Some("2002/12/20".to_string()),
        Some(uuid.to_string()),
    ]
}

pub fn users(rows: Vec<Vec<Option<String>>>) -> RecordSet {
    RecordSet::from_text_rows(USER_HEADERS, rows).expect("user record set")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn warehouse_dir(&self) -> PathBuf {
        self.path().join("warehouse")
    }

    /// Writes a pipeline config that reads the fixture sources and stores the
    /// warehouse inside this workspace.
    pub fn write_config(&self) -> PathBuf {
        let config = PipelineConfig {
            source_dir: source_dir(),
            warehouse_dir: self.warehouse_dir(),
            ..PipelineConfig::default()
        };
        let path = self.path().join("pipeline.yaml");
        config.save(&path).expect("write pipeline config");
        path
    }
}
