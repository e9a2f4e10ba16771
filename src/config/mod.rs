//! Configuration management for the sameas pipeline
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `SAMEAS_*` environment variables. [`Config::validate`] runs before any
//! stage so that a bad threshold or a missing dump fails the run up front.
//!
//! ```toml
//! [pipeline]
//! page_size = 500000
//! threshold = 0.5
//! strategies = ["maxconf", "threshold", "oneonly", "belief"]
//! join_mode = "fan_out"
//! failure_policy = "abort"
//! parallel_matchers = true
//!
//! [paths]
//! storage = "sqlite"
//! workspace_dir = "data/workspace"
//! output_dir = "data/output"
//!
//! [sources]
//! freebase_dump = "data/freebase-rdf-latest.nt"
//! wikidata_db = "data/wikidata.db"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::join::JoinMode;
use crate::matcher::{MatchSettings, MatcherRegistry};
use crate::storage::{FailurePolicy, Workspace};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Algorithm tunables
    pub pipeline: PipelineConfig,

    /// Where stage tables and exports live
    pub paths: PathsConfig,

    /// Raw inputs for the ingest stage
    pub sources: SourcesConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Pipeline-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows per page for every sorted scan and batch write
    pub page_size: usize,

    /// Ratio threshold used by the `threshold` and `oneonly` matchers
    pub threshold: f64,

    /// Matchers to run, by registry name
    pub strategies: Vec<String>,

    /// Merge-join behaviour on equal hashes
    pub join_mode: JoinMode,

    /// What to do when a batch write partially fails
    pub failure_policy: FailurePolicy,

    /// Run the selected matchers concurrently
    pub parallel_matchers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 500_000,
            threshold: 0.5,
            strategies: MatcherRegistry::builtin()
                .names()
                .into_iter()
                .map(String::from)
                .collect(),
            join_mode: JoinMode::default(),
            failure_policy: FailurePolicy::default(),
            parallel_matchers: true,
        }
    }
}

/// Storage backend for stage tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One SQLite file per table under `workspace_dir`
    #[default]
    Sqlite,
    /// In-process tables, discarded on exit
    Memory,
}

/// Path configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub storage: StorageBackend,

    /// Directory holding one database per stage table
    pub workspace_dir: PathBuf,

    /// Directory receiving the TSV exports and `report.json`
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            workspace_dir: PathBuf::from("data/workspace"),
            output_dir: PathBuf::from("data/output"),
        }
    }
}

/// Source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Freebase RDF dump (tab-separated triples)
    pub freebase_dump: Option<PathBuf>,

    /// SQLite database holding `wb_items_per_site`
    pub wikidata_db: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} has an invalid value: '{value}'"))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::with_source(format!("Failed to read config file: {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse TOML config file {}: {e}",
                path.display()
            ))
        })
    }

    /// File (when given) or defaults, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `SAMEAS_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(page_size) = env_parse("SAMEAS_PAGE_SIZE")? {
            self.pipeline.page_size = page_size;
        }
        if let Some(threshold) = env_parse("SAMEAS_THRESHOLD")? {
            self.pipeline.threshold = threshold;
        }
        if let Some(dir) = env_parse::<PathBuf>("SAMEAS_WORKSPACE_DIR")? {
            self.paths.workspace_dir = dir;
        }
        if let Some(dir) = env_parse::<PathBuf>("SAMEAS_OUTPUT_DIR")? {
            self.paths.output_dir = dir;
        }
        if let Some(path) = env_parse::<PathBuf>("SAMEAS_FREEBASE_DUMP")? {
            self.sources.freebase_dump = Some(path);
        }
        if let Some(path) = env_parse::<PathBuf>("SAMEAS_WIKIDATA_DB")? {
            self.sources.wikidata_db = Some(path);
        }
        if let Ok(level) = std::env::var("SAMEAS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SAMEAS_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.page_size == 0 {
            return Err(Error::config("page_size must be greater than 0"));
        }

        let threshold = self.pipeline.threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1), got {threshold}"
            )));
        }

        if self.pipeline.strategies.is_empty() {
            return Err(Error::config("at least one strategy must be selected"));
        }
        MatcherRegistry::builtin().select(&self.pipeline.strategies)?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::config(format!(
                "Invalid log format '{}'. Valid options: text, json",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Check that both source inputs are configured and exist
    pub fn validate_sources(&self) -> Result<()> {
        let required = [
            ("sources.freebase_dump", &self.sources.freebase_dump),
            ("sources.wikidata_db", &self.sources.wikidata_db),
        ];
        for (key, path) in required {
            match path {
                None => return Err(Error::config(format!("{key} is required for ingest"))),
                Some(path) if !path.is_file() => {
                    return Err(Error::config(format!(
                        "{key} does not exist: {}",
                        path.display()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Settings handed to every matcher
    #[must_use]
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            threshold: self.pipeline.threshold,
            page_size: self.pipeline.page_size,
            failure_policy: self.pipeline.failure_policy,
        }
    }

    /// Open the workspace described by `paths`
    pub fn workspace(&self) -> Result<Workspace> {
        match self.paths.storage {
            StorageBackend::Sqlite => Workspace::sqlite(&self.paths.workspace_dir),
            StorageBackend::Memory => Ok(Workspace::in_memory()),
        }
    }
}
