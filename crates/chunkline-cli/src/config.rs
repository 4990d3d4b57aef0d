//! Configuration loading from TOML files

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chunkline_core::StreamId;
use chunkline_sink::{RetryPolicy, SinkConfig, WarehousePolicy};
use serde::Deserialize;

/// Global configuration for chunkline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub output: OutputConfig,
    pub ingest: IngestConfig,
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local directory or `s3://bucket/prefix`
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_env_path")]
    pub path: PathBuf,
    /// Fail the flush when the warehouse append fails
    pub required: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("chunkline.duckdb"),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub zstd_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { zstd_level: 3 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records per submitted batch
    pub batch_size: usize,
    pub max_retries: u32,
    /// Streams ingested in parallel
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            batch_size: 1000,
            max_retries: 3,
            workers: cpus.min(8),
        }
    }
}

/// One `[[streams]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub contract: String,
    /// Event signature, e.g. `Transfer(address,address,uint256)`
    pub method: String,
    /// JSON-lines file (`.gz` allowed, `-` for stdin)
    pub input: PathBuf,
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default = "default_marker_column")]
    pub marker_column: String,
}

fn default_marker_column() -> String {
    "blocknumber".to_string()
}

impl StreamConfig {
    pub fn id(&self) -> StreamId {
        StreamId::new(&self.contract, &self.method)
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store: Option<String>,
    pub warehouse: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub workers: Option<usize>,
}

/// Deserialize a path that may be an environment variable reference like ${VAR}
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    expand_env_var(&s)
        .map(PathBuf::from)
        .ok_or_else(|| serde::de::Error::custom(format!("environment variable in '{s}' is not set")))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./chunkline.toml (current directory)
    /// 2. ~/.config/chunkline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("chunkline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "chunkline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.store {
            self.storage.url = url;
        }
        if let Some(path) = overrides.warehouse {
            self.warehouse.enabled = true;
            self.warehouse.path = path;
        }
        if let Some(n) = overrides.batch_size {
            self.ingest.batch_size = n;
        }
        if let Some(n) = overrides.max_retries {
            self.ingest.max_retries = n;
        }
        if let Some(n) = overrides.workers {
            self.ingest.workers = n;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be at least 1");
        }
        if self.ingest.workers == 0 {
            bail!("ingest.workers must be at least 1");
        }
        if !(1..=22).contains(&self.output.zstd_level) {
            bail!("output.zstd_level must be 1-22, got {}", self.output.zstd_level);
        }
        let mut seen = HashSet::new();
        for stream in &self.streams {
            let slug = stream.id().slug();
            if !seen.insert(slug.clone()) {
                bail!("stream {slug} is configured twice");
            }
        }
        Ok(())
    }

    /// Streams named by slug, or all of them when `slugs` is empty
    pub fn select(&self, slugs: &[String]) -> Result<Vec<&StreamConfig>> {
        if slugs.is_empty() {
            return Ok(self.streams.iter().collect());
        }
        slugs
            .iter()
            .map(|slug| {
                self.streams
                    .iter()
                    .find(|s| s.id().slug() == *slug)
                    .with_context(|| format!("no configured stream named {slug}"))
            })
            .collect()
    }

    pub fn sink_config(&self, stream: &StreamConfig) -> SinkConfig {
        SinkConfig {
            header: stream.header.clone(),
            marker_column: stream.marker_column.clone(),
            zstd_level: self.output.zstd_level,
            retry: RetryPolicy::new(self.ingest.max_retries),
            warehouse_policy: if self.warehouse.required {
                WarehousePolicy::Required
            } else {
                WarehousePolicy::BestEffort
            },
        }
    }
}
