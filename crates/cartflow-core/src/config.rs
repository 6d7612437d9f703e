//! Pipeline configuration. Every field has a default so an empty (or absent)
//! TOML file describes the stock daily pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::transform::TransformOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub cleaned_dir: PathBuf,
    pub source: SourceConfig,
    pub transform: TransformOptions,
    pub bucket: BucketSettings,
    pub warehouse: WarehouseConfig,
    pub retry: RetryPolicy,
    pub schedule: ScheduleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("extract/data"),
            cleaned_dir: PathBuf::from("transform/cleaned"),
            source: SourceConfig::default(),
            transform: TransformOptions::default(),
            bucket: BucketSettings::default(),
            warehouse: WarehouseConfig::default(),
            retry: RetryPolicy::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub resources: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fakestoreapi.com".to_string(),
            resources: vec!["products".into(), "users".into(), "carts".into()],
            timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketSettings {
    pub name: String,
    pub key_prefix: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            name: cartflow_bucket::DEFAULT_BUCKET.to_string(),
            key_prefix: "cleaned".to_string(),
            endpoint: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub program: String,
    pub database: String,
    pub schema: String,
    pub script: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            program: "snowsql".to_string(),
            database: "ECOMMERCE_DB".to_string(),
            schema: "RAW_DATA".to_string(),
            script: PathBuf::from("sql/ddl/create_tables.sql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay_secs: 300,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay_secs: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Daily trigger time in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { hour: 6, minute: 0 }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(raw)
            .map_err(|err| PipelineError::Config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` and resolves relative directories against the file's
    /// parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolved_against(base))
    }

    /// Loads `path` when given, otherwise the defaults, anchored to `base`.
    pub fn load_or_default(path: Option<&Path>, base: &Path) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default().resolved_against(base)),
        }
    }

    pub fn resolved_against(mut self, base: &Path) -> Self {
        self.raw_dir = anchor(base, &self.raw_dir);
        self.cleaned_dir = anchor(base, &self.cleaned_dir);
        self.warehouse.script = anchor(base, &self.warehouse.script);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.resources.is_empty() {
            return Err(PipelineError::Config(
                "source.resources must name at least one resource".into(),
            ));
        }
        if let Some(bad) = self
            .source
            .resources
            .iter()
            .find(|name| name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.'))
        {
            return Err(PipelineError::Config(format!(
                "resource name '{bad}' cannot be used as a file name"
            )));
        }
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(PipelineError::Config(format!(
                "schedule {:02}:{:02} is not a valid time of day",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if self.bucket.name.is_empty() {
            return Err(PipelineError::Config("bucket.name cannot be empty".into()));
        }
        Ok(())
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
