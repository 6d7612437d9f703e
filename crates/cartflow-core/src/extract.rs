use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::flatten::{flatten_records, records_from_body};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub resource: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// False when the upstream collection was empty and no file was written.
    pub written: bool,
}

/// Pulls one resource collection from the fixture API and writes it to
/// `<raw_dir>/<resource>.csv`, overwriting any previous extract.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    base_url: String,
    raw_dir: PathBuf,
}

impl HttpExtractor {
    pub fn new(source: &SourceConfig, raw_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(source.timeout())
            .build()
            .map_err(|err| PipelineError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: source.base_url.trim_end_matches('/').to_string(),
            raw_dir: raw_dir.into(),
        })
    }

    pub fn raw_path(&self, resource: &str) -> PathBuf {
        raw_file_path(&self.raw_dir, resource)
    }

    pub async fn fetch(&self, resource: &str) -> Result<ExtractSummary> {
        let records = self.fetch_records(resource).await.inspect_err(|err| {
            error!(resource, error = %err, "extraction failed");
        })?;

        let table = flatten_records(&records).map_err(|err| PipelineError::UpstreamFetch {
            resource: resource.to_string(),
            message: err.to_string(),
        })?;

        let path = self.raw_path(resource);

        // an empty collection has no columns; clear the previous extract instead
        if table.width() == 0 {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            warn!(resource, "upstream returned no records; nothing written");
            return Ok(ExtractSummary {
                resource: resource.to_string(),
                path,
                rows: 0,
                columns: 0,
                written: false,
            });
        }

        tokio::fs::create_dir_all(&self.raw_dir).await?;
        tokio::fs::write(&path, table.to_csv_bytes()?).await?;

        info!(
            resource,
            rows = table.height(),
            columns = table.width(),
            path = %path.display(),
            "extraction completed"
        );

        Ok(ExtractSummary {
            resource: resource.to_string(),
            path,
            rows: table.height(),
            columns: table.width(),
            written: true,
        })
    }

    async fn fetch_records(&self, resource: &str) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, resource);
        let upstream = |message: String| PipelineError::UpstreamFetch {
            resource: resource.to_string(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| upstream(err.to_string()))?;

        if !response.status().is_success() {
            return Err(upstream(format!("GET {url} returned {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| upstream(format!("invalid JSON body: {err}")))?;
        Ok(records_from_body(body))
    }
}

pub fn raw_file_path(raw_dir: &Path, resource: &str) -> PathBuf {
    raw_dir.join(format!("{resource}.csv"))
}
