//! Stage adapters and the daily extract → transform → upload → load graph.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use cartflow_bucket::{BucketStore, S3BucketStore, S3Config, DEFAULT_REGION};

use crate::config::{BucketSettings, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::extract::HttpExtractor;
use crate::graph::{Stage, TaskGraph};
use crate::load::WarehouseLoader;
use crate::secrets::AwsCredentials;
use crate::transform::{transform_directory, TransformOptions};
use crate::upload::upload_all;

pub const TRANSFORM_TASK: &str = "transform_data";
pub const UPLOAD_TASK: &str = "upload_to_s3";
pub const LOAD_TASK: &str = "load_to_snowflake";

pub fn extract_task_name(resource: &str) -> String {
    format!("extract_{resource}")
}

pub struct ExtractStage {
    extractor: Arc<HttpExtractor>,
    resource: String,
}

impl ExtractStage {
    pub fn new(extractor: Arc<HttpExtractor>, resource: impl Into<String>) -> Self {
        Self {
            extractor,
            resource: resource.into(),
        }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    async fn run(&self) -> anyhow::Result<String> {
        let summary = self.extractor.fetch(&self.resource).await?;
        Ok(format!("Extracted {} {}", summary.rows, summary.resource))
    }
}

pub struct TransformStage {
    raw_dir: PathBuf,
    cleaned_dir: PathBuf,
    options: TransformOptions,
}

impl TransformStage {
    pub fn new(raw_dir: PathBuf, cleaned_dir: PathBuf, options: TransformOptions) -> Self {
        Self {
            raw_dir,
            cleaned_dir,
            options,
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    async fn run(&self) -> anyhow::Result<String> {
        let raw_dir = self.raw_dir.clone();
        let cleaned_dir = self.cleaned_dir.clone();
        let options = self.options.clone();

        let report = tokio::task::spawn_blocking(move || {
            transform_directory(&raw_dir, &cleaned_dir, &options)
        })
        .await
        .context("transform worker panicked")??
        .into_result()?;

        let outputs: Vec<String> = report.processed.iter().map(|f| f.output.clone()).collect();
        Ok(format!("Processed {} files: {:?}", report.count(), outputs))
    }
}

pub struct UploadStage {
    store: Arc<dyn BucketStore>,
    cleaned_dir: PathBuf,
    key_prefix: String,
}

impl UploadStage {
    pub fn new(store: Arc<dyn BucketStore>, cleaned_dir: PathBuf, key_prefix: String) -> Self {
        Self {
            store,
            cleaned_dir,
            key_prefix,
        }
    }
}

#[async_trait]
impl Stage for UploadStage {
    async fn run(&self) -> anyhow::Result<String> {
        let report = upload_all(self.store.as_ref(), &self.cleaned_dir, &self.key_prefix).await?;
        let files = report.uploaded_files();
        Ok(format!("Uploaded {} files: {:?}", files.len(), files))
    }
}

pub struct LoadStage {
    loader: WarehouseLoader,
}

impl LoadStage {
    pub fn new(loader: WarehouseLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Stage for LoadStage {
    async fn run(&self) -> anyhow::Result<String> {
        self.loader.load().await?;
        Ok("Data loaded to warehouse".to_string())
    }
}

/// Collaborators the daily graph needs beyond plain configuration.
pub struct PipelineDeps {
    pub store: Arc<dyn BucketStore>,
    pub loader: WarehouseLoader,
}

/// Builds the daily graph: one extract task per resource, all of which must
/// finish before the transform, followed by upload and load.
pub fn build_daily_graph(config: &PipelineConfig, deps: PipelineDeps) -> Result<TaskGraph> {
    config.validate()?;
    let extractor = Arc::new(HttpExtractor::new(&config.source, config.raw_dir.clone())?);
    let mut graph = TaskGraph::new();

    let extracts = config
        .source
        .resources
        .iter()
        .map(|resource| {
            graph.add_task(
                extract_task_name(resource),
                ExtractStage::new(Arc::clone(&extractor), resource.clone()),
            )
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let transform = graph.add_task(
        TRANSFORM_TASK,
        TransformStage::new(
            config.raw_dir.clone(),
            config.cleaned_dir.clone(),
            config.transform.clone(),
        ),
    )?;
    let upload = graph.add_task(
        UPLOAD_TASK,
        UploadStage::new(
            deps.store,
            config.cleaned_dir.clone(),
            config.bucket.key_prefix.clone(),
        ),
    )?;
    let load = graph.add_task(LOAD_TASK, LoadStage::new(deps.loader))?;

    graph.fan_in(&extracts, transform)?;
    graph.add_dependency(transform, upload)?;
    graph.add_dependency(upload, load)?;
    Ok(graph)
}

pub fn s3_config(settings: &BucketSettings, credentials: &AwsCredentials) -> S3Config {
    S3Config {
        bucket: settings.name.clone(),
        region: credentials
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint: settings.endpoint.clone(),
        access_key_id: credentials.access_key_id.clone(),
        secret_access_key: credentials.secret_access_key.clone(),
        force_path_style: settings.force_path_style,
    }
}

pub async fn connect_bucket(
    settings: &BucketSettings,
    credentials: &AwsCredentials,
) -> Result<S3BucketStore> {
    S3BucketStore::new(s3_config(settings, credentials))
        .await
        .map_err(PipelineError::from)
}
