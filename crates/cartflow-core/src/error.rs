// crates/cartflow-core/src/error.rs

use std::path::PathBuf;

use cartflow_bucket::BucketError;
use thiserror::Error;

use crate::graph::GraphError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch resource '{resource}': {message}")]
    UpstreamFetch { resource: String, message: String },

    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("upload of {file} failed after {} successful uploads: {source}", uploaded.len())]
    Upload {
        file: String,
        uploaded: Vec<String>,
        #[source]
        source: BucketError,
    },

    #[error("warehouse load failed (exit code {code:?}): {stderr}")]
    Load { code: Option<i32>, stderr: String },

    #[error("transform finished with {failed} failed file(s): {files:?}")]
    Transform { failed: usize, files: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing secret {0}")]
    MissingSecret(&'static str),

    #[error("object store error: {0}")]
    Bucket(#[from] BucketError),

    #[error("task graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
