use std::path::Path;

use bytes::Bytes;
use cartflow_bucket::BucketStore;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::discovery::list_csv_files;
use crate::error::{PipelineError, Result};

pub const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadEntry {
    pub file: String,
    pub key: String,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub entries: Vec<UploadEntry>,
}

impl UploadReport {
    pub fn uploaded_files(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.file.clone()).collect()
    }
}

/// `cleaned` + `users_clean.csv` -> `cleaned/users_clean.csv`.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

/// Uploads every CSV in `cleaned_dir`. The batch stops at the first failed
/// upload; later files are not attempted.
pub async fn upload_all(
    store: &dyn BucketStore,
    cleaned_dir: &Path,
    key_prefix: &str,
) -> Result<UploadReport> {
    if !cleaned_dir.exists() {
        warn!(dir = %cleaned_dir.display(), "cleaned directory not found; nothing to upload");
        return Ok(UploadReport::default());
    }

    let listing = list_csv_files(cleaned_dir)?;
    info!(
        count = listing.files.len(),
        bucket = store.bucket(),
        "uploading cleaned files"
    );

    let mut report = UploadReport::default();
    for path in listing.files {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(key_prefix, &file);
        let bytes = Bytes::from(tokio::fs::read(&path).await?);

        if let Err(source) = store.put_object(&key, bytes, CSV_CONTENT_TYPE).await {
            error!(file = %file, key = %key, error = %source, "upload failed");
            return Err(PipelineError::Upload {
                file,
                uploaded: report.uploaded_files(),
                source,
            });
        }

        info!(file = %file, key = %key, "upload successful");
        report.entries.push(UploadEntry {
            file,
            key,
            status: UploadStatus::Uploaded,
        });
    }

    Ok(report)
}
