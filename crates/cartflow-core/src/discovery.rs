use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

pub const CSV_EXTENSION: &str = "csv";

#[derive(Debug, Default)]
pub struct CsvListing {
    /// CSV files in file-name order.
    pub files: Vec<PathBuf>,
    /// Names of regular files ignored for not being CSV.
    pub skipped: Vec<String>,
}

/// Lists the CSV files directly inside `dir` at call time. A missing directory
/// lists as empty.
pub fn list_csv_files(dir: &Path) -> Result<CsvListing> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "directory not found; nothing to list");
        return Ok(CsvListing::default());
    }

    let dir_str = dir
        .to_str()
        .ok_or_else(|| PipelineError::Config(format!("non UTF-8 path {}", dir.display())))?;
    let pattern = format!("{}/*", glob::Pattern::escape(dir_str));

    let entries = glob::glob(&pattern)
        .map_err(|err| PipelineError::Config(format!("invalid listing pattern: {err}")))?;

    let mut listing = CsvListing::default();
    for entry in entries {
        let path = entry.map_err(|err| PipelineError::Io(err.into()))?;
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) == Some(CSV_EXTENSION) {
            listing.files.push(path);
        } else {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!(file = %name, "skipping non-CSV file");
            listing.skipped.push(name);
        }
    }

    listing.files.sort();
    listing.skipped.sort();
    Ok(listing)
}
