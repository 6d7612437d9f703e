//! Column normalization and row cleaning for raw extracts.
//!
//! Every `*.csv` file in the raw directory is cleaned independently and written
//! to the cleaned directory as `<stem><suffix>.csv`:
//!
//! 1. column names are trimmed, lowercased, space runs become `_`, and anything
//!    outside `[a-z0-9_]` is dropped;
//! 2. columns that collide after normalization collapse to one, last wins;
//! 3. exact duplicate rows are dropped (first occurrence kept);
//! 4. rows with every cell null are dropped.
//!
//! The cleaned directory mirrors the current raw set: outputs left by earlier
//! runs whose input is gone, or whose input failed this run, are deleted.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::discovery::{list_csv_files, CSV_EXTENSION};
use crate::error::{PipelineError, Result};
use crate::table::{RecordTable, Row};

pub const DEFAULT_CLEAN_SUFFIX: &str = "_clean";

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failing file and keep going with the rest of the batch.
    #[default]
    Continue,
    /// Stop at the first failing file.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub suffix: String,
    pub failure_policy: FailurePolicy,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_CLEAN_SUFFIX.to_string(),
            failure_policy: FailurePolicy::Continue,
        }
    }
}

/// Two source columns that normalized to the same name. The column at
/// `kept_index` supplies the values; `replaced_index` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCollision {
    pub name: String,
    pub replaced_index: usize,
    pub kept_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedTable {
    pub table: RecordTable,
    pub collisions: Vec<ColumnCollision>,
    pub duplicate_rows: usize,
    pub empty_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub input: String,
    pub output: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub collisions: Vec<ColumnCollision>,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub input: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub processed: Vec<ProcessedFile>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<String>,
    /// Cleaned outputs from earlier runs that this run did not produce.
    pub removed: Vec<String>,
}

impl TransformReport {
    pub fn count(&self) -> usize {
        self.processed.len()
    }

    /// `(input name, output name)` for every file written.
    pub fn name_pairs(&self) -> Vec<(String, String)> {
        self.processed
            .iter()
            .map(|file| (file.input.clone(), file.output.clone()))
            .collect()
    }

    /// Turns recorded per-file failures into a stage failure.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PipelineError::Transform {
                failed: self.failures.len(),
                files: self.failures.iter().map(|f| f.input.clone()).collect(),
            })
        }
    }
}

pub fn normalize_column_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let underscored = SPACE_RUNS.replace_all(&lowered, "_");
    NON_WORD.replace_all(&underscored, "").into_owned()
}

/// Renames every column and collapses collisions. The surviving column keeps
/// the position of the first occurrence and takes the values of the last one.
pub fn normalize_columns(table: &RecordTable) -> (RecordTable, Vec<ColumnCollision>) {
    let mut names: Vec<String> = Vec::with_capacity(table.width());
    let mut sources: Vec<usize> = Vec::with_capacity(table.width());
    let mut slot_by_name: HashMap<String, usize> = HashMap::new();
    let mut collisions = Vec::new();

    for (index, raw) in table.columns.iter().enumerate() {
        let name = normalize_column_name(raw);
        match slot_by_name.get(&name) {
            Some(&slot) => {
                collisions.push(ColumnCollision {
                    name: name.clone(),
                    replaced_index: sources[slot],
                    kept_index: index,
                });
                sources[slot] = index;
            }
            None => {
                slot_by_name.insert(name.clone(), names.len());
                names.push(name);
                sources.push(index);
            }
        }
    }

    let rows = if collisions.is_empty() {
        table.rows.clone()
    } else {
        table
            .rows
            .iter()
            .map(|row| sources.iter().map(|&src| row[src].clone()).collect())
            .collect()
    };

    (RecordTable { columns: names, rows }, collisions)
}

/// Drops exact duplicate rows, keeping the first occurrence in place.
pub fn drop_duplicate_rows(rows: Vec<Row>) -> (Vec<Row>, usize) {
    let mut seen: HashSet<Row> = HashSet::with_capacity(rows.len());
    let before = rows.len();
    let kept: Vec<Row> = rows
        .into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

pub fn drop_empty_rows(rows: Vec<Row>) -> (Vec<Row>, usize) {
    let before = rows.len();
    let kept: Vec<Row> = rows
        .into_iter()
        .filter(|row| row.iter().any(Option::is_some))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

pub fn clean_table(table: &RecordTable) -> CleanedTable {
    let (normalized, collisions) = normalize_columns(table);
    let (rows, duplicate_rows) = drop_duplicate_rows(normalized.rows);
    let (rows, empty_rows) = drop_empty_rows(rows);

    CleanedTable {
        table: RecordTable {
            columns: normalized.columns,
            rows,
        },
        collisions,
        duplicate_rows,
        empty_rows,
    }
}

/// `products.csv` -> `products_clean.csv`.
pub fn cleaned_file_name(input: &Path, suffix: &str) -> Option<String> {
    let stem = input.file_stem()?.to_str()?;
    Some(format!("{stem}{suffix}.csv"))
}

pub fn transform_file(input: &Path, dest_dir: &Path, suffix: &str) -> Result<ProcessedFile> {
    let input_name = display_name(input);
    let output_name =
        cleaned_file_name(input, suffix).ok_or_else(|| PipelineError::MalformedInput {
            path: input.to_path_buf(),
            reason: "file name is not valid UTF-8".into(),
        })?;

    let raw = RecordTable::read_csv(input)?;
    let cleaned = clean_table(&raw);

    for collision in &cleaned.collisions {
        warn!(
            file = %input_name,
            column = %collision.name,
            replaced_index = collision.replaced_index,
            kept_index = collision.kept_index,
            "column name collision; later column wins"
        );
    }

    let bytes = cleaned.table.to_csv_bytes()?;
    let output_path = dest_dir.join(&output_name);
    std::fs::write(&output_path, &bytes)?;

    Ok(ProcessedFile {
        input: input_name,
        output: output_name,
        rows_in: raw.height(),
        rows_out: cleaned.table.height(),
        collisions: cleaned.collisions,
        hash: blake3::hash(&bytes).to_hex().to_string(),
    })
}

pub fn transform_directory(
    raw_dir: &Path,
    cleaned_dir: &Path,
    options: &TransformOptions,
) -> Result<TransformReport> {
    std::fs::create_dir_all(cleaned_dir)?;

    let listing = list_csv_files(raw_dir)?;
    let expected: HashSet<String> = listing
        .files
        .iter()
        .filter_map(|path| cleaned_file_name(path, &options.suffix))
        .collect();
    let mut report = TransformReport {
        skipped: listing.skipped,
        removed: remove_stale_outputs(cleaned_dir, &options.suffix, &expected)?,
        ..TransformReport::default()
    };

    for path in listing.files {
        match transform_file(&path, cleaned_dir, &options.suffix) {
            Ok(processed) => {
                info!(
                    input = %processed.input,
                    output = %processed.output,
                    rows_in = processed.rows_in,
                    rows_out = processed.rows_out,
                    "transformed file"
                );
                report.processed.push(processed);
            }
            Err(err) => {
                error!(file = %path.display(), error = %err, "transform failed");
                // a failed input must not leave last run's output behind
                if let Some(previous) = cleaned_file_name(&path, &options.suffix) {
                    if remove_if_present(&cleaned_dir.join(&previous))? {
                        report.removed.push(previous);
                    }
                }
                if options.failure_policy == FailurePolicy::Abort {
                    return Err(err);
                }
                report.failures.push(FileFailure {
                    input: display_name(&path),
                    message: err.to_string(),
                });
            }
        }
    }

    info!(
        processed = report.count(),
        failed = report.failures.len(),
        skipped = report.skipped.len(),
        removed = report.removed.len(),
        "transform completed"
    );
    Ok(report)
}

/// Deletes `*<suffix>.csv` files in `cleaned_dir` whose raw input is gone.
fn remove_stale_outputs(
    cleaned_dir: &Path,
    suffix: &str,
    expected: &HashSet<String>,
) -> Result<Vec<String>> {
    let tail = format!("{suffix}.{CSV_EXTENSION}");
    let mut removed = Vec::new();

    for path in list_csv_files(cleaned_dir)?.files {
        let name = display_name(&path);
        if !name.ends_with(&tail) || expected.contains(&name) {
            continue;
        }
        if remove_if_present(&path)? {
            warn!(file = %name, "removed stale cleaned output");
            removed.push(name);
        }
    }
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
