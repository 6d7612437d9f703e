//! In-memory form of a flat CSV extract: ordered column names plus rows of
//! optional cells. An empty CSV field is a null cell.

use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::{PipelineError, Result};

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Appends a row; rows whose width differs from the header are rejected.
    pub fn push_row(&mut self, row: Row) -> std::result::Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} fields but the header has {}",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Reads a CSV file with a header row. Ragged rows and header-less files are
    /// reported as `MalformedInput` against `path`.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file).map_err(|err| match err {
            ReadFailure::Malformed(reason) => PipelineError::MalformedInput {
                path: path.to_path_buf(),
                reason,
            },
            ReadFailure::Io(err) => PipelineError::Io(err),
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, ReadFailure> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let header = reader.headers().map_err(ReadFailure::from)?.clone();
        // `""` alone is how a writer renders a zero-column header
        if header.iter().all(str::is_empty) {
            return Err(ReadFailure::Malformed("table has no columns".into()));
        }

        let mut table = RecordTable::new(header.iter().map(str::to_string).collect());
        for record in reader.records() {
            let record = record.map_err(ReadFailure::from)?;
            table.rows.push(record_to_row(&record));
        }
        Ok(table)
    }

    /// Writes header and rows. A table without columns cannot be written.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        if self.columns.is_empty() {
            return Err(PipelineError::Config(
                "cannot write a table with no columns".into(),
            ));
        }
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug)]
pub enum ReadFailure {
    Malformed(String),
    Io(std::io::Error),
}

impl From<csv::Error> for ReadFailure {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => ReadFailure::Io(io),
                other => ReadFailure::Malformed(format!("{other:?}")),
            }
        } else {
            ReadFailure::Malformed(err.to_string())
        }
    }
}

fn record_to_row(record: &StringRecord) -> Row {
    record
        .iter()
        .map(|field| {
            if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            }
        })
        .collect()
}
