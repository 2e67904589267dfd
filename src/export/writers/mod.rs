//! Format writers for export operations
//!
//! Every category record implements [`ExportRecord`], which fixes its CSV header and
//! column order. JSON output derives from the record's `Serialize` impl, so keys
//! follow the declared field order.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing::info;

use crate::error::{ExportError, Result};

pub mod csv;
pub mod json;

pub use csv::CsvWriter;
pub use json::JsonWriter;

/// Timestamp layout used in file names and exported dates.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A row of exported data.
pub trait ExportRecord: Serialize + Send + Sync + Sized {
    const CSV_HEADER: &'static [&'static str];

    /// Written as one JSON object of key/value pairs instead of an array.
    const JSON_OBJECT: bool = false;

    fn csv_row(&self) -> Vec<String>;

    /// Key/value pair for [`ExportRecord::JSON_OBJECT`] records.
    fn json_entry(&self) -> Option<(&str, &str)> {
        None
    }

    /// Order the full record set before it is written.
    fn sort(_records: &mut [Self]) {}
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Trait for writing records to different file formats
#[async_trait]
pub trait FormatWriter<R: ExportRecord>: Send {
    /// Write a batch of records, returning how many were written
    async fn write_batch(&mut self, records: &[R]) -> Result<usize>;

    /// Finalize the output (flush buffers, write footers, etc.)
    async fn finalize(&mut self) -> Result<()>;

    /// Get the current file size in bytes
    async fn file_size(&self) -> Result<u64>;
}

/// What ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub records: usize,
    pub bytes: u64,
}

/// Format a unix timestamp (seconds) as `yyyyMMdd_HHmmss` in UTC.
pub fn format_timestamp(unix_seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_seconds, 0)
        .unwrap_or_default()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// The current time as `yyyyMMdd_HHmmss` in UTC.
pub fn run_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<stem>_<timestamp>.<ext>`
pub fn export_file_name(stem: &str, timestamp: &str, format: ExportFormat) -> String {
    format!("{}_{}.{}", stem, timestamp, format.extension())
}

/// Write the full record set to `path` in `format`, creating parent directories.
pub async fn write_records<R: ExportRecord>(
    records: &[R],
    format: ExportFormat,
    path: &Path,
) -> Result<WriteSummary> {
    ensure_parent(path).await?;

    let bytes = match format {
        ExportFormat::Csv => {
            let mut writer = CsvWriter::<R>::new(path).await?;
            drive(&mut writer, records).await?
        }
        ExportFormat::Json if R::JSON_OBJECT => {
            let entries: Vec<(&str, &str)> = records.iter().filter_map(|r| r.json_entry()).collect();
            JsonWriter::<()>::write_document(path, &json::OrderedObject(&entries)).await?
        }
        ExportFormat::Json => {
            let mut writer = JsonWriter::<R>::new(path).await?;
            drive(&mut writer, records).await?
        }
    };

    info!("Wrote {} records to {} ({} bytes)", records.len(), path.display(), bytes);
    Ok(WriteSummary {
        path: path.to_path_buf(),
        records: records.len(),
        bytes,
    })
}

async fn drive<R, W>(writer: &mut W, records: &[R]) -> Result<u64>
where
    R: ExportRecord,
    W: FormatWriter<R>,
{
    writer.write_batch(records).await?;
    writer.finalize().await?;
    writer.file_size().await
}

/// Create every missing directory above `path`.
pub(crate) async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent).await?;
    }
    Ok(())
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        ExportError::DirectoryCreate {
            path: dir.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Helper function to create a buffered file writer
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await.map_err(|e| write_error(path, e))?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

pub(crate) fn write_error(path: &Path, err: std::io::Error) -> crate::error::TakeoutError {
    ExportError::Write {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
    .into()
}

pub(crate) async fn file_size(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| write_error(path, e))?;
    Ok(metadata.len())
}
