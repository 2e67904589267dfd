//! CSV writer for export operations
//!
//! Writes the record type's fixed header row first, then one row per record.
//! Values are escaped per RFC 4180 and lines end with `\n`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;

use super::{ExportRecord, FormatWriter, create_writer, file_size, write_error};

/// Writer for CSV format
pub struct CsvWriter<R> {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
    _record: PhantomData<fn(&R)>,
}

impl<R: ExportRecord> CsvWriter<R> {
    /// Create the file and write the header row
    pub async fn new(path: &Path) -> Result<Self> {
        let mut writer = Self {
            writer: create_writer(path).await?,
            path: path.to_path_buf(),
            written: 0,
            _record: PhantomData,
        };
        let header: Vec<String> = R::CSV_HEADER.iter().map(|h| h.to_string()).collect();
        writer.write_line(&header).await?;

        debug!("Created CSV writer for: {}", path.display());
        Ok(writer)
    }

    async fn write_line(&mut self, values: &[String]) -> Result<()> {
        let line = values
            .iter()
            .map(|v| escape_csv_value(v))
            .collect::<Vec<_>>()
            .join(",");
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| write_error(&self.path, e))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| write_error(&self.path, e))
    }
}

/// Escape a CSV value if necessary
pub fn escape_csv_value(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl<R: ExportRecord> FormatWriter<R> for CsvWriter<R> {
    async fn write_batch(&mut self, records: &[R]) -> Result<usize> {
        for record in records {
            self.write_line(&record.csv_row()).await?;
        }
        self.written += records.len();
        debug!("Wrote {} rows to CSV (total: {})", records.len(), self.written);
        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| write_error(&self.path, e))?;
        debug!("Finalized CSV file: {} ({} rows)", self.path.display(), self.written);
        Ok(())
    }

    async fn file_size(&self) -> Result<u64> {
        file_size(&self.path).await
    }
}
