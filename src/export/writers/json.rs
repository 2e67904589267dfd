//! JSON writer for export operations
//!
//! Records are written as one pretty-printed array with 2-space indentation. Each
//! record is serialized on its own and indented into the array, so the array can be
//! streamed batch by batch.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;

use super::{ExportRecord, FormatWriter, create_writer, file_size, write_error};

/// Writer for JSON array format
pub struct JsonWriter<R> {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
    _record: PhantomData<fn(&R)>,
}

/// Serializes key/value pairs as a JSON object, keeping their order.
pub struct OrderedObject<'a>(pub &'a [(&'a str, &'a str)]);

impl Serialize for OrderedObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Pretty JSON with 2-space indentation.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl JsonWriter<()> {
    /// Write a single JSON document to `path`, returning the file size.
    pub async fn write_document<T: Serialize + ?Sized>(path: &Path, document: &T) -> Result<u64> {
        let mut json = to_pretty_json(document)?;
        json.push('\n');
        tokio::fs::write(path, json.as_bytes())
            .await
            .map_err(|e| write_error(path, e))?;
        debug!("Wrote JSON document: {}", path.display());
        Ok(json.len() as u64)
    }
}

impl<R: ExportRecord> JsonWriter<R> {
    pub async fn new(path: &Path) -> Result<Self> {
        let writer = create_writer(path).await?;
        debug!("Created JSON writer for: {}", path.display());
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
            _record: PhantomData,
        })
    }

    async fn write_str(&mut self, s: &str) -> Result<()> {
        self.writer
            .write_all(s.as_bytes())
            .await
            .map_err(|e| write_error(&self.path, e))
    }
}

#[async_trait]
impl<R: ExportRecord> FormatWriter<R> for JsonWriter<R> {
    async fn write_batch(&mut self, records: &[R]) -> Result<usize> {
        for record in records {
            let json = to_pretty_json(record)?;
            let indented = json
                .lines()
                .map(|line| format!("  {line}"))
                .collect::<Vec<_>>()
                .join("\n");

            let separator = if self.written == 0 { "[\n" } else { ",\n" };
            self.write_str(separator).await?;
            self.write_str(&indented).await?;
            self.written += 1;
        }
        debug!("Wrote {} records to JSON (total: {})", records.len(), self.written);
        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        let footer = if self.written == 0 { "[]\n" } else { "\n]\n" };
        self.write_str(footer).await?;
        self.writer
            .flush()
            .await
            .map_err(|e| write_error(&self.path, e))?;
        debug!("Finalized JSON file: {} ({} records)", self.path.display(), self.written);
        Ok(())
    }

    async fn file_size(&self) -> Result<u64> {
        file_size(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;
    use tokio::fs;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: i32,
        text: String,
        from_id: Option<i64>,
    }

    impl ExportRecord for Note {
        const CSV_HEADER: &'static [&'static str] = &["ID", "Text", "From ID"];

        fn csv_row(&self) -> Vec<String> {
            vec![self.id.to_string(), self.text.clone(), String::new()]
        }
    }

    #[tokio::test]
    async fn test_json_array_matches_pretty_printer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let notes = vec![
            Note { id: 2, text: "line\nbreak \"quoted\"".into(), from_id: None },
            Note { id: 1, text: "plain".into(), from_id: Some(7) },
        ];

        let mut writer = JsonWriter::new(&path).await.unwrap();
        writer.write_batch(&notes[..1]).await.unwrap();
        writer.write_batch(&notes[1..]).await.unwrap();
        writer.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, format!("{}\n", to_pretty_json(&notes).unwrap()));

        let parsed: Vec<Note> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, notes);
        assert!(content.contains("\"from_id\": null"));
    }

    #[tokio::test]
    async fn test_empty_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut writer: JsonWriter<Note> = JsonWriter::new(&path).await.unwrap();
        writer.finalize().await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "[]\n");
    }

    #[tokio::test]
    async fn test_document_keeps_key_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let entries = [("Zeta", "1"), ("Alpha", "2")];
        JsonWriter::<()>::write_document(&path, &OrderedObject(&entries))
            .await
            .unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "{\n  \"Zeta\": \"1\",\n  \"Alpha\": \"2\"\n}\n");
    }
}
