//! Text artifacts and the optional batch JSON document.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::extraction::ExtractionResult;

const SEPARATOR: &str = "----------------------------------------";

/// Compose the human-readable text artifact for one file.
pub fn render_text_artifact(
    file_name: &str,
    processed_at: DateTime<Utc>,
    result: &ExtractionResult,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Source: {}\n", file_name));
    out.push_str(&format!(
        "Processed (UTC): {}\n",
        processed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(SEPARATOR);
    out.push_str("\n\n");
    out.push_str(&result.render_segments());
    out.push('\n');

    let notes = result.notes();
    if !notes.is_empty() {
        out.push_str("\nNotes:\n");
        for note in notes {
            out.push_str(&format!("- {}\n", note.trim()));
        }
    }
    out
}

/// Write the text artifact, replacing any previous one, and sync it to disk.
pub async fn write_text_artifact(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Remove a text artifact whose file did not end up processed.
pub async fn discard_text_artifact(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSection {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    pub name: String,
    pub sections: Vec<BatchSection>,
}

impl BatchFile {
    pub fn from_result(file_name: &str, result: &ExtractionResult) -> Self {
        Self {
            name: file_name.to_string(),
            sections: result
                .sections()
                .into_iter()
                .map(|content| BatchSection { content })
                .collect(),
        }
    }
}

/// Batch document: every file processed in this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub files: Vec<BatchFile>,
}

/// Accumulates the batch record and keeps its file on disk current.
#[derive(Debug)]
pub struct BatchWriter {
    path: PathBuf,
    record: BatchRecord,
}

impl BatchWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            record: BatchRecord::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &BatchRecord {
        &self.record
    }

    /// Add one file and rewrite the whole document.
    pub async fn push(&mut self, file: BatchFile) -> io::Result<()> {
        self.record.files.push(file);
        self.flush().await
    }

    /// Write the document via a temp file and rename so readers never see a
    /// partial write.
    pub async fn flush(&self) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, &json).await?;
        fs::rename(&temp_path, &self.path).await
    }
}
