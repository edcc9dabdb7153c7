//! Append-only manifest of per-file outcomes.
//!
//! One JSON object per line. Lines are only ever appended and each append is
//! synced before the caller moves the file to its final stage, so the log is
//! the durable record of what happened even when the process dies mid-run.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::claim::WorkItem;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to write manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize manifest entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Final outcome recorded for a claimed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Processed,
    Failed,
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub file_name: String,
    /// Where the file sat while it was being processed.
    pub work_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub status: ManifestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_utc: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn processed(item: &WorkItem, work_path: &Path, output_path: &Path) -> Self {
        Self {
            id: item.id.clone(),
            file_name: item.file_name.clone(),
            work_path: work_path.display().to_string(),
            output_path: Some(output_path.display().to_string()),
            status: ManifestStatus::Processed,
            error: None,
            processed_utc: Utc::now(),
        }
    }

    pub fn failed(item: &WorkItem, work_path: &Path, error: &str) -> Self {
        Self {
            id: item.id.clone(),
            file_name: item.file_name.clone(),
            work_path: work_path.display().to_string(),
            output_path: None,
            status: ManifestStatus::Failed,
            error: Some(error.to_string()),
            processed_utc: Utc::now(),
        }
    }
}

/// Handle on the manifest file.
#[derive(Debug, Clone)]
pub struct ManifestLog {
    path: PathBuf,
}

impl ManifestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append one entry and sync it to disk.
    pub async fn append(&self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        file.sync_data().await.map_err(|e| self.io_error(e))?;

        tracing::debug!(
            "[{}] manifest: {} {:?}",
            entry.id,
            entry.file_name,
            entry.status
        );
        Ok(())
    }

    /// Read every parseable entry.
    ///
    /// A line that fails to parse (e.g. torn by a crash mid-write) is skipped
    /// with a warning. A missing manifest reads as empty.
    pub async fn read_entries(&self) -> Result<Vec<ManifestEntry>, ManifestError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    "Skipping unreadable manifest line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}
