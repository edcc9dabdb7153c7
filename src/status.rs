//! Read-only snapshot of a directory layout.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::layout::{DirectoryLayout, Stage};
use crate::manifest::{ManifestError, ManifestLog, ManifestStatus};
use crate::scanner;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Files currently in each stage directory, in [`Stage::all`] order.
    pub stage_counts: Vec<(Stage, usize)>,
    /// Files in `processing`. Unless a run is in progress, each one is an
    /// orphan left by an interrupted run or a failed final move.
    pub orphans: Vec<String>,
    pub manifest_processed: usize,
    pub manifest_failed: usize,
}

impl StatusReport {
    pub fn count(&self, stage: Stage) -> usize {
        self.stage_counts
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn manifest_total(&self) -> usize {
        self.manifest_processed + self.manifest_failed
    }
}

/// Build a report without changing anything on disk. Missing directories
/// count as empty.
pub async fn collect_status(layout: &DirectoryLayout) -> Result<StatusReport, StatusError> {
    let mut report = StatusReport::default();

    for stage in Stage::all() {
        let names = list_stage(layout, stage).await.map_err(|source| StatusError::List {
            path: layout.stage_dir(stage).to_path_buf(),
            source,
        })?;
        if stage == Stage::Processing {
            report.orphans = names.clone();
        }
        report.stage_counts.push((stage, names.len()));
    }

    let entries = ManifestLog::new(layout.manifest_path()).read_entries().await?;
    for entry in entries {
        match entry.status {
            ManifestStatus::Processed => report.manifest_processed += 1,
            ManifestStatus::Failed => report.manifest_failed += 1,
        }
    }

    Ok(report)
}

async fn list_stage(layout: &DirectoryLayout, stage: Stage) -> io::Result<Vec<String>> {
    match scanner::list_files(layout.stage_dir(stage)).await {
        Ok(names) => Ok(names),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
