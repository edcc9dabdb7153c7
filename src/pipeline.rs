//! Folder pipeline driver.
//!
//! Scan the inbox once, then for each file in order: claim, extract, validate,
//! write the text artifact and manifest entry, and move the file to its final
//! stage. Files are processed strictly one at a time; the claim rename is the
//! only thing that keeps concurrent runs apart.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::claim::{self, ClaimError, WorkItem};
use crate::extraction::{ExtractionError, Extractor};
use crate::layout::{DirectoryLayout, Stage};
use crate::manifest::{ManifestEntry, ManifestError, ManifestLog};
use crate::output::{self, BatchFile, BatchWriter};
use crate::scanner;
use crate::validate::{self, ValidationError};

/// Errors that stop a run before any file is touched.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to prepare directories: {0}")]
    Layout(#[source] io::Error),
    #[error("Failed to scan inbox {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a claimed file ended up in `failed`.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Progress events for whoever is watching the run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        total_files: usize,
    },
    FileClaimed {
        id: String,
        file_name: String,
    },
    FileSkipped {
        file_name: String,
        reason: String,
    },
    FileProcessed {
        id: String,
        file_name: String,
        output_path: PathBuf,
        alphanumeric_chars: usize,
        /// The move to `processed` did not happen; the file is still in `processing`.
        orphaned: bool,
    },
    FileFailed {
        id: String,
        file_name: String,
        error: String,
        /// The move to `failed` did not happen; the file is still in `processing`.
        orphaned: bool,
    },
    RunCompleted {
        summary: RunSummary,
    },
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: usize,
    pub claimed: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    /// Files left in `processing` because their final move failed.
    pub orphaned: usize,
}

struct Completed {
    output_path: PathBuf,
    alphanumeric_chars: usize,
}

/// One pipeline run over a directory layout.
pub struct Pipeline {
    layout: DirectoryLayout,
    extractor: Arc<dyn Extractor>,
    manifest: ManifestLog,
    batch: Option<BatchWriter>,
}

impl Pipeline {
    pub fn new(layout: DirectoryLayout, extractor: Arc<dyn Extractor>) -> Self {
        let manifest = ManifestLog::new(layout.manifest_path());
        Self {
            layout,
            extractor,
            manifest,
            batch: None,
        }
    }

    /// Also maintain a batch JSON document at `path`.
    pub fn with_batch_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.batch = Some(BatchWriter::new(path));
        self
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn manifest(&self) -> &ManifestLog {
        &self.manifest
    }

    /// Process every file present in the inbox when the run starts.
    pub async fn run(
        &mut self,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<RunSummary, PipelineError> {
        self.layout
            .ensure_directories()
            .map_err(PipelineError::Layout)?;

        let files = scanner::scan_inbox(&self.layout.inbox)
            .await
            .map_err(|source| PipelineError::Scan {
                path: self.layout.inbox.clone(),
                source,
            })?;

        let mut summary = RunSummary {
            scanned: files.len(),
            ..Default::default()
        };
        info!("Found {} file(s) in {}", files.len(), self.layout.inbox.display());
        let _ = events
            .send(PipelineEvent::RunStarted {
                total_files: files.len(),
            })
            .await;

        for file_name in files {
            let mut item = match claim::claim(&self.layout, &file_name).await {
                Ok(item) => item,
                Err(e) => {
                    log_skip(&e);
                    summary.skipped += 1;
                    let _ = events
                        .send(PipelineEvent::FileSkipped {
                            file_name,
                            reason: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };
            summary.claimed += 1;
            let _ = events
                .send(PipelineEvent::FileClaimed {
                    id: item.id.clone(),
                    file_name: item.file_name.clone(),
                })
                .await;

            let work_path = item.current_path(&self.layout);
            match self.process_claimed(&item, &work_path).await {
                Ok(done) => self.finish_success(&mut item, done, &mut summary, events).await,
                Err(e) => {
                    self.finish_failure(&mut item, &work_path, &e, &mut summary, events)
                        .await
                }
            }
        }

        info!(
            "Run complete: {} processed, {} failed, {} skipped",
            summary.processed, summary.failed, summary.skipped
        );
        let _ = events.send(PipelineEvent::RunCompleted { summary }).await;
        Ok(summary)
    }

    /// Everything between claim and final placement. The manifest entry is the
    /// last step, so any error here means nothing has been recorded yet and
    /// no text artifact is left behind.
    async fn process_claimed(
        &mut self,
        item: &WorkItem,
        work_path: &Path,
    ) -> Result<Completed, ProcessError> {
        let image = tokio::fs::read(work_path)
            .await
            .map_err(|source| ProcessError::Read {
                path: work_path.to_path_buf(),
                source,
            })?;
        let mime_type = scanner::mime_type_for(&item.file_name);

        let result = self.extractor.extract(&image, &mime_type).await?;
        let alphanumeric_chars = validate::validate(&result)?;

        let output_path = self.layout.text_output_path(&item.file_name);
        let artifact = output::render_text_artifact(&item.file_name, Utc::now(), &result);
        output::write_text_artifact(&output_path, &artifact)
            .await
            .map_err(|source| ProcessError::Output {
                path: output_path.clone(),
                source,
            })?;

        if let Err(e) = self
            .manifest
            .append(&ManifestEntry::processed(item, work_path, &output_path))
            .await
        {
            // A file that ends up in `failed` has no text output.
            if let Err(remove) = output::discard_text_artifact(&output_path).await {
                error!(
                    "[{}] could not remove {}: {}",
                    item.id,
                    output_path.display(),
                    remove
                );
            }
            return Err(e.into());
        }

        // Batch output is auxiliary: the manifest already says processed.
        if let Some(batch) = self.batch.as_mut() {
            if let Err(e) = batch
                .push(BatchFile::from_result(&item.file_name, &result))
                .await
            {
                warn!(
                    "[{}] failed to update batch document {}: {}",
                    item.id,
                    batch.path().display(),
                    e
                );
            }
        }

        Ok(Completed {
            output_path,
            alphanumeric_chars,
        })
    }

    async fn finish_success(
        &self,
        item: &mut WorkItem,
        done: Completed,
        summary: &mut RunSummary,
        events: &mpsc::Sender<PipelineEvent>,
    ) {
        match claim::finalize_success(&self.layout, item).await {
            Ok(path) => {
                info!("[{}] {} -> {}", item.id, item.file_name, path.display());
                summary.processed += 1;
                let _ = events
                    .send(PipelineEvent::FileProcessed {
                        id: item.id.clone(),
                        file_name: item.file_name.clone(),
                        output_path: done.output_path,
                        alphanumeric_chars: done.alphanumeric_chars,
                        orphaned: false,
                    })
                    .await;
            }
            Err(e) => {
                // Already recorded as processed; leave it for the operator.
                error!(
                    "[{}] {} was processed but could not be moved out of {}: {}",
                    item.id,
                    item.file_name,
                    Stage::Processing,
                    e
                );
                summary.processed += 1;
                summary.orphaned += 1;
                let _ = events
                    .send(PipelineEvent::FileProcessed {
                        id: item.id.clone(),
                        file_name: item.file_name.clone(),
                        output_path: done.output_path,
                        alphanumeric_chars: done.alphanumeric_chars,
                        orphaned: true,
                    })
                    .await;
            }
        }
    }

    async fn finish_failure(
        &self,
        item: &mut WorkItem,
        work_path: &Path,
        failure: &ProcessError,
        summary: &mut RunSummary,
        events: &mpsc::Sender<PipelineEvent>,
    ) {
        let message = failure.to_string();
        warn!("[{}] {} failed: {}", item.id, item.file_name, message);

        if let Err(e) = self
            .manifest
            .append(&ManifestEntry::failed(item, work_path, &message))
            .await
        {
            error!("[{}] could not record failure in manifest: {}", item.id, e);
        }

        let moved = claim::finalize_failure(&self.layout, item, &message).await;
        summary.failed += 1;
        if moved.is_none() {
            summary.orphaned += 1;
        }
        let _ = events
            .send(PipelineEvent::FileFailed {
                id: item.id.clone(),
                file_name: item.file_name.clone(),
                error: message,
                orphaned: moved.is_none(),
            })
            .await;
    }
}

fn log_skip(e: &ClaimError) {
    match e {
        ClaimError::Io { .. } => warn!("Skipping: {}", e),
        _ => info!("Skipping: {}", e),
    }
}
