//! Claim/move state machine.
//!
//! Moving a file between stage directories is the only coordination between
//! concurrent runs: whichever run renames `inbox/<name>` first owns it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::layout::{DirectoryLayout, Stage};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{0} is already in processing")]
    AlreadyClaimed(String),
    #[error("{0} is no longer in the inbox")]
    Vanished(String),
    #[error("Failed to claim {file_name}: {source}")]
    Io {
        file_name: String,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle state of a claimed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkStatus {
    Claimed,
    Processed,
    Failed(String),
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Claimed => "claimed",
            WorkStatus::Processed => "processed",
            WorkStatus::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            WorkStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// One file owned by this run.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Correlation id for logs; not used for deduplication.
    pub id: String,
    pub file_name: String,
    pub stage: Stage,
    pub status: WorkStatus,
}

impl WorkItem {
    /// A freshly claimed item sitting in `processing`.
    pub fn claimed(file_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            stage: Stage::Processing,
            status: WorkStatus::Claimed,
        }
    }

    pub fn current_path(&self, layout: &DirectoryLayout) -> PathBuf {
        layout.stage_path(self.stage, &self.file_name)
    }
}

/// Move `inbox/<file_name>` into `processing/`.
///
/// A same-named file already in `processing` is an orphan or another run's
/// claim; it is never overwritten.
pub async fn claim(layout: &DirectoryLayout, file_name: &str) -> Result<WorkItem, ClaimError> {
    let source = layout.stage_path(Stage::Inbox, file_name);
    let target = layout.stage_path(Stage::Processing, file_name);

    if fs::try_exists(&target).await.unwrap_or(false) {
        return Err(ClaimError::AlreadyClaimed(file_name.to_string()));
    }

    match fs::rename(&source, &target).await {
        Ok(()) => {
            let item = WorkItem::claimed(file_name);
            debug!("[{}] claimed {}", item.id, file_name);
            Ok(item)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ClaimError::Vanished(file_name.to_string()))
        }
        Err(e) => Err(ClaimError::Io {
            file_name: file_name.to_string(),
            source: e,
        }),
    }
}

/// Move a claimed file into `processed/`, replacing any stale copy there.
pub async fn finalize_success(
    layout: &DirectoryLayout,
    item: &mut WorkItem,
) -> io::Result<PathBuf> {
    let source = item.current_path(layout);
    let target = layout.stage_path(Stage::Processed, &item.file_name);

    match fs::remove_file(&target).await {
        Ok(()) => debug!("[{}] replaced stale {}", item.id, target.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(&source, &target).await?;

    item.stage = Stage::Processed;
    item.status = WorkStatus::Processed;
    Ok(target)
}

/// Move a claimed file into `failed/`.
///
/// Best-effort: a failed move is logged and the file stays in `processing`.
/// Returns the final location when the move succeeded.
pub async fn finalize_failure(
    layout: &DirectoryLayout,
    item: &mut WorkItem,
    error: &str,
) -> Option<PathBuf> {
    item.status = WorkStatus::Failed(error.to_string());

    let source = item.current_path(layout);
    let target = layout.stage_path(Stage::Failed, &item.file_name);

    match fs::rename(&source, &target).await {
        Ok(()) => {
            item.stage = Stage::Failed;
            Some(target)
        }
        Err(e) => {
            warn!(
                "[{}] could not move {} to failed, left in processing: {}",
                item.id, item.file_name, e
            );
            None
        }
    }
}
