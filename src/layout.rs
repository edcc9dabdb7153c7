//! Stage directories for the folder pipeline.
//!
//! A file lives in exactly one of `inbox`, `processing`, `processed` or
//! `failed` at any instant. `output` holds the text artifacts and the manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Manifest filename inside the output directory.
pub const MANIFEST_FILENAME: &str = "manifest.jsonl";

/// Directories a scanned file moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Inbox,
    Processing,
    Processed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Inbox => "inbox",
            Stage::Processing => "processing",
            Stage::Processed => "processed",
            Stage::Failed => "failed",
        }
    }

    pub fn all() -> [Stage; 4] {
        [
            Stage::Inbox,
            Stage::Processing,
            Stage::Processed,
            Stage::Failed,
        ]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved locations of every stage directory plus the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub inbox: PathBuf,
    pub processing: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
    pub output: PathBuf,
}

impl DirectoryLayout {
    /// Conventional layout: every directory is a child of `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            inbox: root.join(Stage::Inbox.as_str()),
            processing: root.join(Stage::Processing.as_str()),
            processed: root.join(Stage::Processed.as_str()),
            failed: root.join(Stage::Failed.as_str()),
            output: root.join("output"),
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Inbox => &self.inbox,
            Stage::Processing => &self.processing,
            Stage::Processed => &self.processed,
            Stage::Failed => &self.failed,
        }
    }

    /// Path `file_name` would have inside `stage`.
    pub fn stage_path(&self, stage: Stage, file_name: &str) -> PathBuf {
        self.stage_dir(stage).join(file_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output.join(MANIFEST_FILENAME)
    }

    /// Text artifact path for a source file: `output/<basename>.txt`.
    pub fn text_output_path(&self, file_name: &str) -> PathBuf {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        self.output.join(format!("{}.txt", stem))
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> io::Result<()> {
        let dirs = [
            ("inbox", &self.inbox),
            ("processing", &self.processing),
            ("processed", &self.processed),
            ("failed", &self.failed),
            ("output", &self.output),
        ];
        for (label, dir) in dirs {
            fs::create_dir_all(dir).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
            tracing::debug!("{} directory ready: {}", label, dir.display());
        }
        Ok(())
    }

    /// Which stage directories currently hold `file_name`.
    pub fn locate(&self, file_name: &str) -> Vec<Stage> {
        Stage::all()
            .into_iter()
            .filter(|stage| self.stage_path(*stage, file_name).is_file())
            .collect()
    }
}
