//! scanbox - folder-based OCR pipeline.
//!
//! Watches an inbox directory for scanned document images, sends each one to
//! a vision model for text extraction, and records every outcome in an
//! append-only manifest. Stage directories double as the lock: a file is
//! owned by whichever run renamed it into `processing/`.

pub mod claim;
pub mod cli;
pub mod config;
pub mod extraction;
pub mod layout;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod scanner;
pub mod status;
pub mod validate;

pub use config::{Config, ConfigError, Settings};
pub use extraction::{ExtractionError, ExtractionResult, Extractor, ResultShape};
pub use layout::{DirectoryLayout, Stage};
pub use pipeline::{Pipeline, PipelineEvent, RunSummary};
