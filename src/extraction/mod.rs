//! Boundary around the external vision text-extraction service.
//!
//! The pipeline only sees the [`Extractor`] trait. [`VisionClient`] is the
//! HTTP implementation: it builds one [`RequestSpec`] per image, sends it with
//! bounded retry, and parses the model's JSON answer according to a
//! [`ResultShape`].

mod client;
mod provider;
mod retry;
mod shape;
mod transport;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{VisionClient, VisionConfig};
pub use provider::VisionProvider;
pub use retry::{send_with_retry, RetryPolicy, BACKOFF_STEP, MAX_ATTEMPTS};
pub use shape::{strip_code_fence, ExtractionResult, ResultShape, TextBlock};
pub use transport::{ReqwestTransport, RequestSpec, Transport, TransportError, TransportResponse};

/// Errors from the extraction boundary.
///
/// `Status` and `Request` are transport failures and are only produced once
/// the retry budget is spent. The rest are content failures and are never
/// retried.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction service returned HTTP {status} after {attempts} attempts: {body}")]
    Status {
        status: u16,
        body: String,
        attempts: u32,
    },

    #[error("Extraction request failed after {attempts} attempts: {message}")]
    Request { message: String, attempts: u32 },

    #[error("Unexpected response from {provider}: {message}")]
    Envelope {
        provider: VisionProvider,
        message: String,
    },

    #[error("Malformed extraction result: {0}")]
    Malformed(String),

    #[error("Extraction result contained no text segments")]
    Empty,

    #[error("Failed to build extraction request: {0}")]
    InvalidRequest(String),
}

impl ExtractionError {
    /// Whether this failure came from the transport rather than the content.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExtractionError::Status { .. } | ExtractionError::Request { .. }
        )
    }
}

/// Turns image bytes into structured text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract text from one image.
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError>;
}
