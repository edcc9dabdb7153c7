//! HTTP extraction client.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::provider::VisionProvider;
use super::retry::{send_with_retry, RetryPolicy};
use super::shape::{ExtractionResult, ResultShape};
use super::transport::{ReqwestTransport, Transport};
use super::{ExtractionError, Extractor};

/// Settings for the vision client, resolved once at startup.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub provider: VisionProvider,
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub shape: ResultShape,
    pub request_timeout: Duration,
}

impl VisionConfig {
    /// Config with the provider's default endpoint and model.
    pub fn new(provider: VisionProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            endpoint: provider.default_endpoint().to_string(),
            model: provider.default_model().to_string(),
            api_key: api_key.into(),
            shape: ResultShape::default(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Extraction client for a vision API.
pub struct VisionClient<T = ReqwestTransport> {
    config: VisionConfig,
    transport: T,
    retry: RetryPolicy,
}

impl VisionClient<ReqwestTransport> {
    /// Create a client that talks HTTP via `reqwest`.
    pub fn new(config: VisionConfig) -> Result<Self, ExtractionError> {
        let transport = ReqwestTransport::new(config.request_timeout)
            .map_err(|e| ExtractionError::InvalidRequest(e.0))?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> VisionClient<T> {
    pub fn with_transport(config: VisionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }
}

#[async_trait]
impl<T: Transport> Extractor for VisionClient<T> {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let config = &self.config;
        let spec = config.provider.build_request(
            &config.endpoint,
            &config.model,
            &config.api_key,
            config.shape.instruction(),
            image,
            mime_type,
        )?;
        debug!(
            "{}: sending {} byte {} image to {}",
            config.provider,
            image.len(),
            mime_type,
            config.model
        );

        let body = send_with_retry(&self.retry, || self.transport.send(&spec)).await?;

        // Content problems past this point are final; no retry.
        let message = config.provider.extract_message(&body)?;
        config.shape.parse(&message)
    }
}
