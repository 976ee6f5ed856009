//! The streaming completion boundary (§4.2). An `LlmProvider` is the only
//! thing a turn executor knows about its model: give it a request and a
//! cancel token, get back a stream of [`StreamEvent`]s in order.

use crate::request::LlmRequest;
use futures::Stream;
use nexus3_core::{CancelToken, StreamEvent};
use std::pin::Pin;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<LlmError> for nexus3_core::Error {
    fn from(e: LlmError) -> Self {
        nexus3_core::Error::ProviderError(e.to_string())
    }
}

/// Stream type for LLM responses, yielding core [`StreamEvent`]s directly —
/// callers never see a provider-specific wire shape.
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// An LLM completion backend. Implementations own their own retry and
/// wire-format concerns; callers only ever see [`StreamEvent`]s.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn models(&self) -> &[String];

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }

    /// Stream a completion response. If `cancel` is provided and triggered,
    /// the underlying request is dropped and the stream yields `LlmError::Cancelled`.
    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancelToken>,
    ) -> LlmResult<LlmStream>;
}
