//! Generation backends.
//!
//! Every reviewer and the fix engine talk to text generation through the
//! [`GenerationBackend`] trait. Concrete backends:
//!
//! - [`CliBackend`]: spawns a local command and writes the prompt to stdin
//! - [`HttpBackend`]: OpenAI-compatible `chat/completions` endpoint
//!
//! [`GuardedBackend`] wraps either one with the cancellation check and
//! transient-failure retry that every call goes through, and meters token
//! usage into a [`UsageMeter`].

mod cli;
mod guarded;
mod http;
mod usage;

pub use cli::CliBackend;
pub use guarded::{GuardedBackend, RetryPolicy};
pub use http::HttpBackend;
pub use usage::{Generation, TokenUsage, UsageMeter, estimate_tokens};

use async_trait::async_trait;

use crate::errors::GenerationError;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Cancellation scope, normally the manuscript id.
    pub context_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 4000,
            temperature: 0.1,
            context_id: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

/// A text generation backend.
///
/// Implementations report retryable failures as
/// [`GenerationError::Transient`] and everything else as
/// [`GenerationError::Rejected`].
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Like `generate`, with token counts when the provider reports them.
    async fn generate_detailed(
        &self,
        request: GenerationRequest,
    ) -> Result<Generation, GenerationError> {
        self.generate(request).await.map(Generation::new)
    }
}
