use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::BackendError;
use crate::generation::{ImagePayload, SamplingConfig};
use crate::prompt::Prompt;

/// Incremental text produced by a backend. An `Err` item ends the stream.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// One completion request.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub prompt: Prompt,
    pub sampling: SamplingConfig,
    /// Generation halts right after emitting any of these.
    pub stop: Vec<String>,
    pub clear_context: bool,
    pub image: Option<ImagePayload>,
}

impl GenerationRequest {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            sampling: SamplingConfig::default(),
            stop: Vec::new(),
            clear_context: false,
            image: None,
        }
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }
}

/// A streaming text generator: an inference backend or a wrapper around one.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, BackendError>;
}
