use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use parley_core::errors::BackendError;
use parley_core::generator::{GenerationRequest, TextGenerator, TokenStream};

const DEFAULT_PHRASE: &str = "The quick brown fox jumps over the lazy dog .";

/// Offline backend that streams a fixed phrase word by word.
///
/// Used for demos and for exercising the pipeline without a model server.
pub struct DummyGenerator {
    phrase: String,
    delay: Duration,
}

impl DummyGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            phrase: DEFAULT_PHRASE.to_string(),
            delay,
        }
    }

    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = phrase.into();
        self
    }

    fn increments(&self) -> Vec<String> {
        self.phrase
            .split_whitespace()
            .map(|word| format!(" {word}"))
            .collect()
    }
}

impl Default for DummyGenerator {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl TextGenerator for DummyGenerator {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn stream(&self, _request: &GenerationRequest) -> Result<TokenStream, BackendError> {
        let delay = self.delay;
        let stream = futures::stream::iter(self.increments()).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(word)
        });
        Ok(Box::pin(stream))
    }
}
