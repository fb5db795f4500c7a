use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use parley_core::errors::BackendError;
use parley_core::generator::{GenerationRequest, TextGenerator, TokenStream};

/// Pre-programmed responses for deterministic testing without a backend.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield these text increments, then end.
    Chunks(Vec<String>),
    /// Return an error from the stream() call itself.
    Error(BackendError),
    /// Yield some increments, then end the stream with an error item.
    FailMidStream(Vec<String>, BackendError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A single-increment text response.
    pub fn text(text: &str) -> Self {
        Self::Chunks(vec![text.to_string()])
    }

    /// Split into word-sized increments, keeping the separating spaces.
    pub fn words(text: &str) -> Self {
        Self::Chunks(text.split_inclusive(' ').map(str::to_string).collect())
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Generator that returns pre-programmed responses in sequence.
///
/// Every request is recorded so tests can inspect the prompts the caller built.
pub struct MockGenerator {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicUsize,
}

impl MockGenerator {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Response used once the programmed queue runs dry.
    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let next = self.responses.lock().pop_front();
        let response = match next.or_else(|| self.fallback.clone()) {
            Some(response) => response,
            None => {
                return Err(BackendError::InvalidRequest(format!(
                    "MockGenerator: no response configured for call {idx}"
                )))
            }
        };
        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<TokenStream, BackendError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Chunks(chunks) => {
                return Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))));
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::FailMidStream(chunks, e) => {
                let items = chunks.into_iter().map(Ok).chain(std::iter::once(Err(e)));
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parley_core::prompt::Prompt;

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest::new(Prompt::Text(text.into()))
    }

    async fn drain(stream: TokenStream) -> Vec<Result<String, BackendError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn responses_served_in_order_and_recorded() {
        let mock = MockGenerator::new(vec![MockResponse::text("one"), MockResponse::words("two three")]);

        let first = drain(mock.stream(&request("a")).await.unwrap()).await;
        assert_eq!(first.len(), 1);
        let second: Vec<String> = drain(mock.stream(&request("b")).await.unwrap())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(second, vec!["two ", "three"]);

        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.last_request().unwrap().prompt.as_text(), Some("b"));
    }

    #[tokio::test]
    async fn exhausted_queue_errors_without_fallback() {
        let mock = MockGenerator::new(vec![]);
        let err = mock.stream(&request("a")).await.err().expect("expected error");
        assert!(matches!(err, BackendError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn fallback_repeats() {
        let mock = MockGenerator::new(vec![]).with_fallback(MockResponse::text("again"));
        for _ in 0..3 {
            assert!(mock.stream(&request("a")).await.is_ok());
        }
    }

    #[tokio::test]
    async fn fail_mid_stream_ends_with_error() {
        let mock = MockGenerator::new(vec![MockResponse::FailMidStream(
            vec!["partial".into()],
            BackendError::StreamInterrupted("reset".into()),
        )]);
        let items = drain(mock.stream(&request("a")).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
