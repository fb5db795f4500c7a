use futures::StreamExt;

use parley_core::errors::BackendError;
use parley_core::events::StreamEvent;
use parley_core::generator::{GenerationRequest, TextGenerator};

use crate::sink::EventSink;

/// Run one streamed completion to the end and return the full text.
///
/// Each increment is forwarded as `tokens_arrived` when a sink is given. An
/// error item ends the stream and is returned as-is.
pub(crate) async fn drain(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    sink: Option<&dyn EventSink>,
) -> Result<String, BackendError> {
    let mut stream = generator.stream(request).await?;
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        let chunk = item?;
        if chunk.is_empty() {
            continue;
        }
        if let Some(sink) = sink {
            sink.emit(StreamEvent::TokensArrived(chunk.clone())).await;
        }
        text.push_str(&chunk);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use parley_core::prompt::Prompt;
    use parley_llm::mock::{MockGenerator, MockResponse};

    use super::*;
    use crate::sink::RecordingSink;

    #[tokio::test]
    async fn forwards_increments_in_order() {
        let generator = MockGenerator::new(vec![MockResponse::chunks(["Hel", "", "lo."])]);
        let sink = RecordingSink::new();
        let text = drain(&generator, &GenerationRequest::new(Prompt::Text("p".into())), Some(&sink))
            .await
            .unwrap();
        assert_eq!(text, "Hello.");
        assert_eq!(sink.count("tokens_arrived"), 2);
        assert_eq!(sink.tokens(), "Hello.");
    }

    #[tokio::test]
    async fn mid_stream_error_is_returned() {
        let generator = MockGenerator::new(vec![MockResponse::FailMidStream(
            vec!["partial".into()],
            BackendError::StreamInterrupted("reset".into()),
        )]);
        let err = drain(&generator, &GenerationRequest::new(Prompt::Text("p".into())), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::StreamInterrupted(_)));
    }
}
