//! Single-pass completion that resolves tool calls mid-stream.

use std::sync::Arc;

use tracing::{debug, instrument};

use parley_core::errors::BackendError;
use parley_core::events::{StreamEvent, ToolCallNotice, ToolCallReport};
use parley_core::generation::GenerationSpec;
use parley_core::generator::{GenerationRequest, TextGenerator};

use crate::protocol::{TaggedProtocol, ToolCallMatch, ToolCallProtocol};
use crate::registry::ToolRegistry;
use crate::render::ChatRenderer;
use crate::sink::EventSink;
use crate::stream::drain;

const DEFAULT_MAX_TOOL_CALLS: u32 = 8;

/// Streams a completion, pausing at each tool call to invoke the tool and
/// resuming with the rendered call and result appended to the prompt.
pub struct ToolAugmentedCompletion {
    generator: Arc<dyn TextGenerator>,
    renderer: Arc<dyn ChatRenderer>,
    protocol: Arc<dyn ToolCallProtocol>,
    tools: Arc<ToolRegistry>,
    max_tool_calls: u32,
}

impl ToolAugmentedCompletion {
    pub fn new(generator: Arc<dyn TextGenerator>, renderer: Arc<dyn ChatRenderer>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            generator,
            renderer,
            protocol: Arc::new(TaggedProtocol::default()),
            tools,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
        }
    }

    pub fn with_protocol(mut self, protocol: Arc<dyn ToolCallProtocol>) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn renderer(&self) -> &Arc<dyn ChatRenderer> {
        &self.renderer
    }

    pub fn protocol(&self) -> &Arc<dyn ToolCallProtocol> {
        &self.protocol
    }

    /// Generate from `spec.prompt` and return the full text, tool markup included.
    #[instrument(skip_all, fields(parent_id = %spec.parent_id))]
    pub async fn run(&self, spec: &GenerationSpec, sink: &dyn EventSink) -> Result<String, BackendError> {
        let mut prompt = spec.prompt.clone();
        let mut full = String::new();
        let mut calls = 0u32;

        loop {
            let intercept = calls < self.max_tool_calls;
            let request = GenerationRequest {
                prompt: prompt.clone(),
                sampling: spec.sampling.clone(),
                stop: if intercept { self.protocol.stop_words() } else { Vec::new() },
                clear_context: spec.clear_context && calls == 0,
                image: spec.image.clone(),
            };
            let segment = drain(self.generator.as_ref(), &request, Some(sink)).await?;

            let found = if intercept { self.protocol.find(&segment) } else { ToolCallMatch::NotFound };
            let ToolCallMatch::Found { call, offset } = found else {
                full.push_str(&segment);
                return Ok(full);
            };
            calls += 1;
            debug!(tool = %call.name, calls, "tool call intercepted");

            sink.emit(StreamEvent::ToolCallStarted(ToolCallNotice {
                name: call.name.clone(),
                args: call.args.to_value(),
            }))
            .await;
            let (rendered, report) = match self.tools.invoke(&call.name, &call.args).await {
                Ok(result) => (
                    self.protocol.render_with_result(&call, &result),
                    ToolCallReport {
                        name: call.name.clone(),
                        result: Some(result),
                        error: None,
                    },
                ),
                Err(e) => (
                    self.protocol.render_with_error(&call, &e.to_string()),
                    ToolCallReport {
                        name: call.name.clone(),
                        result: None,
                        error: Some(e.to_string()),
                    },
                ),
            };
            sink.emit(StreamEvent::ToolCallFinished(report)).await;

            let finalized = format!("{}{}", &segment[..offset], rendered);
            sink.emit(StreamEvent::GenerationPaused(finalized.clone())).await;
            full.push_str(&finalized);
            prompt = self.renderer.concatenate(&prompt, &finalized);
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_core::ids::NodeId;
    use parley_core::prompt::Prompt;
    use parley_llm::mock::{MockGenerator, MockResponse};

    use super::*;
    use crate::render::{ChatTemplate, StringRenderer};
    use crate::sink::RecordingSink;
    use crate::tools::create_default_registry;

    fn completion(generator: Arc<MockGenerator>) -> ToolAugmentedCompletion {
        ToolAugmentedCompletion::new(
            generator,
            Arc::new(StringRenderer::new(ChatTemplate::llama3())),
            Arc::new(create_default_registry()),
        )
    }

    fn spec() -> GenerationSpec {
        GenerationSpec::new(Prompt::Text("PROMPT:".into()), NodeId(0))
    }

    #[tokio::test]
    async fn plain_completion_passes_through() {
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::words("Hello there.")]));
        let sink = RecordingSink::new();
        let text = completion(generator.clone()).run(&spec(), &sink).await.unwrap();
        assert_eq!(text, "Hello there.");
        assert_eq!(sink.tokens(), "Hello there.");
        assert_eq!(generator.requests()[0].stop, vec!["</api>".to_string()]);
    }

    #[tokio::test]
    async fn tool_call_pauses_and_resumes_with_extended_prompt() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::words("The sum is <api>add(2, 3)</api>"),
            MockResponse::text(" 5."),
        ]));
        let sink = RecordingSink::new();
        let text = completion(generator.clone()).run(&spec(), &sink).await.unwrap();

        assert_eq!(text, "The sum is <api>add(2, 3)</api><result>5</result> 5.");
        let second = generator.requests()[1].prompt.as_text().unwrap().to_string();
        assert_eq!(second, "PROMPT:The sum is <api>add(2, 3)</api><result>5</result>");
        assert_eq!(sink.count("tool_call_started"), 1);
        assert_eq!(sink.count("tool_call_finished"), 1);
        assert_eq!(sink.count("generation_paused"), 1);
    }

    #[tokio::test]
    async fn failing_tool_renders_error_block() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("<api>divide(1, 0)</api>"),
            MockResponse::text("Oops."),
        ]));
        let text = completion(generator).run(&spec(), &RecordingSink::new()).await.unwrap();
        assert!(text.starts_with("<api>divide(1, 0)</api><error>Calling tool \"divide\" resulted in error"));
        assert!(text.ends_with("Oops."));
    }

    #[tokio::test]
    async fn tool_calls_are_bounded() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("<api>add(1, 1)</api>"),
            MockResponse::text("<api>add(2, 2)</api> done"),
        ]));
        let text = completion(generator.clone())
            .with_max_tool_calls(1)
            .run(&spec(), &RecordingSink::new())
            .await
            .unwrap();
        assert_eq!(text, "<api>add(1, 1)</api><result>2</result><api>add(2, 2)</api> done");
        assert!(generator.requests()[1].stop.is_empty());
    }

    #[tokio::test]
    async fn clear_context_only_on_first_request() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("<api>current_date_time()</api>"),
            MockResponse::text("."),
        ]));
        let mut spec = spec();
        spec.clear_context = true;
        completion(generator.clone()).run(&spec, &RecordingSink::new()).await.unwrap();
        let requests = generator.requests();
        assert!(requests[0].clear_context);
        assert!(!requests[1].clear_context);
    }

    #[tokio::test]
    async fn backend_error_is_returned() {
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::Error(BackendError::Overloaded)]));
        let err = completion(generator).run(&spec(), &RecordingSink::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Overloaded));
    }
}
