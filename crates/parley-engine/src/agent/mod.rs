//! Bounded multi-round agent loop.
//!
//! Each round renders the run's history, streams one completion and reacts to
//! what the model wrote: a fenced code block goes to an interpreter, a tool
//! call is dispatched (to the registry, a sub-agent or the parent), anything
//! else is recorded as plain assistant text. A `done` call ends the run.

mod clarify;
mod delegate;
mod state;

pub use state::AgentRoundState;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use parley_core::events::{StreamEvent, ToolCallNotice, ToolCallReport};
use parley_core::generation::SamplingConfig;
use parley_core::generator::{GenerationRequest, TextGenerator};
use parley_core::tool_call::ToolCall;
use parley_core::turns::{ConversationTurn, Role, Segment};

use crate::code::find_code;
use crate::docs::describe_tools;
use crate::error::AgentError;
use crate::protocol::{JsonProtocol, ToolCallMatch, ToolCallProtocol};
use crate::registry::ToolRegistry;
use crate::render::ChatRenderer;
use crate::sandbox::InterpreterRegistry;
use crate::sink::EventSink;
use crate::stream::drain;

pub const DONE_TOOL: &str = "done";
pub const DELEGATE_TOOL: &str = "delegate";
pub const CLARIFY_TOOL: &str = "clarify";

const DEFAULT_NUDGE: &str =
    "Is that problem solved? When you are ready, report the answer. Don't forget to use the syntax precisely.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_rounds: u32,
    /// Consecutive blank responses that trigger a nudge turn.
    pub blank_rounds_before_nudge: u32,
    pub nudge_text: String,
    /// Attempts per delegation when the sub-agent runs out of context.
    pub delegation_retries: u32,
    pub max_delegation_depth: u32,
    /// Append tool documentation to the system text.
    pub document_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            blank_rounds_before_nudge: 3,
            nudge_text: DEFAULT_NUDGE.to_string(),
            delegation_retries: 3,
            max_delegation_depth: 4,
            document_tools: true,
        }
    }
}

/// Static description of an agent: its instructions, limits and sub-agents.
#[derive(Clone, Debug, Default)]
pub struct AgentSpec {
    pub name: String,
    pub system: String,
    pub config: AgentConfig,
    pub sampling: SamplingConfig,
    sub_agents: HashMap<String, Arc<AgentSpec>>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Make `agent` reachable through `delegate(name, inputs)`.
    pub fn with_sub_agent(mut self, name: impl Into<String>, agent: Arc<AgentSpec>) -> Self {
        let _ = self.sub_agents.insert(name.into(), agent);
        self
    }

    pub fn sub_agent(&self, name: &str) -> Option<&Arc<AgentSpec>> {
        self.sub_agents.get(name)
    }

    pub fn sub_agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sub_agents.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Result of one round that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    Continue,
    Done(Value),
}

/// What a delegated run knows about the agent that started it.
pub(crate) struct ParentLink {
    system: String,
    sampling: SamplingConfig,
    history: Vec<ConversationTurn>,
}

/// Text form of a tool or sub-agent result.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable answer carried by a `done` payload.
///
/// A lone string, a list of strings, or an object with one string field is
/// unwrapped; anything else is shown as JSON.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) if map.len() == 1 => match map.values().next() {
            Some(Value::String(s)) => s.clone(),
            _ => payload.to_string(),
        },
        other => value_text(other),
    }
}

fn is_blank(response: &str) -> bool {
    response.trim().is_empty()
}

/// Drives agent runs against shared backends, tools and interpreters.
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    renderer: Arc<dyn ChatRenderer>,
    protocol: Arc<dyn ToolCallProtocol>,
    tools: Arc<ToolRegistry>,
    interpreters: Arc<InterpreterRegistry>,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, renderer: Arc<dyn ChatRenderer>) -> Self {
        Self {
            generator,
            renderer,
            protocol: Arc::new(JsonProtocol::default()),
            tools: Arc::new(ToolRegistry::new()),
            interpreters: Arc::new(InterpreterRegistry::new()),
        }
    }

    pub fn with_protocol(mut self, protocol: Arc<dyn ToolCallProtocol>) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_interpreters(mut self, interpreters: Arc<InterpreterRegistry>) -> Self {
        self.interpreters = interpreters;
        self
    }

    pub fn protocol(&self) -> &Arc<dyn ToolCallProtocol> {
        &self.protocol
    }

    /// System text for `spec`, with tool documentation appended when enabled.
    pub fn system_text(&self, spec: &AgentSpec) -> String {
        if !spec.config.document_tools || self.tools.is_empty() {
            return spec.system.clone();
        }
        let docs = describe_tools(&self.tools, self.protocol.as_ref());
        if spec.system.is_empty() {
            docs
        } else {
            format!("{}\n\n{}", spec.system, docs)
        }
    }

    /// Run `spec` on a single task input.
    pub async fn run_task(
        &self,
        spec: &AgentSpec,
        inputs: &Value,
        sink: &dyn EventSink,
    ) -> Result<Value, AgentError> {
        let mut state = AgentRoundState::new();
        state.push_input(inputs);
        self.run(spec, &mut state, sink).await
    }

    /// Run `spec` until it calls `done` or exhausts its round budget.
    ///
    /// `state` carries the history in and out; it keeps everything appended
    /// during the run, including sub-agent histories.
    #[instrument(skip_all, fields(agent = %spec.name))]
    pub async fn run(
        &self,
        spec: &AgentSpec,
        state: &mut AgentRoundState,
        sink: &dyn EventSink,
    ) -> Result<Value, AgentError> {
        info!(history = state.len(), max_rounds = spec.config.max_rounds, "agent run started");
        let result = self.run_in(spec, state, sink, None, 0).await;
        match &result {
            Ok(_) => info!(rounds = state.round, "agent run finished"),
            Err(e) => warn!(rounds = state.round, error = %e, "agent run failed"),
        }
        result
    }

    pub(crate) fn run_in<'a>(
        &'a self,
        spec: &'a AgentSpec,
        state: &'a mut AgentRoundState,
        sink: &'a dyn EventSink,
        parent: Option<&'a ParentLink>,
        depth: u32,
    ) -> BoxFuture<'a, Result<Value, AgentError>> {
        let span = info_span!("agent_loop", agent = %spec.name, depth);
        async move {
            let system = self.system_text(spec);
            let max_rounds = spec.config.max_rounds;
            state.begin();

            loop {
                if state.round >= max_rounds {
                    return Err(AgentError::TooManyRounds(max_rounds));
                }
                let continuation = state.round > 0;
                let prompt = self.renderer.render(&system, state.history(), continuation);
                let request = GenerationRequest {
                    stop: self.protocol.stop_words(),
                    ..GenerationRequest::new(prompt).with_sampling(spec.sampling.clone())
                };
                let response = drain(self.generator.as_ref(), &request, Some(sink))
                    .await
                    .map_err(AgentError::from_backend)?;
                state.round += 1;
                debug!(round = state.round, len = response.len(), "round response");

                if is_blank(&response) {
                    state.blank_streak += 1;
                    if state.blank_streak >= spec.config.blank_rounds_before_nudge {
                        warn!(round = state.round, "repeated blank responses, nudging");
                        state.push(ConversationTurn::user(spec.config.nudge_text.clone()));
                        state.blank_streak = 0;
                        state.round -= 1;
                    }
                    continue;
                }
                state.blank_streak = 0;

                match self.process_response(spec, state, &response, sink, parent, depth).await? {
                    RoundOutcome::Continue => {}
                    RoundOutcome::Done(payload) => return Ok(payload),
                }
            }
        }
        .instrument(span)
        .boxed()
    }

    async fn process_response(
        &self,
        spec: &AgentSpec,
        state: &mut AgentRoundState,
        response: &str,
        sink: &dyn EventSink,
        parent: Option<&ParentLink>,
        depth: u32,
    ) -> Result<RoundOutcome, AgentError> {
        if let Some(block) = find_code(response) {
            state.push(ConversationTurn::assistant(block.to_markdown()));
            let interpreter = self.interpreters.resolve(block.language.as_deref());
            match interpreter.execute(&block, sink).await {
                Ok(Some(report)) => state.push(ConversationTurn::user(report)),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "code execution failed");
                    state.push(ConversationTurn::assistant(e.to_string()));
                }
            }
            return Ok(RoundOutcome::Continue);
        }

        let (offset, parsed) = match self.protocol.find(response) {
            ToolCallMatch::NotFound => {
                state.push(ConversationTurn::assistant(response));
                return Ok(RoundOutcome::Continue);
            }
            ToolCallMatch::Found { call, offset } => (offset, Ok(call)),
            ToolCallMatch::Malformed { offset, body, error } => (offset, Err((body, error))),
        };

        // Kept even when empty: every call round records pre-text, call and outcome.
        let pre_text = &response[..offset];
        state.push(ConversationTurn::assistant(pre_text));

        let call = match parsed {
            Ok(call) => call,
            Err((body, error)) => {
                debug!(%error, "unparseable tool call");
                state.push(ConversationTurn::assistant(self.protocol.render_raw(&body)));
                state.push(self.entry(Segment::ToolError {
                    name: None,
                    error: error.to_string(),
                    markup: self.protocol.render_syntax_error(&error),
                }));
                return Ok(RoundOutcome::Continue);
            }
        };

        let call_markup = self.protocol.render(&call);
        state.push(self.entry(Segment::ToolCall {
            call: call.clone(),
            markup: call_markup.clone(),
        }));
        if call.name == DONE_TOOL {
            return Ok(RoundOutcome::Done(call.args.to_value()));
        }

        sink.emit(StreamEvent::ToolCallStarted(ToolCallNotice {
            name: call.name.clone(),
            args: call.args.to_value(),
        }))
        .await;

        let outcome = self.dispatch(spec, state, &call, sink, parent, depth).await?;

        let (follow_up, report) = match outcome {
            Ok(answer) if call.name == CLARIFY_TOOL => {
                state.push(ConversationTurn::user(answer.clone()));
                (String::new(), success(&call.name, answer))
            }
            Ok(result) => {
                let markup = self.protocol.render_result(&call.name, &result);
                state.push(self.entry(Segment::ToolResult {
                    name: call.name.clone(),
                    result: result.clone(),
                    markup: markup.clone(),
                }));
                (markup, success(&call.name, result))
            }
            Err(error) => {
                debug!(tool = %call.name, %error, "tool call failed");
                let markup = self.protocol.render_error(&call.name, &error);
                state.push(self.entry(Segment::ToolError {
                    name: Some(call.name.clone()),
                    error: error.clone(),
                    markup: markup.clone(),
                }));
                (markup, failure(&call.name, error))
            }
        };

        sink.emit(StreamEvent::ToolCallFinished(report)).await;
        sink.emit(StreamEvent::GenerationPaused(format!("{pre_text}{call_markup}{follow_up}")))
            .await;
        Ok(RoundOutcome::Continue)
    }

    /// Route a call. `Err` inside `Ok` is a recoverable failure recorded in history.
    async fn dispatch(
        &self,
        spec: &AgentSpec,
        state: &mut AgentRoundState,
        call: &ToolCall,
        sink: &dyn EventSink,
        parent: Option<&ParentLink>,
        depth: u32,
    ) -> Result<Result<String, String>, AgentError> {
        match call.name.as_str() {
            DELEGATE_TOOL => self.delegate(spec, state, call, sink, depth).await,
            CLARIFY_TOOL => self.clarify(call, parent).await,
            name => Ok(self
                .tools
                .invoke(name, &call.args)
                .await
                .map_err(|e| e.to_string())),
        }
    }

    fn entry(&self, segment: Segment) -> ConversationTurn {
        ConversationTurn::new(Role::Assistant, vec![segment])
    }
}

fn success(name: &str, result: String) -> ToolCallReport {
    ToolCallReport {
        name: name.to_string(),
        result: Some(result),
        error: None,
    }
}

fn failure(name: &str, error: String) -> ToolCallReport {
    ToolCallReport {
        name: name.to_string(),
        result: None,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use parley_core::errors::BackendError;
    use parley_llm::mock::{MockGenerator, MockResponse};

    use super::*;
    use crate::code::CodeBlock;
    use crate::error::SandboxError;
    use crate::protocol::TaggedProtocol;
    use crate::render::{ChatTemplate, StringRenderer};
    use crate::sandbox::Interpreter;
    use crate::sink::RecordingSink;
    use crate::tools::create_default_registry;

    fn call(name: &str, args: Value) -> String {
        format!(
            "<|tool_use_start|>{}<|tool_use_end|>",
            json!({"tool_name": name, "args": args})
        )
    }

    fn done(answer: &str) -> MockResponse {
        MockResponse::text(&call("done", json!({"answer": answer})))
    }

    fn orchestrator(generator: Arc<MockGenerator>) -> Orchestrator {
        Orchestrator::new(generator, Arc::new(StringRenderer::new(ChatTemplate::llama3())))
            .with_tools(Arc::new(create_default_registry()))
    }

    fn spec(max_rounds: u32) -> AgentSpec {
        AgentSpec::new("main", "You solve arithmetic problems.").with_config(AgentConfig {
            max_rounds,
            ..AgentConfig::default()
        })
    }

    fn tool_segments(state: &AgentRoundState) -> Vec<&Segment> {
        state
            .history()
            .iter()
            .flat_map(|t| t.segments.iter())
            .filter(|s| {
                matches!(
                    s,
                    Segment::ToolCall { .. } | Segment::ToolResult { .. } | Segment::ToolError { .. }
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn single_tool_round_then_done() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::words(&format!("Let me add. {}", call("add", json!({"num1": 2, "num2": 3})))),
            done("5"),
        ]));
        let orch = orchestrator(generator.clone());
        let sink = RecordingSink::new();
        let mut state = AgentRoundState::new();
        state.push_input(&json!("What is 2 + 3?"));

        let payload = orch.run(&spec(5), &mut state, &sink).await.unwrap();

        assert_eq!(payload, json!({"answer": "5"}));
        assert_eq!(generator.call_count(), 2);
        assert_eq!(sink.count("tool_call_started"), 1);
        assert_eq!(sink.count("tool_call_finished"), 1);
        // input, pre-text, call, result, then the done round's empty pre-text and call
        assert_eq!(state.len(), 6);
        assert_eq!(state.history()[1].body_text(), "Let me add. ");
        assert!(matches!(
            &state.history()[3].segments[0],
            Segment::ToolResult { result, .. } if result == "5"
        ));

        let second = generator.requests()[1].prompt.as_text().unwrap().to_string();
        assert!(second.contains("<|result_start|>"));
        assert!(second.ends_with("<|result_end|>"), "continuation keeps the answer open");
        assert_eq!(generator.requests()[0].stop, vec!["<|tool_use_end|>".to_string()]);
    }

    #[tokio::test]
    async fn call_without_pre_text_still_records_three_entries() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text(&call("add", json!({"num1": 1, "num2": 2}))),
            done("3"),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("1 + 2?"));
        orchestrator(generator).run(&spec(5), &mut state, &RecordingSink::new()).await.unwrap();

        let h = state.history();
        assert_eq!(h[1].role, Role::Assistant);
        assert_eq!(h[1].body_text(), "");
        assert!(matches!(&h[2].segments[0], Segment::ToolCall { call, .. } if call.name == "add"));
        assert!(matches!(&h[3].segments[0], Segment::ToolResult { result, .. } if result == "3"));
        assert!(matches!(&h[5].segments[0], Segment::ToolCall { call, .. } if call.name == "done"));
        assert_eq!(h.len(), 6);
    }

    #[tokio::test]
    async fn tokens_and_pause_events_are_published() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text(&format!("Adding. {}", call("add", json!({"num1": 1, "num2": 1})))),
            done("2"),
        ]));
        let sink = RecordingSink::new();
        orchestrator(generator).run_task(&spec(5), &json!("1+1"), &sink).await.unwrap();
        let types = sink.event_types();
        assert_eq!(
            types,
            vec![
                "tokens_arrived",
                "tool_call_started",
                "tool_call_finished",
                "generation_paused",
                "tokens_arrived",
            ]
        );
        let paused = sink.events().into_iter().find_map(|e| match e {
            StreamEvent::GenerationPaused(text) => Some(text),
            _ => None,
        });
        let paused = paused.unwrap();
        assert!(paused.starts_with("Adding. <|tool_use_start|>"));
        assert!(paused.ends_with("<|result_end|>"));
    }

    #[tokio::test]
    async fn round_budget_is_enforced_exactly() {
        let generator = Arc::new(MockGenerator::new(Vec::new()).with_fallback(MockResponse::text("Still thinking.")));
        let orch = orchestrator(generator.clone());
        let err = orch.run_task(&spec(3), &json!("go"), &RecordingSink::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::TooManyRounds(3)));
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn three_blanks_insert_one_nudge_and_refund_the_round() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("  "),
            MockResponse::text("\n"),
            MockResponse::text(""),
            done("ok"),
        ]));
        let orch = orchestrator(generator.clone());
        let mut state = AgentRoundState::new();
        state.push_input(&json!("go"));
        let payload = orch.run(&spec(3), &mut state, &RecordingSink::new()).await.unwrap();
        assert_eq!(payload, json!({"answer": "ok"}));
        assert_eq!(generator.call_count(), 4);
        let nudges = state
            .history()
            .iter()
            .filter(|t| t.body_text() == AgentConfig::default().nudge_text)
            .count();
        assert_eq!(nudges, 1);
        // input, nudge, empty pre-text, done
        assert_eq!(state.len(), 4);
    }

    #[tokio::test]
    async fn endless_blanks_still_terminate() {
        let generator = Arc::new(MockGenerator::new(Vec::new()).with_fallback(MockResponse::text(" ")));
        let orch = orchestrator(generator.clone());
        let err = orch.run_task(&spec(3), &json!("go"), &RecordingSink::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::TooManyRounds(3)));
        assert_eq!(generator.call_count(), 4);
    }

    #[tokio::test]
    async fn malformed_call_is_recorded_without_dispatch() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("Try: <|tool_use_start|>{\"tool_name\": <|tool_use_end|>"),
            done("x"),
        ]));
        let sink = RecordingSink::new();
        let mut state = AgentRoundState::new();
        state.push_input(&json!("go"));
        orchestrator(generator).run(&spec(5), &mut state, &sink).await.unwrap();

        assert_eq!(sink.count("tool_call_started"), 0);
        let h = state.history();
        assert_eq!(h[2].body_text(), "<|tool_use_start|>{\"tool_name\": <|tool_use_end|>");
        assert!(matches!(&h[3].segments[0], Segment::ToolError { name: None, markup, .. } if markup.starts_with("<|error_start|>")));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_entry() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text(&call("weather", json!({"city": "Oslo"}))),
            done("unknown"),
        ]));
        let sink = RecordingSink::new();
        let mut state = AgentRoundState::new();
        state.push_input(&json!("weather?"));
        orchestrator(generator).run(&spec(5), &mut state, &sink).await.unwrap();

        let errors: Vec<_> = tool_segments(&state)
            .into_iter()
            .filter_map(|s| match s {
                Segment::ToolError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec!["Tool \"weather\" not found".to_string()]);
        let finished = sink.events().into_iter().find_map(|e| match e {
            StreamEvent::ToolCallFinished(r) => Some(r),
            _ => None,
        });
        assert!(finished.unwrap().error.is_some());
    }

    #[tokio::test]
    async fn tagged_protocol_done_payload_is_positional() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("<api>add(2, 2)</api>"),
            MockResponse::text("<api>done(four)</api>"),
        ]));
        let orch = orchestrator(generator).with_protocol(Arc::new(TaggedProtocol::default()));
        let payload = orch.run_task(&spec(5), &json!("2+2"), &RecordingSink::new()).await.unwrap();
        assert_eq!(payload, json!(["four"]));
        assert_eq!(payload_text(&payload), "four");
    }

    #[tokio::test]
    async fn inert_interpreter_records_code_only() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockResponse::text("Here:\n```python\nprint(1)\n```"),
            done("1"),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("run it"));
        orchestrator(generator).run(&spec(5), &mut state, &RecordingSink::new()).await.unwrap();
        assert_eq!(state.history()[1].body_text(), "Here:\n```\npython\nprint(1)\n```");
        // input, code, done
        assert_eq!(state.len(), 3);
    }

    struct EchoInterpreter;

    #[async_trait]
    impl Interpreter for EchoInterpreter {
        async fn execute(&self, block: &CodeBlock, _sink: &dyn EventSink) -> Result<Option<String>, SandboxError> {
            Ok(Some(format!("CODE EXECUTION START\n{}\nCODE EXECUTION END", block.source().trim())))
        }
    }

    struct DeadInterpreter;

    #[async_trait]
    impl Interpreter for DeadInterpreter {
        async fn execute(&self, _block: &CodeBlock, _sink: &dyn EventSink) -> Result<Option<String>, SandboxError> {
            Err(SandboxError::Remote("sandbox offline".into()))
        }
    }

    #[tokio::test]
    async fn interpreter_output_becomes_user_turn() {
        let mut interpreters = InterpreterRegistry::new();
        interpreters.register("python", Arc::new(EchoInterpreter));
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::text("```python\nprint(1)\n```"), done("1")]));
        let orch = orchestrator(generator).with_interpreters(Arc::new(interpreters));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("run it"));
        orch.run(&spec(5), &mut state, &RecordingSink::new()).await.unwrap();
        assert_eq!(state.history()[2].role, Role::User);
        assert_eq!(state.history()[2].body_text(), "CODE EXECUTION START\nprint(1)\nCODE EXECUTION END");
    }

    #[tokio::test]
    async fn fence_info_word_selects_interpreter() {
        let mut interpreters = InterpreterRegistry::new();
        interpreters.register("bash", Arc::new(EchoInterpreter));
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::text("```Bash\necho hi\n```"), done("hi")]));
        let orch = orchestrator(generator).with_interpreters(Arc::new(interpreters));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("say hi"));
        orch.run(&spec(5), &mut state, &RecordingSink::new()).await.unwrap();
        assert_eq!(state.history()[2].body_text(), "CODE EXECUTION START\necho hi\nCODE EXECUTION END");
    }

    #[tokio::test]
    async fn interpreter_failure_is_recorded() {
        let mut interpreters = InterpreterRegistry::new();
        interpreters.register("python", Arc::new(DeadInterpreter));
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::text("```python\nx\n```"), done("no")]));
        let orch = orchestrator(generator).with_interpreters(Arc::new(interpreters));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("run it"));
        orch.run(&spec(5), &mut state, &RecordingSink::new()).await.unwrap();
        assert_eq!(state.history()[2].role, Role::Assistant);
        assert!(state.history()[2].body_text().contains("sandbox offline"));
    }

    #[tokio::test]
    async fn context_exhaustion_at_root_is_fatal() {
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::Error(BackendError::ContextExhausted(
            "full".into(),
        ))]));
        let err = orchestrator(generator).run_task(&spec(5), &json!("go"), &RecordingSink::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::RunOutOfContext(_)));
    }

    #[tokio::test]
    async fn other_backend_failures_propagate() {
        let generator = Arc::new(MockGenerator::new(vec![MockResponse::Error(BackendError::InvalidRequest(
            "bad".into(),
        ))]));
        let err = orchestrator(generator).run_task(&spec(5), &json!("go"), &RecordingSink::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(BackendError::InvalidRequest(_))));
    }

    #[test]
    fn system_text_includes_tool_docs() {
        let orch = orchestrator(Arc::new(MockGenerator::new(Vec::new())));
        let text = orch.system_text(&spec(5));
        assert!(text.starts_with("You solve arithmetic problems.\n\n"));
        assert!(text.contains("add(num1, num2)"));

        let plain = AgentSpec::new("a", "Be brief.").with_config(AgentConfig {
            document_tools: false,
            ..AgentConfig::default()
        });
        assert_eq!(orch.system_text(&plain), "Be brief.");
    }

    #[test]
    fn payload_text_unwraps_simple_shapes() {
        assert_eq!(payload_text(&json!("hi")), "hi");
        assert_eq!(payload_text(&json!({"answer": "5"})), "5");
        assert_eq!(payload_text(&json!(["a", "b"])), "a, b");
        assert_eq!(payload_text(&json!({"a": 1, "b": 2})), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: AgentConfig = serde_json::from_value(json!({"max_rounds": 9})).unwrap();
        assert_eq!(config.max_rounds, 9);
        assert_eq!(config.delegation_retries, 3);
        assert!(config.document_tools);
    }
}
