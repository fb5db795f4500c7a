use serde_json::Value;
use tracing::{info, warn};

use parley_core::tool_call::{ToolArgs, ToolCall};

use super::{value_text, AgentRoundState, AgentSpec, Orchestrator, ParentLink};
use crate::error::AgentError;
use crate::sink::EventSink;

impl Orchestrator {
    /// Run a named sub-agent on the call's inputs.
    ///
    /// Each sub-agent keeps its own history across delegations within the
    /// run. A sub-agent that runs out of context is rolled back to where this
    /// delegation started and retried; after the last attempt its exhaustion
    /// is reported back as a tool error. Exhaustion of this run's context
    /// while answering the child's clarification is this run's own failure.
    pub(super) async fn delegate(
        &self,
        spec: &AgentSpec,
        state: &mut AgentRoundState,
        call: &ToolCall,
        sink: &dyn EventSink,
        depth: u32,
    ) -> Result<Result<String, String>, AgentError> {
        let Some(name) = call.arg_str("name", 0) else {
            return Ok(Err("delegate requires the name of a sub-agent".to_string()));
        };
        let inputs = match &call.args {
            ToolArgs::Named(args) => args.get("inputs").cloned().unwrap_or(Value::Null),
            ToolArgs::Positional(args) => Value::String(args.iter().skip(1).cloned().collect::<Vec<_>>().join(", ")),
        };
        let Some(sub) = spec.sub_agent(&name) else {
            return Ok(Err(format!("Sub-agent \"{name}\" not found")));
        };
        let max_depth = spec.config.max_delegation_depth;
        if depth >= max_depth {
            return Err(AgentError::DelegationTooDeep(max_depth));
        }

        let link = ParentLink {
            system: self.system_text(spec),
            sampling: spec.sampling.clone(),
            history: state.history().to_vec(),
        };
        let attempts = spec.config.delegation_retries.max(1);
        let mut child = state.take_child(&name);
        child.checkpoint();

        let mut outcome = None;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            child.rollback();
            child.push_input(&inputs);
            info!(sub_agent = %name, attempt, "delegating");
            match self.run_in(sub, &mut child, sink, Some(&link), depth + 1).await {
                Ok(payload) => {
                    outcome = Some(Ok(Ok(value_text(&payload))));
                    break;
                }
                Err(AgentError::RunOutOfContext(msg)) => {
                    warn!(sub_agent = %name, attempt, error = %msg, "sub-agent ran out of context");
                    last_error = msg;
                }
                Err(AgentError::ParentOutOfContext(msg)) => {
                    outcome = Some(Err(AgentError::RunOutOfContext(msg)));
                    break;
                }
                Err(other) => {
                    outcome = Some(Err(other));
                    break;
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| {
            child.rollback();
            Ok(Err(format!(
                "Sub-agent \"{name}\" ran out of context after {attempts} attempts: {last_error}"
            )))
        });
        child.release();
        state.put_child(&name, child);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use parley_core::errors::BackendError;
    use parley_core::turns::Segment;
    use parley_llm::mock::{MockGenerator, MockResponse};

    use super::super::AgentConfig;
    use super::*;
    use crate::render::{ChatTemplate, StringRenderer};
    use crate::sink::RecordingSink;

    fn call(name: &str, args: Value) -> MockResponse {
        MockResponse::text(&format!(
            "<|tool_use_start|>{}<|tool_use_end|>",
            json!({"tool_name": name, "args": args})
        ))
    }

    fn exhausted() -> MockResponse {
        MockResponse::Error(BackendError::ContextExhausted("context full".into()))
    }

    fn orchestrator(generator: Arc<MockGenerator>) -> Orchestrator {
        Orchestrator::new(generator, Arc::new(StringRenderer::new(ChatTemplate::llama3())))
    }

    fn parent_spec() -> AgentSpec {
        let helper = AgentSpec::new("helper", "You compute sums.");
        AgentSpec::new("main", "You coordinate.").with_sub_agent("helper", Arc::new(helper))
    }

    fn errors(state: &AgentRoundState) -> Vec<String> {
        state
            .history()
            .iter()
            .flat_map(|t| t.segments.iter())
            .filter_map(|s| match s {
                Segment::ToolError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn sub_agent_result_becomes_tool_result() {
        let generator = Arc::new(MockGenerator::new(vec![
            call("delegate", json!({"name": "helper", "inputs": "sum 2 and 3"})),
            call("done", json!({"answer": "5"})),
            call("done", json!({"answer": "five"})),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("add things"));
        let payload = orchestrator(generator.clone())
            .run(&parent_spec(), &mut state, &RecordingSink::new())
            .await
            .unwrap();

        assert_eq!(payload, json!({"answer": "five"}));
        assert_eq!(generator.call_count(), 3);
        let child = state.child("helper").unwrap();
        assert_eq!(child.history()[0].body_text(), "sum 2 and 3");
        // input, empty pre-text, done
        assert_eq!(child.len(), 3);
        assert!(state.history().iter().flat_map(|t| t.segments.iter()).any(|s| matches!(
            s,
            Segment::ToolResult { name, result, .. } if name == "delegate" && result == r#"{"answer":"5"}"#
        )));
    }

    #[tokio::test]
    async fn exhausted_sub_agent_is_retried_then_reported() {
        let generator = Arc::new(MockGenerator::new(vec![
            call("delegate", json!({"name": "helper", "inputs": "huge task"})),
            exhausted(),
            exhausted(),
            exhausted(),
            call("done", json!({"answer": "gave up"})),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("go"));
        orchestrator(generator.clone())
            .run(&parent_spec(), &mut state, &RecordingSink::new())
            .await
            .unwrap();

        assert_eq!(generator.call_count(), 5);
        let errs = errors(&state);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("after 3 attempts"));
        assert!(state.child("helper").unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_starts_from_restored_history() {
        let generator = Arc::new(MockGenerator::new(vec![
            call("delegate", json!({"name": "helper", "inputs": "task"})),
            MockResponse::text("Working on it."),
            exhausted(),
            call("done", json!({"answer": "ok"})),
            call("done", json!({"answer": "ok"})),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("go"));
        orchestrator(generator.clone())
            .run(&parent_spec(), &mut state, &RecordingSink::new())
            .await
            .unwrap();

        // The retried child prompt holds only the fresh input.
        let retry_prompt = generator.requests()[3].prompt.as_text().unwrap().to_string();
        assert!(!retry_prompt.contains("Working on it."));
        assert_eq!(state.child("helper").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_sub_agent_is_a_tool_error() {
        let generator = Arc::new(MockGenerator::new(vec![
            call("delegate", json!({"name": "ghost", "inputs": "boo"})),
            call("done", json!({})),
        ]));
        let mut state = AgentRoundState::new();
        state.push_input(&json!("go"));
        orchestrator(generator)
            .run(&parent_spec(), &mut state, &RecordingSink::new())
            .await
            .unwrap();
        assert_eq!(errors(&state), vec!["Sub-agent \"ghost\" not found".to_string()]);
    }

    #[tokio::test]
    async fn child_failure_modes_are_not_swallowed() {
        let helper = AgentSpec::new("helper", "").with_config(AgentConfig {
            max_rounds: 1,
            ..AgentConfig::default()
        });
        let spec = AgentSpec::new("main", "").with_sub_agent("helper", Arc::new(helper));
        let generator = Arc::new(MockGenerator::new(vec![
            call("delegate", json!({"name": "helper", "inputs": "x"})),
            MockResponse::text("no done call"),
        ]));
        let err = orchestrator(generator)
            .run_task(&spec, &json!("go"), &RecordingSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TooManyRounds(1)));
    }

    #[tokio::test]
    async fn delegation_depth_is_bounded() {
        let spec = AgentSpec::new("main", "")
            .with_config(AgentConfig {
                max_delegation_depth: 0,
                ..AgentConfig::default()
            })
            .with_sub_agent("helper", Arc::new(AgentSpec::new("helper", "")));
        let generator = Arc::new(MockGenerator::new(vec![call(
            "delegate",
            json!({"name": "helper", "inputs": "x"}),
        )]));
        let err = orchestrator(generator)
            .run_task(&spec, &json!("go"), &RecordingSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DelegationTooDeep(0)));
    }
}
