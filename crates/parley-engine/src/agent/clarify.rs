use parley_core::generator::GenerationRequest;
use parley_core::tool_call::ToolCall;
use parley_core::turns::ConversationTurn;

use super::{Orchestrator, ParentLink};
use crate::error::AgentError;
use crate::stream::drain;

const CLARIFY_PREFIX: &str = "Message from an agent you delegated your latest task to: ";

impl Orchestrator {
    /// Ask the parent run a question on behalf of a sub-agent.
    ///
    /// The parent answers in a one-shot side query over a copy of its history
    /// as it stood at delegation time; nothing is streamed and the parent's
    /// own history is untouched.
    pub(super) async fn clarify(
        &self,
        call: &ToolCall,
        parent: Option<&ParentLink>,
    ) -> Result<Result<String, String>, AgentError> {
        let Some(text) = call.arg_str("text", 0) else {
            return Ok(Err("clarify requires the text of a question".to_string()));
        };
        let Some(parent) = parent else {
            return Ok(Err("There is no parent agent to ask for clarification".to_string()));
        };

        let mut history = parent.history.clone();
        history.push(ConversationTurn::user(format!("{CLARIFY_PREFIX}{text}")));
        let prompt = self.renderer.render(&parent.system, &history, false);
        let request = GenerationRequest::new(prompt).with_sampling(parent.sampling.clone());

        match drain(self.generator.as_ref(), &request, None).await {
            Ok(answer) => Ok(Ok(answer)),
            Err(e) if e.is_context_exhausted() => Err(AgentError::ParentOutOfContext(e.to_string())),
            Err(e) => Err(AgentError::Backend(e)),
        }
    }
}
