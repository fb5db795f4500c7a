use std::collections::HashMap;

use serde_json::Value;

use parley_core::turns::ConversationTurn;

/// Mutable state of one orchestrator invocation.
///
/// History is append-only apart from [`checkpoint`](Self::checkpoint) /
/// [`rollback`](Self::rollback) pairs used around delegation retries.
#[derive(Clone, Debug, Default)]
pub struct AgentRoundState {
    pub round: u32,
    pub blank_streak: u32,
    history: Vec<ConversationTurn>,
    checkpoints: Vec<usize>,
    children: HashMap<String, AgentRoundState>,
}

impl AgentRoundState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self {
            history: turns,
            ..Self::default()
        }
    }

    /// Append the task input as a user turn. Non-string inputs are sent as JSON.
    pub fn push_input(&mut self, inputs: &Value) {
        let text = match inputs {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.push(ConversationTurn::user(text));
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Remember the current history length.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.history.len());
    }

    /// Drop everything appended since the latest checkpoint. The checkpoint stays active.
    pub fn rollback(&mut self) {
        if let Some(&len) = self.checkpoints.last() {
            self.history.truncate(len);
        }
    }

    /// Forget the latest checkpoint, keeping the history as is.
    pub fn release(&mut self) {
        let _ = self.checkpoints.pop();
    }

    /// Reset per-invocation counters. History is kept.
    pub(crate) fn begin(&mut self) {
        self.round = 0;
        self.blank_streak = 0;
    }

    /// Detach a sub-agent's state so it can run while this one stays borrowed.
    pub(crate) fn take_child(&mut self, name: &str) -> AgentRoundState {
        self.children.remove(name).unwrap_or_default()
    }

    pub(crate) fn put_child(&mut self, name: &str, child: AgentRoundState) {
        let _ = self.children.insert(name.to_string(), child);
    }

    pub fn child(&self, name: &str) -> Option<&AgentRoundState> {
        self.children.get(name)
    }
}
