//! Detection, parsing and rendering of tool-call markup inside generated text.

mod json;
mod tagged;

pub use json::JsonProtocol;
pub use tagged::{TagSet, TaggedProtocol};

use serde_json::{Map, Value};

use parley_core::tool_call::ToolCall;
use parley_core::tools::ToolDefinition;

use crate::error::ProtocolError;

/// Outcome of scanning text for a tool call.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCallMatch {
    /// A parsable call. `offset` is the byte index where the markup starts.
    Found { call: ToolCall, offset: usize },
    /// Markup was located but its body could not be parsed.
    Malformed {
        offset: usize,
        body: String,
        error: ProtocolError,
    },
    NotFound,
}

impl ToolCallMatch {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// A tool-call syntax: how calls are spotted in model output and written back into prompts.
pub trait ToolCallProtocol: Send + Sync {
    /// First call in `text`, if any.
    fn find(&self, text: &str) -> ToolCallMatch;

    fn parse(&self, body: &str) -> Result<ToolCall, ProtocolError>;

    fn render(&self, call: &ToolCall) -> String;

    /// The result block that follows a rendered call.
    fn render_result(&self, name: &str, result: &str) -> String;

    fn render_error(&self, name: &str, error: &str) -> String;

    /// A body that failed to parse, wrapped in call delimiters.
    fn render_raw(&self, body: &str) -> String;

    fn render_syntax_error(&self, error: &ProtocolError) -> String;

    /// Strings that should halt generation right after a call closes.
    fn stop_words(&self) -> Vec<String>;

    /// The strings that open and close a call.
    fn delimiters(&self) -> (&str, &str);

    fn render_with_result(&self, call: &ToolCall, result: &str) -> String {
        let mut out = self.render(call);
        out.push_str(&self.render_result(&call.name, result));
        out
    }

    fn render_with_error(&self, call: &ToolCall, error: &str) -> String {
        let mut out = self.render(call);
        out.push_str(&self.render_error(&call.name, error));
        out
    }

    /// A documentation example: the call `tool` would receive for `example`.
    fn render_example(&self, tool: &ToolDefinition, example: &Map<String, Value>) -> String {
        self.render(&ToolCall::named(tool.name.clone(), example.clone()))
    }
}
