use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use parley_core::tool_call::{ToolArgs, ToolCall};

use super::{TagSet, ToolCallMatch, ToolCallProtocol};
use crate::error::ProtocolError;

/// Sentinel-delimited calls with a JSON body:
/// `<|tool_use_start|>{"tool_name": "add", "args": {"a": 1}}<|tool_use_end|>`.
pub struct JsonProtocol {
    tags: TagSet,
    span: Option<Regex>,
}

impl JsonProtocol {
    pub fn new(tags: TagSet) -> Self {
        let source = format!(
            "(?s){}(.*?){}",
            regex::escape(&tags.open),
            regex::escape(&tags.close)
        );
        let span = Regex::new(&source)
            .map_err(|e| warn!(pattern = %source, error = %e, "tool-call pattern rejected"))
            .ok();
        Self { tags, span }
    }

    fn decode(body: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(body.trim())
    }
}

impl Default for JsonProtocol {
    fn default() -> Self {
        Self::new(TagSet::sentinel())
    }
}

impl ToolCallProtocol for JsonProtocol {
    fn find(&self, text: &str) -> ToolCallMatch {
        let Some(caps) = self.span.as_ref().and_then(|re| re.captures(text)) else {
            return ToolCallMatch::NotFound;
        };
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            return ToolCallMatch::NotFound;
        };
        match self.parse(body.as_str()) {
            Ok(call) => ToolCallMatch::Found {
                call,
                offset: whole.start(),
            },
            Err(error) => ToolCallMatch::Malformed {
                offset: whole.start(),
                body: body.as_str().to_string(),
                error,
            },
        }
    }

    fn parse(&self, body: &str) -> Result<ToolCall, ProtocolError> {
        let value = match Self::decode(body) {
            Ok(value) => value,
            Err(first) => {
                // Models often drop the final brace of a nested object.
                let repaired = format!("{}}}", body.trim());
                debug!(body = %repaired, "retrying tool call body with closing brace");
                Self::decode(&repaired).map_err(|_| ProtocolError::InvalidJson(first.to_string()))?
            }
        };

        let Value::Object(mut object) = value else {
            return Err(ProtocolError::MissingToolName);
        };
        let name = match object.remove("tool_name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_lowercase(),
            _ => return Err(ProtocolError::MissingToolName),
        };
        let args = match object.remove("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args,
            Some(_) => return Err(ProtocolError::ArgsNotObject),
        };
        Ok(ToolCall {
            name,
            args: ToolArgs::Named(args),
        })
    }

    fn render(&self, call: &ToolCall) -> String {
        let body = json!({"tool_name": call.name, "args": call.args.to_value()});
        self.render_raw(&body.to_string())
    }

    fn render_result(&self, name: &str, result: &str) -> String {
        let body = json!({"tool_name": name, "result": result});
        format!("{}{}{}", self.tags.result_open, body, self.tags.result_close)
    }

    fn render_error(&self, name: &str, error: &str) -> String {
        let body = json!({"tool_name": name, "error": error});
        format!("{}{}{}", self.tags.error_open, body, self.tags.error_close)
    }

    fn render_raw(&self, body: &str) -> String {
        format!("{}{}{}", self.tags.open, body, self.tags.close)
    }

    fn render_syntax_error(&self, error: &ProtocolError) -> String {
        format!("{}{}{}", self.tags.error_open, error, self.tags.error_close)
    }

    fn stop_words(&self) -> Vec<String> {
        vec![self.tags.close.clone()]
    }

    fn delimiters(&self) -> (&str, &str) {
        (&self.tags.open, &self.tags.close)
    }
}
