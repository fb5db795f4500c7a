use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use serde_json::{Map, Value};

use parley_core::tool_call::{ToolArgs, ToolCall};
use parley_core::tools::ToolDefinition;

use super::{ToolCallMatch, ToolCallProtocol};
use crate::error::ProtocolError;

/// Delimiters of a tag-style protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSet {
    pub open: String,
    pub close: String,
    pub result_open: String,
    pub result_close: String,
    pub error_open: String,
    pub error_close: String,
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            open: "<api>".into(),
            close: "</api>".into(),
            result_open: "<result>".into(),
            result_close: "</result>".into(),
            error_open: "<error>".into(),
            error_close: "</error>".into(),
        }
    }
}

impl TagSet {
    /// Sentinel-token delimiters used by the JSON-bodied protocol.
    pub fn sentinel() -> Self {
        Self {
            open: "<|tool_use_start|>".into(),
            close: "<|tool_use_end|>".into(),
            result_open: "<|result_start|>".into(),
            result_close: "<|result_end|>".into(),
            error_open: "<|error_start|>".into(),
            error_close: "<|error_end|>".into(),
        }
    }
}

struct SpanPattern {
    regex: Regex,
    open_len: usize,
    close_len: usize,
}

impl SpanPattern {
    fn compile(open: &str, close: &str) -> Option<Self> {
        let source = format!("{}.*?{}", regex::escape(open), regex::escape(close));
        match Regex::new(&source) {
            Ok(regex) => Some(Self {
                regex,
                open_len: open.len(),
                close_len: close.len(),
            }),
            Err(e) => {
                warn!(pattern = %source, error = %e, "skipping uncompilable tool-call pattern");
                None
            }
        }
    }
}

fn drop_first(s: &str) -> String {
    s.chars().skip(1).collect()
}

fn drop_last(s: &str) -> String {
    let mut out = s.to_string();
    out.pop();
    out
}

fn display_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tag-delimited calls with positional arguments: `<api>name(a, b)</api>`.
///
/// Matching is ASCII-case-insensitive and never spans a newline. When no
/// exact span exists, four single-character corruptions of the delimiters
/// are tried in order: open tag missing its first character, open tag
/// missing its last, close tag missing its last, close tag missing its first.
pub struct TaggedProtocol {
    tags: TagSet,
    patterns: Vec<SpanPattern>,
}

impl TaggedProtocol {
    pub fn new(tags: TagSet) -> Self {
        let open = tags.open.to_ascii_lowercase();
        let close = tags.close.to_ascii_lowercase();
        let candidates = [
            (open.clone(), close.clone()),
            (drop_first(&open), close.clone()),
            (drop_last(&open), close.clone()),
            (open.clone(), drop_last(&close)),
            (open.clone(), drop_first(&close)),
        ];
        let patterns = candidates
            .iter()
            .filter_map(|(o, c)| SpanPattern::compile(o, c))
            .collect();
        Self { tags, patterns }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }
}

impl Default for TaggedProtocol {
    fn default() -> Self {
        Self::new(TagSet::default())
    }
}

impl ToolCallProtocol for TaggedProtocol {
    fn find(&self, text: &str) -> ToolCallMatch {
        let lowered = text.to_ascii_lowercase();
        for pattern in &self.patterns {
            let Some(m) = pattern.regex.find(&lowered) else {
                continue;
            };
            let matched = m.as_str();
            let inner = &matched[pattern.open_len..matched.len() - pattern.close_len];
            return match self.parse(inner) {
                Ok(call) => ToolCallMatch::Found {
                    call,
                    offset: m.start(),
                },
                Err(error) => ToolCallMatch::Malformed {
                    offset: m.start(),
                    body: inner.to_string(),
                    error,
                },
            };
        }
        ToolCallMatch::NotFound
    }

    fn parse(&self, body: &str) -> Result<ToolCall, ProtocolError> {
        let mut s = body.trim().to_ascii_lowercase();
        let name: String = s
            .chars()
            .take_while(|c| c.is_ascii_lowercase() || *c == '_')
            .collect();
        if name.is_empty() {
            return Err(ProtocolError::MissingToolName);
        }
        if !s.ends_with(')') {
            s.push(')');
        }

        let arg_string = match (s.find('('), s.rfind(')')) {
            (Some(start), Some(end)) if start < end => &s[start + 1..end],
            _ => "",
        };
        let args = arg_string
            .split(',')
            .map(|arg| arg.trim().to_lowercase())
            .filter(|arg| !arg.is_empty())
            .collect();

        Ok(ToolCall {
            name,
            args: ToolArgs::Positional(args),
        })
    }

    fn render(&self, call: &ToolCall) -> String {
        let args = match &call.args {
            ToolArgs::Positional(args) => args.join(", "),
            ToolArgs::Named(map) => map
                .values()
                .map(display_arg)
                .collect::<Vec<_>>()
                .join(", "),
        };
        format!("{}{}({}){}", self.tags.open, call.name, args, self.tags.close)
    }

    fn render_example(&self, tool: &ToolDefinition, example: &Map<String, Value>) -> String {
        let args = tool
            .parameters
            .iter()
            .filter_map(|p| example.get(&p.name))
            .map(display_arg)
            .collect();
        self.render(&ToolCall {
            name: tool.name.clone(),
            args: ToolArgs::Positional(args),
        })
    }

    fn render_result(&self, _name: &str, result: &str) -> String {
        format!("{}{}{}", self.tags.result_open, result, self.tags.result_close)
    }

    fn render_error(&self, _name: &str, error: &str) -> String {
        format!("{}{}{}", self.tags.error_open, error, self.tags.error_close)
    }

    fn render_raw(&self, body: &str) -> String {
        format!("{}{}{}", self.tags.open, body, self.tags.close)
    }

    fn render_syntax_error(&self, error: &ProtocolError) -> String {
        self.render_error("", &error.to_string())
    }

    fn stop_words(&self) -> Vec<String> {
        vec![self.tags.close.clone()]
    }

    fn delimiters(&self) -> (&str, &str) {
        (&self.tags.open, &self.tags.close)
    }
}
