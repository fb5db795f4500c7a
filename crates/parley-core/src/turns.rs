use serde::{Deserialize, Serialize};

use crate::tool_call::ToolCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One piece of a turn's content.
///
/// Tool segments keep the markup they were rendered to, so prompt rendering
/// never depends on which tool-call protocol produced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Image { url: String },
    /// Text derived from an attachment, rendered after the turn's own text.
    Attachment { name: String, text: String },
    ToolCall { call: ToolCall, markup: String },
    ToolResult { name: String, result: String, markup: String },
    ToolError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        error: String,
        markup: String,
    },
}

impl Segment {
    /// Text contribution of this segment to a flat prompt. Images contribute nothing.
    pub fn prompt_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
            Self::Attachment { text, .. } => Some(text),
            Self::ToolCall { markup, .. }
            | Self::ToolResult { markup, .. }
            | Self::ToolError { markup, .. } => Some(markup),
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Attachment { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub segments: Vec<Segment>,
}

impl ConversationTurn {
    pub fn new(role: Role, segments: Vec<Segment>) -> Self {
        Self { role, segments }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![Segment::Text { text: text.into() }])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.segments.push(Segment::Image { url: url.into() });
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.segments.push(Segment::Attachment {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    /// Body text: every non-attachment segment joined in order.
    pub fn body_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.is_attachment())
            .filter_map(Segment::prompt_text)
            .collect()
    }

    /// Attachment-derived text that trails the body.
    pub fn trailing_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| s.is_attachment())
            .filter_map(Segment::prompt_text)
            .collect()
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Image { url } => Some(url.as_str()),
            _ => None,
        })
    }

    pub fn has_image(&self) -> bool {
        self.images().next().is_some()
    }

    /// Merge consecutive turns of the same role into one turn.
    pub fn collate(turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
        let mut out: Vec<ConversationTurn> = Vec::with_capacity(turns.len());
        for turn in turns {
            match out.last_mut() {
                Some(last) if last.role == turn.role => {
                    last.segments.extend(turn.segments.iter().cloned());
                }
                _ => out.push(turn.clone()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_and_trailing_text_are_separated() {
        let turn = ConversationTurn::user("summarize this")
            .with_attachment("notes.txt", "\nfile body")
            .with_image("data:image/png;base64,AAAA");
        assert_eq!(turn.body_text(), "summarize this");
        assert_eq!(turn.trailing_text(), "\nfile body");
        assert!(turn.has_image());
    }

    #[test]
    fn collate_merges_same_role_runs() {
        let turns = vec![
            ConversationTurn::user("q"),
            ConversationTurn::assistant("a1"),
            ConversationTurn::assistant("a2"),
            ConversationTurn::user("q2"),
        ];
        let collated = ConversationTurn::collate(&turns);
        assert_eq!(collated.len(), 3);
        assert_eq!(collated[1].body_text(), "a1a2");
    }

    #[test]
    fn segment_serde_is_tagged() {
        let seg = Segment::ToolError {
            name: None,
            error: "bad".into(),
            markup: "<error>bad</error>".into(),
        };
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["type"], "tool_error");
        assert!(json.get("name").is_none());
    }
}
