use tracing::warn;

use parley_core::prompt::{ImageUrl, Prompt, PromptEntry, PromptSegment};
use parley_core::turns::{ConversationTurn, Role};

use super::ChatRenderer;

/// Chat-message prompts with image references, for multimodal models.
pub struct StructuredRenderer;

fn entry(turn: &ConversationTurn) -> PromptEntry {
    let mut text = turn.body_text();
    text.push_str(&turn.trailing_text());
    let mut content = vec![PromptSegment::Text { text }];
    content.extend(turn.images().map(|url| PromptSegment::ImageUrl {
        image_url: ImageUrl { url: url.to_string() },
    }));
    PromptEntry {
        role: turn.role,
        content,
    }
}

impl ChatRenderer for StructuredRenderer {
    fn render(&self, system: &str, turns: &[ConversationTurn], continuation: bool) -> Prompt {
        let turns = ConversationTurn::collate(turns);
        let mut entries = Vec::with_capacity(turns.len() + 2);
        if !system.is_empty() {
            entries.push(PromptEntry {
                role: Role::System,
                content: vec![PromptSegment::Text { text: system.to_string() }],
            });
        }
        entries.extend(turns.iter().map(entry));

        let continues_last = continuation && turns.last().is_some_and(|t| t.role == Role::Assistant);
        if !continues_last {
            entries.push(PromptEntry {
                role: Role::Assistant,
                content: vec![PromptSegment::Text { text: String::new() }],
            });
        }
        Prompt::Messages(entries)
    }

    fn concatenate(&self, prompt: &Prompt, text: &str) -> Prompt {
        match prompt {
            Prompt::Messages(entries) => {
                let mut entries = entries.clone();
                let Some(last) = entries.last_mut() else {
                    warn!("cannot extend an empty structured prompt");
                    return prompt.clone();
                };
                match last.content.last_mut() {
                    Some(PromptSegment::Text { text: trailing }) => trailing.push_str(text),
                    _ => last.content.push(PromptSegment::Text { text: text.to_string() }),
                }
                Prompt::Messages(entries)
            }
            Prompt::Text(p) => Prompt::Text(format!("{p}{text}")),
        }
    }
}
