use tracing::warn;

use parley_core::prompt::Prompt;
use parley_core::turns::ConversationTurn;

use super::{ChatRenderer, ChatTemplate};

/// Flat-string prompts built from a [`ChatTemplate`].
///
/// Turns alternate question/answer by position, whatever their role field says.
pub struct StringRenderer {
    template: ChatTemplate,
}

impl StringRenderer {
    pub fn new(template: ChatTemplate) -> Self {
        Self { template }
    }
}

impl ChatRenderer for StringRenderer {
    fn render(&self, system: &str, turns: &[ConversationTurn], continuation: bool) -> Prompt {
        let t = &self.template;
        let turns = ConversationTurn::collate(turns);
        let mut out = t.bos.clone();

        if !system.is_empty() {
            out.push_str(&t.system_prefix);
            out.push_str(system);
            out.push_str(&t.system_suffix);
        }

        let last = turns.len().checked_sub(1);
        let mut left_open = false;
        for (i, turn) in turns.iter().enumerate() {
            let is_answer = i % 2 == 1;
            let (prefix, suffix) = if is_answer {
                (&t.answer_prefix, &t.answer_suffix)
            } else {
                (&t.question_prefix, &t.question_suffix)
            };
            out.push_str(prefix);
            out.push_str(&turn.body_text());
            out.push_str(&turn.trailing_text());

            if continuation && is_answer && Some(i) == last {
                left_open = true;
            } else {
                out.push_str(suffix);
            }
        }

        if !left_open {
            out.push_str(&t.answer_prefix);
        }
        Prompt::Text(out)
    }

    fn concatenate(&self, prompt: &Prompt, text: &str) -> Prompt {
        match prompt {
            Prompt::Text(p) => {
                let mut out = String::with_capacity(p.len() + self.template.continuation_prefix.len() + text.len());
                out.push_str(p);
                out.push_str(&self.template.continuation_prefix);
                out.push_str(text);
                Prompt::Text(out)
            }
            Prompt::Messages(_) => {
                warn!("flat renderer asked to extend a structured prompt; leaving it unchanged");
                prompt.clone()
            }
        }
    }
}
