//! Conversation-to-prompt rendering.

mod string;
mod structured;
mod template;

pub use string::StringRenderer;
pub use structured::StructuredRenderer;
pub use template::ChatTemplate;

use std::sync::Arc;

use parley_core::generation::LaunchParams;
use parley_core::prompt::Prompt;
use parley_core::turns::ConversationTurn;

/// Turns system text plus ordered turns into a model-ready prompt.
pub trait ChatRenderer: Send + Sync {
    /// Render the full conversation. With `continuation` set and the last
    /// turn in an answer position, that turn is left open for the model to extend.
    fn render(&self, system: &str, turns: &[ConversationTurn], continuation: bool) -> Prompt;

    /// Extend an in-flight prompt without re-rendering history.
    fn concatenate(&self, prompt: &Prompt, text: &str) -> Prompt;
}

/// Vision-capable models get structured prompts; everything else a flat string.
pub fn renderer_for(launch: &LaunchParams, template: ChatTemplate) -> Arc<dyn ChatRenderer> {
    if launch.is_multimodal() {
        Arc::new(StructuredRenderer)
    } else {
        Arc::new(StringRenderer::new(template))
    }
}
