use serde::{Deserialize, Serialize};

/// Chat template fragments for flat-string prompts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatTemplate {
    /// Beginning-of-text marker, emitted once.
    pub bos: String,
    pub system_prefix: String,
    pub system_suffix: String,
    pub question_prefix: String,
    pub question_suffix: String,
    /// Also opens the assistant turn the model is asked to write.
    pub answer_prefix: String,
    pub answer_suffix: String,
    /// Inserted before text appended to an in-flight prompt.
    pub continuation_prefix: String,
}

impl ChatTemplate {
    pub fn llama3() -> Self {
        Self {
            bos: "<|begin_of_text|>".into(),
            system_prefix: "<|start_header_id|>system<|end_header_id|>\n\n".into(),
            system_suffix: "<|eot_id|>".into(),
            question_prefix: "<|start_header_id|>user<|end_header_id|>\n\n".into(),
            question_suffix: "<|eot_id|>".into(),
            answer_prefix: "<|start_header_id|>assistant<|end_header_id|>\n\n".into(),
            answer_suffix: "<|eot_id|>".into(),
            continuation_prefix: String::new(),
        }
    }

    pub fn chatml() -> Self {
        Self {
            bos: String::new(),
            system_prefix: "<|im_start|>system\n".into(),
            system_suffix: "<|im_end|>\n".into(),
            question_prefix: "<|im_start|>user\n".into(),
            question_suffix: "<|im_end|>\n".into(),
            answer_prefix: "<|im_start|>assistant\n".into(),
            answer_suffix: "<|im_end|>\n".into(),
            continuation_prefix: String::new(),
        }
    }

    /// Preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "llama3" => Some(Self::llama3()),
            "chatml" => Some(Self::chatml()),
            _ => None,
        }
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::llama3()
    }
}
