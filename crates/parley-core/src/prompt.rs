use serde::{Deserialize, Serialize};

use crate::turns::Role;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Content segment of a structured prompt entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptSegment {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub role: Role,
    pub content: Vec<PromptSegment>,
}

/// A model-ready prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Messages(Vec<PromptEntry>),
}

impl Prompt {
    /// Number of structured entries; a flat prompt counts as one.
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Text(_) => 1,
            Self::Messages(entries) => entries.len(),
        }
    }

    /// Total text length in bytes, summed over structured text segments.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Messages(entries) => entries
                .iter()
                .flat_map(|e| e.content.iter())
                .map(|s| match s {
                    PromptSegment::Text { text } => text.len(),
                    PromptSegment::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Messages(_) => None,
        }
    }
}
