use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub sample_url: String,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech synthesis is disabled")]
    Disabled,
    #[error("speech backend returned status {0}")]
    Status(u16),
    #[error("speech backend returned no audio")]
    Empty,
    #[error("speech backend unreachable: {0}")]
    Network(String),
    #[error("speech fixture unreadable: {0}")]
    Fixture(String),
}

/// Text-to-speech contract.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SpeechError>;

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError>;
}
