//! Deterministic synthesizers for tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use parley_core::speech::{SpeechError, SpeechSynthesizer, Voice};

use crate::wav::{self, WavFormat};

/// Succeeds with a short WAV whose frames encode the call index, and records every text.
pub struct ScriptedSynthesizer {
    format: WavFormat,
    delay: Duration,
    texts: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            format: WavFormat::pcm(1, 16_000, 16),
            delay: Duration::ZERO,
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

impl Default for ScriptedSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Bytes, SpeechError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let index = {
            let mut texts = self.texts.lock();
            texts.push(text.to_string());
            texts.len() as u8
        };
        Ok(wav::encode(&self.format, &[index, index]))
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        Ok(vec![Voice {
            id: "scripted".into(),
            sample_url: "/voices/scripted.wav".into(),
        }])
    }
}

/// Fails every call with a backend status error, counting attempts.
#[derive(Default)]
pub struct FailingSynthesizer {
    attempts: Mutex<Vec<String>>,
}

impl FailingSynthesizer {
    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl SpeechSynthesizer for FailingSynthesizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Bytes, SpeechError> {
        self.attempts.lock().push(text.to_string());
        Err(SpeechError::Status(500))
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        Err(SpeechError::Status(500))
    }
}
