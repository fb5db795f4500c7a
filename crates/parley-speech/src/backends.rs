use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use parley_core::speech::{SpeechError, SpeechSynthesizer, Voice};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Synthesizer used when speech is switched off. Every call fails.
pub struct NullSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NullSynthesizer {
    fn name(&self) -> &str {
        "null"
    }

    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Bytes, SpeechError> {
        Err(SpeechError::Disabled)
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        Ok(Vec::new())
    }
}

/// Returns the same audio file for every sentence.
pub struct FixtureSynthesizer {
    path: PathBuf,
}

impl FixtureSynthesizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpeechSynthesizer for FixtureSynthesizer {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Bytes, SpeechError> {
        tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|e| SpeechError::Fixture(format!("{}: {e}", self.path.display())))
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        Ok(vec![Voice {
            id: "fixture".into(),
            sample_url: self.path.display().to_string(),
        }])
    }
}

#[derive(Clone, Debug)]
pub struct RemoteSpeechConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl RemoteSpeechConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    voice_id: &'a str,
}

/// The voices endpoint lists either bare names or full records.
#[derive(Deserialize)]
#[serde(untagged)]
enum VoiceEntry {
    Name(String),
    Full(Voice),
}

/// Client for an HTTP text-to-speech server.
pub struct RemoteSynthesizer {
    client: Client,
    config: RemoteSpeechConfig,
}

impl RemoteSynthesizer {
    pub fn new(config: RemoteSpeechConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSynthesizer {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SpeechError> {
        let url = format!("{}/tts/", self.config.base_url());
        let resp = self
            .client
            .post(&url)
            .json(&SynthesisBody { text, voice_id })
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            warn!(status, "speech backend rejected request");
            return Err(SpeechError::Status(status));
        }
        let audio = resp
            .bytes()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::Empty);
        }
        debug!(bytes = audio.len(), "speech sample received");
        Ok(audio)
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let base = self.config.base_url();
        let resp = self
            .client
            .get(format!("{base}/voices/"))
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SpeechError::Status(resp.status().as_u16()));
        }
        let entries: Vec<VoiceEntry> = resp
            .json()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                VoiceEntry::Full(voice) => voice,
                VoiceEntry::Name(id) => Voice {
                    sample_url: format!("{base}/samples/{id}.wav"),
                    id,
                },
            })
            .collect())
    }
}
