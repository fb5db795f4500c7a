use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{BuildId, SampleId, SessionId};

/// Data of the final `end_of_stream` event.
pub const STREAM_END_SENTINEL: &str = "[END_OF_STREAM]";
/// Data of the final `end_of_speech` event.
pub const SPEECH_END_SENTINEL: &str = "[END_OF_SPEECH]";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallNotice {
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Build,
    Run,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildNotice {
    pub id: BuildId,
    pub phase: BuildPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub id: BuildId,
    pub phase: BuildPhase,
    pub success: bool,
    pub output: String,
}

/// Outcome of synthesizing one sentence. `id` and `url` are both null on failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeechSampleNotice {
    pub id: Option<SampleId>,
    pub url: Option<String>,
    pub text: String,
    pub latency_ms: u64,
}

/// Events published while a generation run is in flight.
///
/// Serialized as the `{event, data}` envelope receivers parse. A run publishes
/// exactly one terminal event (`generation_complete` or `generation_error`),
/// then one `end_of_stream`, then one `end_of_speech`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    TokensArrived(String),
    GenerationPaused(String),
    ToolCallStarted(ToolCallNotice),
    ToolCallFinished(ToolCallReport),
    BuildStarted(BuildNotice),
    BuildFinished(BuildReport),
    SpeechSampleArrived(SpeechSampleNotice),
    GenerationComplete(Value),
    GenerationError(String),
    EndOfStream(String),
    EndOfSpeech(String),
}

impl StreamEvent {
    pub fn end_of_stream() -> Self {
        Self::EndOfStream(STREAM_END_SENTINEL.to_string())
    }

    pub fn end_of_speech() -> Self {
        Self::EndOfSpeech(SPEECH_END_SENTINEL.to_string())
    }

    /// Tag string used in the envelope.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TokensArrived(_) => "tokens_arrived",
            Self::GenerationPaused(_) => "generation_paused",
            Self::ToolCallStarted(_) => "tool_call_started",
            Self::ToolCallFinished(_) => "tool_call_finished",
            Self::BuildStarted(_) => "build_started",
            Self::BuildFinished(_) => "build_finished",
            Self::SpeechSampleArrived(_) => "speech_sample_arrived",
            Self::GenerationComplete(_) => "generation_complete",
            Self::GenerationError(_) => "generation_error",
            Self::EndOfStream(_) => "end_of_stream",
            Self::EndOfSpeech(_) => "end_of_speech",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GenerationComplete(_) | Self::GenerationError(_))
    }

    /// Session channel this event is published on.
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::SpeechSampleArrived(_) | Self::EndOfSpeech(_) => ChannelKind::Speech,
            Self::BuildStarted(_) | Self::BuildFinished(_) => ChannelKind::Build,
            _ => ChannelKind::Tokens,
        }
    }

    /// JSON envelope `{event, data}`.
    pub fn to_envelope(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Tokens,
    Speech,
    Build,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Tokens, Self::Speech, Self::Build];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Tokens => "token_stream",
            Self::Speech => "speech_stream",
            Self::Build => "build_events",
        }
    }

    /// Channel name for one session, e.g. `token_stream:sess_...`.
    pub fn channel_name(self, session: &SessionId) -> String {
        format!("{}:{}", self.prefix(), session)
    }
}
