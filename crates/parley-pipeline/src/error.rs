use parley_core::errors::BackendError;
use parley_engine::error::AgentError;
use parley_speech::WavError;
use parley_store::StoreError;

/// Faults that end a pipeline run with `generation_error`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("could not store reply: {0}")]
    Store(#[from] StoreError),

    #[error("could not assemble speech: {0}")]
    Wav(#[from] WavError),

    #[error("could not serialize reply: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("generation panicked: {0}")]
    Panicked(String),
}
