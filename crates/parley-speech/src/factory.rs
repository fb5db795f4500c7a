use std::path::PathBuf;
use std::sync::Arc;

use parley_core::speech::{SpeechError, SpeechSynthesizer};

use crate::backends::{FixtureSynthesizer, NullSynthesizer, RemoteSpeechConfig, RemoteSynthesizer};

/// The speech backends this build knows how to construct.
#[derive(Clone, Debug)]
pub enum SpeechBackendKind {
    Null,
    Fixture { path: PathBuf },
    Remote(RemoteSpeechConfig),
}

impl SpeechBackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Fixture { .. } => "fixture",
            Self::Remote(_) => "remote",
        }
    }
}

pub fn build_synthesizer(kind: SpeechBackendKind) -> Result<Arc<dyn SpeechSynthesizer>, SpeechError> {
    Ok(match kind {
        SpeechBackendKind::Null => Arc::new(NullSynthesizer),
        SpeechBackendKind::Fixture { path } => Arc::new(FixtureSynthesizer::new(path)),
        SpeechBackendKind::Remote(config) => Arc::new(RemoteSynthesizer::new(config)?),
    })
}
