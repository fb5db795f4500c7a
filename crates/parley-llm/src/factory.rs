use std::sync::Arc;
use std::time::Duration;

use parley_core::errors::BackendError;
use parley_core::generator::TextGenerator;

use crate::dummy::DummyGenerator;
use crate::llamacpp::{LlamaCppConfig, LlamaCppGenerator};
use crate::reliable::{ReliableConfig, ReliableGenerator};

/// The inference backends this build knows how to construct.
#[derive(Clone, Debug)]
pub enum InferenceBackendKind {
    LlamaCpp(LlamaCppConfig),
    Dummy { delay_ms: u64 },
}

impl InferenceBackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LlamaCpp(_) => "llamacpp",
            Self::Dummy { .. } => "dummy",
        }
    }
}

/// Build a generator for `kind`. Network backends are wrapped in the retry policy.
pub fn build_generator(
    kind: InferenceBackendKind,
    reliability: ReliableConfig,
) -> Result<Arc<dyn TextGenerator>, BackendError> {
    match kind {
        InferenceBackendKind::LlamaCpp(config) => {
            let inner = LlamaCppGenerator::new(config)?;
            Ok(Arc::new(ReliableGenerator::new(inner, reliability)))
        }
        InferenceBackendKind::Dummy { delay_ms } => {
            Ok(Arc::new(DummyGenerator::new(Duration::from_millis(delay_ms))))
        }
    }
}
