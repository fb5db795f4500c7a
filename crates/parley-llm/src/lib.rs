pub mod dummy;
pub mod factory;
pub mod launcher;
pub mod llamacpp;
pub mod ndjson;
pub mod reliable;

pub mod mock;

pub use dummy::DummyGenerator;
pub use factory::{build_generator, InferenceBackendKind};
pub use llamacpp::{LlamaCppConfig, LlamaCppGenerator};
pub use reliable::{ReliableConfig, ReliableGenerator};
