pub mod backends;
pub mod factory;
pub mod testing;
pub mod wav;

pub use backends::{FixtureSynthesizer, NullSynthesizer, RemoteSpeechConfig, RemoteSynthesizer};
pub use factory::{build_synthesizer, SpeechBackendKind};
pub use wav::WavError;
