//! # parley-pipeline
//!
//! Wraps a generation run with a token producer and a speech consumer joined
//! by a bounded queue, publishing everything on per-session channels.

#![deny(unsafe_code)]

pub mod consumer;
pub mod error;
pub mod hub;
pub mod run;
pub mod samples;
pub mod sentences;

pub use consumer::SpeechSegment;
pub use error::PipelineError;
pub use hub::{ChannelHub, SessionSink};
pub use run::{PipelineConfig, RunMode, RunRequest, StreamingPipeline};
pub use samples::SampleStore;
