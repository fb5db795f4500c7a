//! # parley-engine
//!
//! Generation logic between a text generator and the outside world:
//! - **Protocol**: detect, parse and render tool-call markup in generated text
//! - **Render**: conversation turns to flat-string or structured prompts
//! - **Agent**: the bounded multi-round loop with tools, sandboxes and sub-agents
//! - **Completion**: single-pass generation with mid-stream tool calls

#![deny(unsafe_code)]

pub mod agent;
pub mod code;
pub mod completion;
pub mod docs;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod sandbox;
pub mod sink;
mod stream;
pub mod tools;

pub use agent::{AgentConfig, AgentRoundState, AgentSpec, Orchestrator, RoundOutcome};
pub use completion::ToolAugmentedCompletion;
pub use error::{AgentError, InvokeError, ProtocolError, SandboxError};
pub use protocol::{JsonProtocol, TagSet, TaggedProtocol, ToolCallMatch, ToolCallProtocol};
pub use registry::ToolRegistry;
pub use render::{renderer_for, ChatRenderer, ChatTemplate};
pub use sink::{EventSink, NullSink, RecordingSink};
