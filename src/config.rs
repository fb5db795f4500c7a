//! Runtime configuration file.
//!
//! Every section is optional; missing keys keep their defaults. Command line
//! flags are applied on top by `Cli::apply`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use parley_core::generation::{InferenceConfig, SamplingConfig};
use parley_engine::AgentConfig;
use parley_llm::ReliableConfig;
use parley_pipeline::PipelineConfig;
use parley_server::ServerConfig;

const DEFAULT_AGENT_SYSTEM: &str = "You are a helpful assistant. Solve the user's task step by step \
using the tools available to you, and report the final answer with the done tool.";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub reliability: ReliableConfig,
    pub inference: InferenceConfig,
    pub generation: GenerationSection,
    pub completion: CompletionSection,
    pub agent: AgentSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Chat template preset used for text-only models.
    pub template: String,
    pub system_prompt: String,
    pub sampling: SamplingConfig,
    pub voice_id: Option<String>,
    pub clear_context: bool,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            template: "llama3".into(),
            system_prompt: "You are a helpful assistant.".into(),
            sampling: SamplingConfig::default(),
            voice_id: None,
            clear_context: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSection {
    /// Tool calls intercepted per completion before the rest streams untouched.
    pub max_tool_calls: u32,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self { max_tool_calls: 8 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub enabled: bool,
    pub name: String,
    pub system: String,
    #[serde(flatten)]
    pub limits: AgentConfig,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "assistant".into(),
            system: DEFAULT_AGENT_SYSTEM.into(),
            limits: AgentConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }
}
