//! # parley
//!
//! Parley server binary: wires the inference backend, speech backend,
//! conversation store and pipeline together and starts the HTTP/WebSocket
//! server.

#![deny(unsafe_code)]

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use tracing::Level;

use parley_engine::sandbox::InterpreterRegistry;
use parley_engine::tools::create_default_registry;
use parley_engine::{renderer_for, AgentSpec, ChatTemplate, Orchestrator, ToolAugmentedCompletion};
use parley_llm::launcher::ModelLauncher;
use parley_llm::{build_generator, InferenceBackendKind, LlamaCppConfig};
use parley_pipeline::{ChannelHub, SampleStore, StreamingPipeline};
use parley_server::{GenerationDefaults, ParleyServer};
use parley_speech::{build_synthesizer, RemoteSpeechConfig, SpeechBackendKind};
use parley_store::SharedTree;
use parley_telemetry::{init_telemetry, TelemetryConfig};

use crate::config::RuntimeConfig;

/// How long a launched model server may take to report healthy.
const LAUNCH_READY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InferenceArg {
    Llamacpp,
    Dummy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SpeechArg {
    Null,
    Fixture,
    Remote,
}

/// Parley server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Streaming text and speech generation server")]
struct Cli {
    /// JSON configuration file. Flags below take precedence over it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Inference backend.
    #[arg(long, value_enum, default_value = "llamacpp")]
    inference: InferenceArg,

    #[arg(long, default_value = "localhost")]
    inference_host: String,

    #[arg(long, default_value = "8080")]
    inference_port: u16,

    #[arg(long)]
    inference_tls: bool,

    /// Bearer token for the inference server.
    #[arg(long)]
    inference_api_key: Option<String>,

    /// Per-token delay of the dummy backend.
    #[arg(long, default_value = "20")]
    dummy_delay_ms: u64,

    /// Start a llama.cpp server from this executable before serving.
    #[arg(long)]
    launch: Option<PathBuf>,

    /// Model file for `--launch`.
    #[arg(long)]
    model: Option<String>,

    /// Drop the backend's cached context on every run.
    #[arg(long)]
    clear_context: bool,

    /// Speech backend.
    #[arg(long, value_enum, default_value = "null")]
    speech: SpeechArg,

    #[arg(long, default_value = "localhost")]
    speech_host: String,

    #[arg(long, default_value = "5002")]
    speech_port: u16,

    #[arg(long)]
    speech_tls: bool,

    /// WAV file returned for every sentence by the fixture backend.
    #[arg(long)]
    speech_fixture: Option<PathBuf>,

    /// Default voice for runs that do not name one.
    #[arg(long)]
    voice: Option<String>,

    /// Enable agent-mode runs.
    #[arg(long)]
    agent: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Overlay explicit flags on the file configuration.
    fn apply(&self, config: &mut RuntimeConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = &self.model {
            config.inference.model = model.clone();
        }
        if let Some(voice) = &self.voice {
            config.generation.voice_id = Some(voice.clone());
        }
        config.generation.clear_context |= self.clear_context;
        config.agent.enabled |= self.agent;
    }

    fn inference_backend(&self) -> InferenceBackendKind {
        match self.inference {
            InferenceArg::Llamacpp => InferenceBackendKind::LlamaCpp(LlamaCppConfig {
                host: self.inference_host.clone(),
                port: self.inference_port,
                use_tls: self.inference_tls,
                api_key: self.inference_api_key.clone().map(SecretString::from),
                ..LlamaCppConfig::default()
            }),
            InferenceArg::Dummy => InferenceBackendKind::Dummy {
                delay_ms: self.dummy_delay_ms,
            },
        }
    }

    fn speech_backend(&self) -> Result<SpeechBackendKind> {
        Ok(match self.speech {
            SpeechArg::Null => SpeechBackendKind::Null,
            SpeechArg::Fixture => SpeechBackendKind::Fixture {
                path: self
                    .speech_fixture
                    .clone()
                    .context("--speech fixture requires --speech-fixture <path>")?,
            },
            SpeechArg::Remote => SpeechBackendKind::Remote(RemoteSpeechConfig {
                host: self.speech_host.clone(),
                port: self.speech_port,
                use_tls: self.speech_tls,
            }),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    cli.apply(&mut config);

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        module_levels: vec![],
        json: cli.json_logs,
    });
    let metrics = telemetry.metrics();

    let launcher = match &cli.launch {
        Some(executable) => {
            let launcher = ModelLauncher::new(executable, cli.inference_host.clone(), cli.inference_port);
            launcher
                .launch(&config.inference.model, &config.inference.launch)
                .await
                .context("Failed to launch model server")?;
            if let Err(e) = launcher.wait_ready(LAUNCH_READY_TIMEOUT).await {
                launcher.shutdown().await;
                return Err(e).context("Model server did not become ready");
            }
            Some(launcher)
        }
        None => None,
    };

    let inference = cli.inference_backend();
    tracing::info!(backend = inference.name(), "inference backend");
    let generator = build_generator(inference, config.reliability.clone()).context("Failed to build inference backend")?;

    let speech = cli.speech_backend()?;
    tracing::info!(backend = speech.name(), "speech backend");
    let synthesizer = build_synthesizer(speech).context("Failed to build speech backend")?;

    let template = ChatTemplate::preset(&config.generation.template)
        .with_context(|| format!("Unknown chat template: {}", config.generation.template))?;
    let renderer = renderer_for(&config.inference.launch, template);

    let tools = Arc::new(create_default_registry());
    let completion = ToolAugmentedCompletion::new(Arc::clone(&generator), Arc::clone(&renderer), Arc::clone(&tools))
        .with_max_tool_calls(config.completion.max_tool_calls);
    let orchestrator = Orchestrator::new(generator, Arc::clone(&renderer))
        .with_tools(tools)
        .with_interpreters(Arc::new(InterpreterRegistry::local()));

    let tree = SharedTree::new();
    let pipeline = StreamingPipeline::new(
        Arc::new(completion),
        Arc::new(orchestrator),
        synthesizer,
        Arc::new(tree.clone()),
        Arc::new(ChannelHub::new()),
        Arc::new(SampleStore::new(config.pipeline.sample_route.clone())),
    )
    .with_metrics(Arc::clone(&metrics))
    .with_config(config.pipeline.clone());

    let mut server = ParleyServer::new(config.server.clone(), Arc::new(pipeline), tree, renderer)
        .with_defaults(GenerationDefaults {
            system_prompt: config.generation.system_prompt.clone(),
            inference: config.inference.clone(),
            sampling: config.generation.sampling.clone(),
            voice_id: config.generation.voice_id.clone(),
            clear_context: config.generation.clear_context,
        })
        .with_metrics(metrics);
    if config.agent.enabled {
        let agent = AgentSpec::new(config.agent.name.clone(), config.agent.system.clone())
            .with_config(config.agent.limits.clone())
            .with_sampling(config.generation.sampling.clone());
        server = server.with_agent(Arc::new(agent));
        tracing::info!(name = %config.agent.name, "agent mode enabled");
    }

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutting down..."),
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        }
        shutdown.cancel();
    });

    tracing::info!(addr = %config.server.bind_addr(), "parley server starting");
    let served = server.run().await.context("Server failed");

    if let Some(launcher) = launcher {
        launcher.shutdown().await;
    }
    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("parley").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_parse() {
        let cli = parse(&[]);
        assert_eq!(cli.inference, InferenceArg::Llamacpp);
        assert_eq!(cli.speech, SpeechArg::Null);
        assert_eq!(cli.log_level, Level::INFO);
        assert!(!cli.agent);
        assert!(matches!(cli.inference_backend(), InferenceBackendKind::LlamaCpp(c) if c.port == 8080));
    }

    #[test]
    fn flags_override_file_values() {
        let cli = parse(&["--port", "9100", "--agent", "--clear-context", "--voice", "alba"]);
        let mut config: RuntimeConfig =
            serde_json::from_str(r#"{"server": {"host": "0.0.0.0", "port": 8500}}"#).unwrap();
        cli.apply(&mut config);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert!(config.agent.enabled);
        assert!(config.generation.clear_context);
        assert_eq!(config.generation.voice_id.as_deref(), Some("alba"));
    }

    #[test]
    fn unset_flags_keep_file_values() {
        let cli = parse(&[]);
        let mut config: RuntimeConfig =
            serde_json::from_str(r#"{"agent": {"enabled": true}, "generation": {"clear_context": true}}"#).unwrap();
        cli.apply(&mut config);
        assert!(config.agent.enabled);
        assert!(config.generation.clear_context);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn dummy_backend_uses_delay_flag() {
        let cli = parse(&["--inference", "dummy", "--dummy-delay-ms", "5"]);
        assert!(matches!(cli.inference_backend(), InferenceBackendKind::Dummy { delay_ms: 5 }));
    }

    #[test]
    fn fixture_speech_requires_path() {
        assert!(parse(&["--speech", "fixture"]).speech_backend().is_err());
        let kind = parse(&["--speech", "fixture", "--speech-fixture", "/tmp/a.wav"])
            .speech_backend()
            .unwrap();
        assert!(matches!(kind, SpeechBackendKind::Fixture { path } if path == PathBuf::from("/tmp/a.wav")));
    }
}
