//! `ParleyServer`: axum HTTP and WebSocket surface over the streaming pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_core::generation::{InferenceConfig, SamplingConfig};
use parley_engine::agent::AgentSpec;
use parley_engine::render::ChatRenderer;
use parley_pipeline::StreamingPipeline;
use parley_store::SharedTree;
use parley_telemetry::MetricsRecorder;

use crate::{bridge, handlers};

/// How long in-flight runs may take to finish once the server stops.
const RUN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Values applied to every run unless the request overrides them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    /// System text of newly started conversations.
    pub system_prompt: String,
    pub inference: InferenceConfig,
    pub sampling: SamplingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Ask the backend to drop its cached context on every run.
    pub clear_context: bool,
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<StreamingPipeline>,
    pub tree: SharedTree,
    pub renderer: Arc<dyn ChatRenderer>,
    /// Present when agent-mode runs are enabled.
    pub agent: Option<Arc<AgentSpec>>,
    pub defaults: Arc<GenerationDefaults>,
    pub metrics: Arc<MetricsRecorder>,
    /// In-flight generation runs.
    pub runs: TaskTracker,
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

pub struct ParleyServer {
    config: ServerConfig,
    state: AppState,
}

impl ParleyServer {
    pub fn new(
        config: ServerConfig,
        pipeline: Arc<StreamingPipeline>,
        tree: SharedTree,
        renderer: Arc<dyn ChatRenderer>,
    ) -> Self {
        Self {
            config,
            state: AppState {
                pipeline,
                tree,
                renderer,
                agent: None,
                defaults: Arc::new(GenerationDefaults::default()),
                metrics: Arc::new(MetricsRecorder::new()),
                runs: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                start_time: Instant::now(),
            },
        }
    }

    pub fn with_agent(mut self, agent: Arc<AgentSpec>) -> Self {
        self.state.agent = Some(agent);
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.state.defaults = Arc::new(defaults);
        self
    }

    /// Recorder served on `/metrics`. Should be the one the pipeline writes to.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.state.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Cancelling this token stops the server and closes every WebSocket.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .route("/voices", get(handlers::voices))
            .route("/generate", post(handlers::generate))
            .route("/samples/{id}", get(handlers::sample))
            .route("/ws/{session}", get(bridge::ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on `listener` until the shutdown token fires, then wait for
    /// in-flight runs to finish.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = ?listener.local_addr().ok(), "listening");
        let token = self.state.shutdown.clone();
        let runs = self.state.runs.clone();

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        runs.close();
        info!(in_flight = runs.len(), "server stopped, draining runs");
        if tokio::time::timeout(RUN_DRAIN_TIMEOUT, runs.wait()).await.is_err() {
            warn!("runs still in flight after {RUN_DRAIN_TIMEOUT:?}, abandoning them");
        }
        Ok(())
    }
}
