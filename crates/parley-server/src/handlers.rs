//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use parley_core::generation::{GenerationSpec, ImagePayload, SamplingConfig};
use parley_core::ids::{NodeId, RunId, SampleId, SessionId};
use parley_core::prompt::Prompt;
use parley_core::speech::Voice;
use parley_core::turns::Role;
use parley_pipeline::RunRequest;
use parley_store::StoreError;
use parley_telemetry::MetricSnapshot;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub active_runs: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_runs: state.runs.len(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Json<Vec<MetricSnapshot>> {
    Json(state.metrics.snapshot())
}

/// GET /voices
pub async fn voices(State(state): State<AppState>) -> Result<Json<Vec<Voice>>, ApiError> {
    Ok(Json(state.pipeline.synthesizer().list_voices().await?))
}

/// GET /samples/{id}
pub async fn sample(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let audio = state
        .pipeline
        .samples()
        .get(&SampleId::from_raw(id))
        .ok_or(ApiError::SampleNotFound)?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateMode {
    #[default]
    Completion,
    Agent,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Session whose channels receive the run's events. A new one when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Message being replied to. Starts a new conversation when absent.
    #[serde(default)]
    pub parent: Option<NodeId>,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub mode: GenerateMode,
    #[serde(default)]
    pub clear_context: bool,
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
}

#[derive(Debug, Serialize)]
pub struct GenerateAccepted {
    pub session_id: SessionId,
    pub run: RunId,
    /// The stored user message the reply will attach to.
    pub node: NodeId,
}

/// POST /generate
///
/// Stores the user message and starts a run in the background. Events arrive
/// on the session's WebSocket, which should be open before this call.
pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateAccepted>), ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }
    let agent = match body.mode {
        GenerateMode::Agent => Some(
            state
                .agent
                .clone()
                .ok_or_else(|| ApiError::BadRequest("agent mode is not enabled".into()))?,
        ),
        GenerateMode::Completion => None,
    };

    let system_prompt = state.defaults.system_prompt.clone();
    let (node, system, turns) = state.tree.write(|tree| -> Result<_, StoreError> {
        let parent = match body.parent {
            Some(parent) => parent,
            None => tree.add_root(system_prompt),
        };
        let node = tree.reply(parent, Role::User, body.text.clone())?;
        if let Some(url) = &body.image_url {
            tree.set_image(node, url.clone())?;
        }
        let (system, turns) = tree.turns(node)?;
        Ok((node, system, turns))
    })?;

    let mut generation = GenerationSpec::new(Prompt::Text(String::new()), node);
    generation.inference = state.defaults.inference.clone();
    generation.sampling = body.sampling.unwrap_or_else(|| state.defaults.sampling.clone());
    generation.clear_context = body.clear_context || state.defaults.clear_context;
    generation.image = body.image_url.map(|url| ImagePayload::Url { url });
    generation.voice_id = body.voice_id.or_else(|| state.defaults.voice_id.clone());

    let session = body.session_id.unwrap_or_default();
    let request = match agent {
        Some(agent) => RunRequest::agent(session.clone(), generation, agent, turns),
        None => {
            generation.prompt = state.renderer.render(&system, &turns, false);
            RunRequest::completion(session.clone(), generation)
        }
    };
    let run = request.run.clone();
    info!(session_id = %session, run_id = %run, %node, mode = ?body.mode, "run accepted");

    let pipeline = Arc::clone(&state.pipeline);
    let _ = state.runs.spawn(async move {
        if let Err(e) = pipeline.run(request).await {
            debug!(error = %e, "run ended with error");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateAccepted {
            session_id: session,
            run,
            node,
        }),
    ))
}
