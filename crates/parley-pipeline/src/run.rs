//! One generation run: producer, speech consumer and the shutdown sequence.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, trace};

use parley_core::events::StreamEvent;
use parley_core::generation::GenerationSpec;
use parley_core::ids::{RunId, SessionId};
use parley_core::speech::SpeechSynthesizer;
use parley_core::turns::ConversationTurn;
use parley_engine::agent::{payload_text, AgentRoundState, AgentSpec, Orchestrator};
use parley_engine::completion::ToolAugmentedCompletion;
use parley_engine::registry::panic_message;
use parley_engine::sink::EventSink;
use parley_speech::wav;
use parley_store::{Reply, ReplyStore};
use parley_telemetry::MetricsRecorder;

use crate::consumer::{ConsumerHandle, SpeechSegment};
use crate::error::PipelineError;
use crate::hub::{ChannelHub, SessionSink};
use crate::samples::SampleStore;
use crate::sentences::SentenceBuffer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sentences buffered between producer and speech consumer.
    pub queue_capacity: usize,
    /// URL prefix written into sample notices. The server mounts samples
    /// under `/samples`; change this only behind a proxy that remaps it.
    pub sample_route: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            sample_route: "/samples".into(),
        }
    }
}

/// What drives the producer.
#[derive(Clone)]
pub enum RunMode {
    /// Single pass over `GenerationSpec::prompt` with mid-stream tool calls.
    Completion,
    /// Multi-round agent over `history`. The reply is the `done` payload.
    Agent {
        agent: Arc<AgentSpec>,
        history: Vec<ConversationTurn>,
    },
}

pub struct RunRequest {
    pub session: SessionId,
    pub run: RunId,
    pub generation: GenerationSpec,
    pub mode: RunMode,
}

impl RunRequest {
    pub fn completion(session: SessionId, generation: GenerationSpec) -> Self {
        Self {
            session,
            run: RunId::new(),
            generation,
            mode: RunMode::Completion,
        }
    }

    pub fn agent(
        session: SessionId,
        generation: GenerationSpec,
        agent: Arc<AgentSpec>,
        history: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            session,
            run: RunId::new(),
            generation,
            mode: RunMode::Agent { agent, history },
        }
    }
}

/// Producer-side sink: publishes every event and feeds completed sentences
/// to the speech queue.
struct ProducerSink {
    out: SessionSink,
    queue: Option<mpsc::Sender<String>>,
    sentences: Mutex<SentenceBuffer>,
    speak_tokens: bool,
}

impl ProducerSink {
    async fn enqueue(&self, sentences: Vec<String>) {
        let Some(queue) = &self.queue else {
            return;
        };
        for sentence in sentences {
            if queue.send(sentence).await.is_err() {
                trace!("speech consumer stopped, sentence dropped");
                return;
            }
        }
    }

    /// Queue `text` in full, ending with its unterminated tail.
    async fn speak(&self, text: &str) {
        let sentences = {
            let mut buffer = self.sentences.lock();
            buffer.clear();
            let mut sentences = buffer.push(text);
            sentences.extend(buffer.finish());
            sentences
        };
        self.enqueue(sentences).await;
    }

    async fn flush(&self) {
        let rest = self.sentences.lock().finish();
        self.enqueue(rest.into_iter().collect()).await;
    }
}

#[async_trait]
impl EventSink for ProducerSink {
    async fn emit(&self, event: StreamEvent) {
        let _ = self.out.publish(&event);
        match &event {
            StreamEvent::TokensArrived(text) if self.speak_tokens => {
                let done = self.sentences.lock().push(text);
                self.enqueue(done).await;
            }
            StreamEvent::GenerationPaused(_) => self.sentences.lock().clear(),
            _ => {}
        }
    }
}

/// Runs generations and fans their output out to session channels.
pub struct StreamingPipeline {
    completion: Arc<ToolAugmentedCompletion>,
    orchestrator: Arc<Orchestrator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    replies: Arc<dyn ReplyStore>,
    hub: Arc<ChannelHub>,
    samples: Arc<SampleStore>,
    metrics: Arc<MetricsRecorder>,
    config: PipelineConfig,
}

impl StreamingPipeline {
    pub fn new(
        completion: Arc<ToolAugmentedCompletion>,
        orchestrator: Arc<Orchestrator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        replies: Arc<dyn ReplyStore>,
        hub: Arc<ChannelHub>,
        samples: Arc<SampleStore>,
    ) -> Self {
        Self {
            completion,
            orchestrator,
            synthesizer,
            replies,
            hub,
            samples,
            metrics: Arc::new(MetricsRecorder::new()),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    pub fn samples(&self) -> &Arc<SampleStore> {
        &self.samples
    }

    pub fn synthesizer(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.synthesizer
    }

    /// Run one generation to the end.
    ///
    /// Whatever happens, the session sees exactly one terminal event followed
    /// by `end_of_stream` and then `end_of_speech`.
    #[instrument(skip_all, fields(session_id = %request.session, run_id = %request.run))]
    pub async fn run(&self, request: RunRequest) -> Result<Reply, PipelineError> {
        self.metrics.counter_inc("runs_started", &[], 1);
        let out = SessionSink::new(Arc::clone(&self.hub), request.session.clone());
        let mut consumer = ConsumerHandle::spawn(
            self.config.queue_capacity,
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.samples),
            out.clone(),
            request.generation.voice_id.clone(),
            Arc::clone(&self.metrics),
        );
        let producer = ProducerSink {
            out: out.clone(),
            queue: consumer.queue(),
            sentences: Mutex::new(self.sentence_buffer()),
            speak_tokens: matches!(request.mode, RunMode::Completion),
        };

        let produced = AssertUnwindSafe(self.produce(&request, &producer))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))));

        let outcome = match produced {
            Ok(text) => {
                if producer.speak_tokens {
                    producer.flush().await;
                } else {
                    producer.speak(&text).await;
                }
                let segments = consumer.shutdown().await;
                self.assemble(&request, &text, &segments).await
            }
            Err(e) => Err(e),
        };
        drop(producer);

        let _ = match &outcome {
            Ok((reply, payload)) => {
                info!(reply_id = %reply.id, has_audio = reply.has_audio, "generation complete");
                out.publish(&StreamEvent::GenerationComplete(payload.clone()))
            }
            Err(e) => {
                self.metrics.counter_inc("runs_failed", &[], 1);
                error!(error = %e, "generation failed");
                out.publish(&StreamEvent::GenerationError(e.to_string()))
            }
        };
        let _ = out.publish(&StreamEvent::end_of_stream());
        let _ = consumer.shutdown().await;
        let _ = out.publish(&StreamEvent::end_of_speech());

        outcome.map(|(reply, _)| reply)
    }

    async fn produce(&self, request: &RunRequest, sink: &dyn EventSink) -> Result<String, PipelineError> {
        match &request.mode {
            RunMode::Completion => Ok(self.completion.run(&request.generation, sink).await?),
            RunMode::Agent { agent, history } => {
                let mut state = AgentRoundState::from_turns(history.clone());
                let payload = self.orchestrator.run(agent, &mut state, sink).await?;
                Ok(payload_text(&payload))
            }
        }
    }

    /// Sentence cutter that keeps completion-mode call markup out of speech.
    fn sentence_buffer(&self) -> SentenceBuffer {
        let (open, close) = self.completion.protocol().delimiters();
        SentenceBuffer::with_markup(open, close)
    }

    /// Join the successful samples and record the reply.
    async fn assemble(
        &self,
        request: &RunRequest,
        text: &str,
        segments: &[SpeechSegment],
    ) -> Result<(Reply, Value), PipelineError> {
        let audio: Vec<Bytes> = segments
            .iter()
            .filter_map(|s| s.sample_id.as_ref())
            .filter_map(|id| self.samples.get(id))
            .collect();
        let joined = if audio.is_empty() {
            None
        } else {
            Some(wav::join(&audio)?)
        };
        let reply = self
            .replies
            .create_reply(request.generation.parent_id, text, joined)
            .await?;
        let payload = serde_json::to_value(&reply)?;
        Ok((reply, payload))
    }
}
