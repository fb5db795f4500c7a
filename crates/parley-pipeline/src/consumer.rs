//! Speech consumer: one task per run turning queued sentences into samples.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use parley_core::events::{SpeechSampleNotice, StreamEvent};
use parley_core::ids::SampleId;
use parley_core::speech::SpeechSynthesizer;
use parley_telemetry::MetricsRecorder;

use crate::hub::SessionSink;
use crate::samples::SampleStore;

/// Queue item that ends the consumer loop.
const SENTINEL: &str = "";

/// One synthesized (or failed) sentence.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechSegment {
    pub sentence: String,
    pub sample_id: Option<SampleId>,
    pub url: Option<String>,
    pub latency_ms: u64,
    pub success: bool,
}

impl SpeechSegment {
    fn notice(&self) -> SpeechSampleNotice {
        SpeechSampleNotice {
            id: self.sample_id.clone(),
            url: self.url.clone(),
            text: self.sentence.clone(),
            latency_ms: self.latency_ms,
        }
    }
}

struct SpeechConsumer {
    rx: mpsc::Receiver<String>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    samples: Arc<SampleStore>,
    sink: SessionSink,
    voice_id: Option<String>,
    metrics: Arc<MetricsRecorder>,
}

impl SpeechConsumer {
    /// Returns the successful segments in sentence order.
    async fn run(mut self) -> Vec<SpeechSegment> {
        let mut produced = Vec::new();
        let Some(voice_id) = self.voice_id.take() else {
            debug!("no voice selected, speech disabled for this run");
            return produced;
        };

        while let Some(sentence) = self.rx.recv().await {
            if sentence == SENTINEL {
                break;
            }
            let segment = self.synthesize(sentence, &voice_id).await;
            let _ = self.sink.publish(&StreamEvent::SpeechSampleArrived(segment.notice()));
            if segment.success {
                produced.push(segment);
            }
        }
        debug!(samples = produced.len(), "speech consumer finished");
        produced
    }

    async fn synthesize(&self, sentence: String, voice_id: &str) -> SpeechSegment {
        let started = Instant::now();
        let result = self.synthesizer.synthesize(&sentence, voice_id).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(audio) => {
                self.metrics
                    .histogram_observe("synthesis_latency_ms", &[], latency_ms as f64);
                let id = self.samples.insert(audio);
                SpeechSegment {
                    url: Some(self.samples.url_for(&id)),
                    sample_id: Some(id),
                    sentence,
                    latency_ms,
                    success: true,
                }
            }
            Err(e) => {
                warn!(backend = self.synthesizer.name(), error = %e, "speech synthesis failed");
                self.metrics.counter_inc("speech_failures", &[], 1);
                SpeechSegment {
                    sentence,
                    sample_id: None,
                    url: None,
                    latency_ms,
                    success: false,
                }
            }
        }
    }
}

/// Producer-side handle on the consumer task.
///
/// [`shutdown`](Self::shutdown) enqueues the sentinel and joins the task. It
/// may be called any number of times; only the first call does anything.
pub struct ConsumerHandle {
    tx: Option<mpsc::Sender<String>>,
    join: Option<JoinHandle<Vec<SpeechSegment>>>,
}

impl ConsumerHandle {
    pub(crate) fn spawn(
        capacity: usize,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        samples: Arc<SampleStore>,
        sink: SessionSink,
        voice_id: Option<String>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let span = info_span!("speech_consumer", session_id = %sink.session());
        let consumer = SpeechConsumer {
            rx,
            synthesizer,
            samples,
            sink,
            voice_id,
            metrics,
        };
        Self {
            tx: Some(tx),
            join: Some(tokio::spawn(consumer.run().instrument(span))),
        }
    }

    /// Sender the producer enqueues sentences on.
    pub(crate) fn queue(&self) -> Option<mpsc::Sender<String>> {
        self.tx.clone()
    }

    pub async fn shutdown(&mut self) -> Vec<SpeechSegment> {
        if let Some(tx) = self.tx.take() {
            // A consumer that already stopped has dropped its receiver.
            let _ = tx.send(SENTINEL.to_string()).await;
        }
        match self.join.take() {
            Some(join) => join.await.unwrap_or_else(|e| {
                warn!(error = %e, "speech consumer aborted");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}
