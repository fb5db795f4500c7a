use async_trait::async_trait;
use parking_lot::Mutex;

use parley_core::events::StreamEvent;

/// Receiver of the events a generation run produces.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: StreamEvent);
}

/// Discards every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: StreamEvent) {}
}

/// Keeps every event in order. Used by tests and one-shot runs.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(StreamEvent::event_type).collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Concatenated `tokens_arrived` text.
    pub fn tokens(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TokensArrived(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}
