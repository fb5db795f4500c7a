//! Session-scoped pub/sub channels.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use parley_core::events::{ChannelKind, StreamEvent};
use parley_core::ids::SessionId;
use parley_engine::sink::EventSink;

const DEFAULT_CAPACITY: usize = 1024;

/// Named broadcast channels carrying `{event, data}` envelopes.
///
/// Publishing never blocks. Slow receivers lag rather than holding up the run.
pub struct ChannelHub {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, name: String) -> broadcast::Sender<String> {
        self.channels
            .entry(name)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to one session channel. Only events published afterwards are received.
    pub fn subscribe(&self, session: &SessionId, kind: ChannelKind) -> broadcast::Receiver<String> {
        self.sender(kind.channel_name(session)).subscribe()
    }

    /// Publish `event` on the channel it belongs to. Returns the number of receivers.
    pub fn publish(&self, session: &SessionId, event: &StreamEvent) -> usize {
        let envelope = match event.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "event not serializable, dropped");
                return 0;
            }
        };
        let name = event.channel().channel_name(session);
        let delivered = self.sender(name).send(envelope).unwrap_or(0);
        trace!(session_id = %session, event_type = event.event_type(), delivered, "published");
        delivered
    }

    /// Drop the session's channels. Existing receivers see them close.
    pub fn close_session(&self, session: &SessionId) {
        for kind in ChannelKind::ALL {
            let _ = self.channels.remove(&kind.channel_name(session));
        }
    }

    /// Drop the session's channels that nobody listens to any more.
    pub fn release_idle(&self, session: &SessionId) {
        for kind in ChannelKind::ALL {
            let _ = self
                .channels
                .remove_if(&kind.channel_name(session), |_, tx| tx.receiver_count() == 0);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards a run's events to one session's channels.
#[derive(Clone)]
pub struct SessionSink {
    hub: Arc<ChannelHub>,
    session: SessionId,
}

impl SessionSink {
    pub fn new(hub: Arc<ChannelHub>, session: SessionId) -> Self {
        Self { hub, session }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn publish(&self, event: &StreamEvent) -> usize {
        self.hub.publish(&self.session, event)
    }
}

#[async_trait]
impl EventSink for SessionSink {
    async fn emit(&self, event: StreamEvent) {
        let _ = self.publish(&event);
    }
}
