use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a committed registry write.
///
/// `previous` is the object as it was before the write (absent on create),
/// `value` the object after it (absent on delete). Relevance filters compare
/// the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub kind: String,
    pub key: String,
    #[serde(default)]
    pub previous: Option<Vec<u8>>,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

impl WatchEvent {
    /// Decode the previous and new object of a given kind.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> (Option<T>, Option<T>) {
        let decode = |bytes: &Option<Vec<u8>>| {
            bytes
                .as_deref()
                .and_then(|b| serde_json::from_slice::<T>(b).ok())
        };
        (decode(&self.previous), decode(&self.value))
    }
}

/// In-memory event log that tracks all registry writes with monotonic sequence numbers.
/// Subscribers receive every event; filtering by kind is left to them.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    /// Ring buffer of recent events (capped)
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log keeping `max_events` recent events and
    /// buffering up to `channel_capacity` events per subscriber.
    pub fn new(max_events: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            })),
            sender,
        }
    }

    /// Record a new event. Called by the registry after each committed write.
    pub async fn emit(
        &self,
        event_type: EventType,
        kind: &str,
        key: String,
        previous: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            kind: kind.to_string(),
            key,
            previous,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // Broadcast to subscribers (ignore errors if no receivers)
        let _ = self.sender.send(event);
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Get all buffered events since the given sequence number.
    pub async fn events_since(&self, from_seq: u64) -> Vec<WatchEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq)
            .cloned()
            .collect()
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}
