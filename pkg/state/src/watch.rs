use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

/// In-memory log of store mutations with monotonic sequence numbers.
///
/// Subscribers get every new event over a broadcast channel. A subscriber
/// that falls behind can replay from the retained window with
/// [`EventLog::events_since`], or relist if the window has moved past it.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log retaining at most `max_events` recent events.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events: max_events.max(1),
            })),
            sender,
        }
    }

    /// Record a new event. Called by StateStore with its write lock held.
    pub async fn emit(&self, event_type: EventType, key: String, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Every event after `from_seq`, or `None` if some of them were already
    /// evicted and the caller has to start over from a full list.
    pub async fn events_since(&self, from_seq: u64) -> Option<Vec<WatchEvent>> {
        let inner = self.inner.read().await;
        let oldest = inner.events.front().map(|e| e.seq).unwrap_or(inner.seq + 1);
        if from_seq + 1 < oldest && from_seq < inner.seq {
            return None;
        }
        Some(
            inner
                .events
                .iter()
                .filter(|e| e.seq > from_seq)
                .cloned()
                .collect(),
        )
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}
