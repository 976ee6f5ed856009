//! Event Hub (§4.12): a per-agent monotonic sequence number plus a bounded
//! ring buffer of recent events, fanned out to SSE subscribers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use nexus3_agent::{EventSink, TurnEvent};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_RING_SIZE: usize = 1024;
const BROADCAST_CAPACITY: usize = 1024;

#[derive(Clone, Debug, Serialize)]
pub struct SequencedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: TurnEvent,
}

struct Inner {
    next_seq: u64,
    ring: VecDeque<SequencedEvent>,
    capacity: usize,
}

/// Implements [`EventSink`] for a single agent; publishes assign the next
/// sequence number, store in the ring, and broadcast to live subscribers.
pub struct EventHub {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<SequencedEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Mutex::new(Inner { next_seq: 0, ring: VecDeque::with_capacity(capacity), capacity }),
            sender,
        }
    }

    /// Events still buffered with `seq >= since`.
    pub fn buffered_since(&self, since: u64) -> Vec<SequencedEvent> {
        let inner = self.inner.lock().unwrap();
        inner.ring.iter().filter(|e| e.seq >= since).cloned().collect()
    }

    /// A live feed of events published after this call. Combine with
    /// [`EventHub::buffered_since`] to build replay-then-live semantics; the
    /// caller is responsible for dropping events already delivered from the
    /// buffered snapshot (by `seq`).
    pub fn subscribe_live(&self) -> broadcast::Receiver<SequencedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventHub {
    fn publish(&self, event: TurnEvent) {
        let sequenced = {
            let mut inner = self.inner.lock().unwrap();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let sequenced = SequencedEvent { seq, event };
            if inner.ring.len() == inner.capacity {
                inner.ring.pop_front();
            }
            inner.ring.push_back(sequenced.clone());
            sequenced
        };
        // A lagging or absent receiver is not an error: publishing never
        // blocks on a slow subscriber, and dead subscribers are dropped by
        // the broadcast channel itself.
        let _ = self.sender.send(sequenced);
    }
}

/// Keeps a concrete handle to each agent's [`EventHub`] so the SSE route can
/// subscribe to it; the pool only sees the type-erased `Arc<dyn EventSink>`.
#[derive(Default)]
pub struct EventHubRegistry {
    hubs: DashMap<String, Arc<EventHub>>,
}

impl EventHubRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<EventHub>> {
        self.hubs.get(agent_id).map(|e| e.clone())
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn Fn(&str) -> Arc<dyn EventSink> + Send + Sync> {
        let registry = self.clone();
        Arc::new(move |id: &str| {
            let hub = Arc::new(EventHub::new());
            registry.hubs.insert(id.to_string(), hub.clone());
            hub as Arc<dyn EventSink>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(request_id: &str) -> TurnEvent {
        TurnEvent::TurnStarted { request_id: request_id.to_string() }
    }

    #[test]
    fn publish_assigns_strictly_increasing_seq() {
        let hub = EventHub::new();
        hub.publish(sample_event("r1"));
        hub.publish(sample_event("r1"));
        let buffered = hub.buffered_since(0);
        assert_eq!(buffered.len(), 2);
        assert_eq!(buffered[0].seq, 0);
        assert_eq!(buffered[1].seq, 1);
    }

    #[test]
    fn buffered_since_filters_by_seq() {
        let hub = EventHub::new();
        for _ in 0..5 {
            hub.publish(sample_event("r1"));
        }
        let buffered = hub.buffered_since(3);
        assert_eq!(buffered.len(), 2);
        assert_eq!(buffered[0].seq, 3);
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let hub = EventHub::with_capacity(2);
        for _ in 0..3 {
            hub.publish(sample_event("r1"));
        }
        let buffered = hub.buffered_since(0);
        assert_eq!(buffered.len(), 2);
        assert_eq!(buffered[0].seq, 1);
        assert_eq!(buffered[1].seq, 2);
    }

    #[tokio::test]
    async fn live_subscriber_receives_published_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe_live();
        hub.publish(sample_event("r1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 0);
    }
}
