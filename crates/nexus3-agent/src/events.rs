//! Turn event stream (§4.9, §4.12): the ordered sequence of events a turn
//! emits as it progresses. The gateway's Event Hub is the production
//! [`EventSink`]; it assigns sequence numbers and fans out to SSE subscribers.
//! Nothing in this crate depends on the gateway, so the dependency only runs
//! one way.

use nexus3_core::ToolStatus;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnStarted {
        request_id: String,
    },
    ContentChunk {
        request_id: String,
        delta: String,
    },
    ReasoningStarted {
        request_id: String,
    },
    ReasoningEnded {
        request_id: String,
    },
    ToolDetected {
        request_id: String,
        id: String,
        name: String,
    },
    BatchStarted {
        request_id: String,
        tools: Vec<String>,
    },
    ToolStarted {
        request_id: String,
        id: String,
        name: String,
    },
    ToolCompleted {
        request_id: String,
        id: String,
        name: String,
        status: ToolStatus,
    },
    BatchHalted {
        request_id: String,
        at: String,
    },
    BatchCompleted {
        request_id: String,
    },
    TurnCompleted {
        request_id: String,
        content: String,
    },
    TurnCancelled {
        request_id: String,
    },
}

/// Where a turn's events are published. Implementations must not block the
/// publisher on a slow subscriber (§4.12).
pub trait EventSink: Send + Sync {
    fn publish(&self, event: TurnEvent);
}

/// Discards every event. Used where no subscriber is attached (e.g. the
/// child turn of a spawned sub-agent, or unit tests that don't assert on events).
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: TurnEvent) {}
}

/// Collects events in order, for tests that assert on the emitted sequence.
#[derive(Default)]
pub struct RecordingSink(std::sync::Mutex<Vec<TurnEvent>>);

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TurnEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: TurnEvent) {
        self.0.lock().unwrap().push(event);
    }
}
