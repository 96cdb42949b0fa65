use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sensing::ObserverState;

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "rivet-runtime::observer"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Task progress and observer notifications routed over the bus.
///
/// These are read-only notifications; nothing on the bus feeds back into the
/// sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    StepStarted { index: usize, label: String },
    StepCompleted { index: usize, label: String },
    StepSkipped { index: usize, label: String },
    StepFailed { index: usize, label: String, error: String },
    ObserverStateChanged {
        observer: String,
        from: ObserverState,
        to: ObserverState,
    },
    ObserverFired {
        observer: String,
        magnitude: f64,
        fire_count: u64,
    },
    MissedSamples { observer: String, count: u64 },
    HandlerFailed { observer: String, error: String },
    RecordingStarted { session: Uuid, name: String },
    RecordingStopped { session: Uuid, location: String },
    SequenceAborted { task: String, error: String },
    SequenceFinished { task: String, completed: usize, skipped: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "rivet-runtime::observer",
            EventPayload::ObserverStateChanged {
                observer: "push".into(),
                from: ObserverState::Armed,
                to: ObserverState::Triggered,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }
}
