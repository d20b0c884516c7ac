//! Envelope (`seq`, `request_id`) applied to each event.
//!
//! `seq` is monotonically increasing within one request's stream; the sink
//! assigns it under its write lock so ordering in the channel matches
//! assignment order.

use serde::{Deserialize, Serialize};

use crate::event::AgentEvent;

/// One enveloped event as it travels to the adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Per-request sequence number; strictly increasing within a stream.
    pub seq: u64,
    /// Request id; constant within a stream.
    pub request_id: String,
    #[serde(flatten)]
    pub event: AgentEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, request_id: impl Into<String>, event: AgentEvent) -> Self {
        Self {
            seq,
            request_id: request_id.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_is_a_self_describing_record() {
        let env = EventEnvelope::new(3, "req-1", AgentEvent::content_delta("x"));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["seq"], 3);
        assert_eq!(v["request_id"], "req-1");
        assert_eq!(v["kind"], "content");
        assert_eq!(v["payload"]["delta"], "x");
    }

    #[test]
    fn envelope_round_trips() {
        let env = EventEnvelope::new(
            1,
            "req-2",
            AgentEvent::Thinking {
                text: "planning".into(),
            },
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 1);
        assert_eq!(back.request_id, "req-2");
        assert_eq!(back.event.kind_name(), "thinking");
    }
}
