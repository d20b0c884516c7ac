//! Bounded event sink and its receiving stream.
//!
//! The sink owns sequence assignment: `seq` and the channel send happen under
//! one async lock, so envelopes arrive in assignment order. The channel is
//! bounded; when the adapter cannot drain fast enough, `emit` suspends, which
//! backpressures the producing pipeline.

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::envelope::EventEnvelope;
use crate::event::AgentEvent;

/// Default channel capacity for one request's event stream.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Receiving half: a `Stream` of enveloped events, closed when the sink side
/// finishes (all senders dropped).
pub type EventStream = ReceiverStream<EventEnvelope>;

/// Sending half, cloneable across the stages of one request.
#[derive(Clone)]
pub struct EventSink {
    request_id: String,
    inner: std::sync::Arc<Mutex<SinkState>>,
}

struct SinkState {
    next_seq: u64,
    tx: mpsc::Sender<EventEnvelope>,
}

/// Creates the bounded sink/stream pair for one request.
pub fn event_channel(request_id: impl Into<String>, capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = EventSink {
        request_id: request_id.into(),
        inner: std::sync::Arc::new(Mutex::new(SinkState { next_seq: 1, tx })),
    };
    (sink, ReceiverStream::new(rx))
}

impl EventSink {
    /// The request id stamped on every envelope from this sink.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Assigns the next sequence number and sends the enveloped event.
    ///
    /// Suspends while the channel is full. Returns `false` when the receiver
    /// is gone (caller cancelled / adapter closed); producers treat that as a
    /// cancellation signal and stop at the next suspension point.
    pub async fn emit(&self, event: AgentEvent) -> bool {
        let mut state = self.inner.lock().await;
        let seq = state.next_seq;
        let envelope = EventEnvelope::new(seq, self.request_id.clone(), event);
        match state.tx.send(envelope).await {
            Ok(()) => {
                state.next_seq = seq + 1;
                true
            }
            Err(_) => false,
        }
    }

    /// True once the receiving side has gone away.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn emits_strictly_increasing_seq() {
        let (sink, mut stream) = event_channel("req-1", 8);
        for i in 0..3 {
            assert!(sink.emit(AgentEvent::content_delta(format!("t{i}"))).await);
        }
        drop(sink);
        let mut last = 0;
        while let Some(env) = stream.next().await {
            assert!(env.seq > last, "seq {} not after {}", env.seq, last);
            assert_eq!(env.request_id, "req-1");
            last = env.seq;
        }
        assert_eq!(last, 3);
    }

    #[tokio::test]
    async fn emit_returns_false_after_receiver_dropped() {
        let (sink, stream) = event_channel("req-2", 2);
        drop(stream);
        assert!(!sink.emit(AgentEvent::content_delta("x")).await);
        assert!(sink.is_closed().await);
    }

    #[tokio::test]
    async fn bounded_channel_backpressures_until_drained() {
        let (sink, mut stream) = event_channel("req-3", 1);
        assert!(sink.emit(AgentEvent::content_delta("a")).await);

        // Second emit must wait for the consumer; drain concurrently.
        let producer = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.emit(AgentEvent::content_delta("b")).await })
        };
        let first = stream.next().await.unwrap();
        assert_eq!(first.seq, 1);
        assert!(producer.await.unwrap());
        let second = stream.next().await.unwrap();
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn clones_share_one_sequence() {
        let (sink, mut stream) = event_channel("req-4", 8);
        let other = sink.clone();
        sink.emit(AgentEvent::content_delta("a")).await;
        other.emit(AgentEvent::content_delta("b")).await;
        drop(sink);
        drop(other);
        let seqs: Vec<u64> = {
            let mut out = Vec::new();
            while let Some(env) = stream.next().await {
                out.push(env.seq);
            }
            out
        };
        assert_eq!(seqs, vec![1, 2]);
    }
}
