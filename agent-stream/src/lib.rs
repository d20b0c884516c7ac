//! Agent event protocol: typed events + per-request envelope + bounded sink.
//!
//! This crate defines the wire shape of one agent event (`kind` + payload), the
//! envelope that carries `seq` and `request_id`, and the bounded sink/stream pair
//! used to ferry events from the pipeline to an adapter. It does not depend on
//! the core crate; the core emits through [`EventSink`] and adapters drain
//! [`EventStream`].

pub mod envelope;
pub mod event;
pub mod sink;

pub use envelope::EventEnvelope;
pub use event::{AgentEvent, PlanStepView};
pub use sink::{event_channel, EventSink, EventStream};
