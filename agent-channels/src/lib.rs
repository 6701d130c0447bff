//! HTTP streaming channel for the agent runtime.
//!
//! Each `POST /chat` registers a per-session sink in the [`SessionRouter`],
//! publishes the user message onto the bus, and streams the agent's progress
//! and final reply back as server-sent events.

#![warn(missing_docs, clippy::pedantic)]

mod http;
mod json;
mod router;
mod stream;

pub use http::{CHANNEL_NAME, DEFAULT_PORT, HttpChannel, HttpChannelConfig, SENDER_ID};
pub use router::{
    Delivery, DeliveryObserver, SessionRouter, Sink, Teardown, TracingDeliveryObserver,
};
pub use stream::{
    DEFAULT_STREAM_TIMEOUT, SseEvent, StreamInput, StreamMachine, StreamState, TIMEOUT_MESSAGE,
    event_stream,
};
