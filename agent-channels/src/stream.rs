//! Server-sent event framing and the per-request stream state machine.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tracing::{debug, warn};

use crate::json;
use crate::router::{Delivery, Sink, Teardown};

/// Inactivity deadline applied when none is configured.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Error text sent when the inactivity deadline elapses.
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

/// One event written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Intermediate output.
    Progress(String),
    /// The final reply.
    Message(String),
    /// End of the exchange.
    Done,
    /// The stream failed.
    Error(String),
}

#[derive(Serialize)]
struct ContentData<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ErrorData<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct EmptyData {}

impl SseEvent {
    /// Event name written on the `event:` line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Message(_) => "message",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }

    /// JSON written on the `data:` line.
    #[must_use]
    pub fn data(&self) -> String {
        let encoded = match self {
            Self::Progress(content) | Self::Message(content) => {
                json::to_string(&ContentData { content })
            }
            Self::Done => json::to_string(&EmptyData {}),
            Self::Error(error) => json::to_string(&ErrorData { error }),
        };
        encoded.unwrap_or_else(|err| {
            warn!(event = self.name(), error = %err, "failed to encode event data");
            String::from("{}")
        })
    }

    /// Complete wire frame: `event: <name>\ndata: <json>\n\n`.
    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.name(), self.data()))
    }
}

/// Whether a stream may still write events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Waiting for deliveries.
    Open,
    /// Terminal; nothing more is written.
    Closed,
}

/// Inputs that drive a [`StreamMachine`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamInput {
    /// An item read from the sink.
    Delivery(Delivery),
    /// The sink closed without a shutdown notice, because a newer request
    /// took over the session.
    Retired,
    /// No delivery arrived within the inactivity deadline.
    IdleTimeout,
}

/// Pure state machine mapping sink reads to outgoing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMachine {
    state: StreamState,
}

impl StreamMachine {
    /// Creates a machine in [`StreamState::Open`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: StreamState::Open,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Returns `true` while events may still be written.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, StreamState::Open)
    }

    /// Applies one input and returns the events to write, in order.
    pub fn advance(&mut self, input: StreamInput) -> Vec<SseEvent> {
        if !self.is_open() {
            return Vec::new();
        }

        match input {
            StreamInput::Delivery(Delivery::Message(message)) if message.is_progress() => {
                vec![SseEvent::Progress(message.content().to_owned())]
            }
            StreamInput::Delivery(Delivery::Message(message)) => {
                self.state = StreamState::Closed;
                vec![
                    SseEvent::Message(message.content().to_owned()),
                    SseEvent::Done,
                ]
            }
            StreamInput::Delivery(Delivery::Shutdown) | StreamInput::Retired => {
                self.state = StreamState::Closed;
                Vec::new()
            }
            StreamInput::IdleTimeout => {
                self.state = StreamState::Closed;
                vec![SseEvent::Error(TIMEOUT_MESSAGE.to_owned())]
            }
        }
    }
}

impl Default for StreamMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a sink into a body stream of SSE frames.
///
/// The stream ends after `done`, after a timeout `error`, on shutdown, or when
/// the sink is retired. `teardown` is released when the stream finishes or is
/// dropped by a disconnecting client, whichever happens first.
pub fn event_stream(
    mut sink: Sink,
    mut teardown: Teardown,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut machine = StreamMachine::new();
        while machine.is_open() {
            let input = match tokio::time::timeout(idle_timeout, sink.recv()).await {
                Ok(Some(delivery)) => StreamInput::Delivery(delivery),
                Ok(None) => StreamInput::Retired,
                Err(_) => StreamInput::IdleTimeout,
            };
            if matches!(input, StreamInput::IdleTimeout) {
                debug!(session_id = %sink.session_id(), "stream idle, closing");
            }
            for event in machine.advance(input) {
                yield Ok::<Bytes, Infallible>(event.to_frame());
            }
        }
        teardown.complete();
        drop(teardown);
    }
}
