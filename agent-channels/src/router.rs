//! Session-to-sink routing for in-flight requests.
//!
//! Each open request owns exactly one [`Sink`], keyed by its session id. The
//! agent's replies are pushed through [`SessionRouter::deliver`] and read by
//! whoever holds the sink. Registering a session that already has a sink
//! retires the previous one: its sender is dropped, so the old reader sees the
//! queue close and nothing further is delivered to it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agent_primitives::{OutboundMessage, RequestId, SessionId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, warn};

/// Item read from a [`Sink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A message produced by the agent.
    Message(OutboundMessage),
    /// The channel is shutting down; the reader should stop.
    Shutdown,
}

/// Receives notifications about deliveries that did not reach a reader.
pub trait DeliveryObserver: Send + Sync {
    /// Called when a message was dropped because no live sink matched.
    fn on_undeliverable(&self, session_id: &str, message: &OutboundMessage);

    /// Called when a new registration retired an existing sink.
    fn on_replaced(&self, _session_id: &SessionId, _retired: RequestId) {}
}

/// Observer that emits delivery notifications to the tracing system.
#[derive(Debug, Default)]
pub struct TracingDeliveryObserver;

impl DeliveryObserver for TracingDeliveryObserver {
    fn on_undeliverable(&self, session_id: &str, message: &OutboundMessage) {
        warn!(
            session_id,
            progress = message.is_progress(),
            "no active stream for session, dropping message"
        );
    }

    fn on_replaced(&self, session_id: &SessionId, retired: RequestId) {
        debug!(%session_id, %retired, "session re-registered, retiring previous stream");
    }
}

/// Per-request delivery queue handed out by [`SessionRouter::register`].
#[derive(Debug)]
pub struct Sink {
    session_id: SessionId,
    request_id: RequestId,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Sink {
    /// Session this sink is registered under.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Request that owns this sink.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Waits for the next delivery.
    ///
    /// Returns `None` once the sink has been retired by a newer registration
    /// or removed from the router.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

struct Entry {
    request_id: RequestId,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Concurrent map from session id to the live sink for that session.
pub struct SessionRouter {
    sinks: Mutex<HashMap<SessionId, Entry>>,
    observer: Arc<dyn DeliveryObserver>,
}

impl SessionRouter {
    /// Creates an empty router reporting to [`TracingDeliveryObserver`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingDeliveryObserver))
    }

    /// Creates an empty router reporting to `observer`.
    #[must_use]
    pub fn with_observer(observer: Arc<dyn DeliveryObserver>) -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
            observer,
        }
    }

    fn sinks(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a fresh sink for `session_id`, retiring any existing one.
    pub fn register(&self, session_id: SessionId) -> Sink {
        let (tx, rx) = mpsc::unbounded_channel();
        let request_id = RequestId::random();
        let retired = self
            .sinks()
            .insert(session_id.clone(), Entry { request_id, tx });

        if let Some(retired) = retired {
            self.observer.on_replaced(&session_id, retired.request_id);
        }
        debug!(%session_id, %request_id, "session registered");

        Sink {
            session_id,
            request_id,
            rx,
        }
    }

    /// Pushes `message` into the sink registered for `session_id`.
    ///
    /// Returns `false`, after notifying the observer, when no live sink exists.
    pub fn deliver(&self, session_id: &str, message: OutboundMessage) -> bool {
        let rejected = match self.sinks().get(session_id) {
            Some(entry) => match entry.tx.send(Delivery::Message(message)) {
                Ok(()) => return true,
                Err(SendError(rejected)) => rejected,
            },
            None => Delivery::Message(message),
        };

        if let Delivery::Message(message) = &rejected {
            self.observer.on_undeliverable(session_id, message);
        }
        false
    }

    /// Removes whatever sink is registered for `session_id`.
    pub fn unregister(&self, session_id: &str) -> bool {
        self.sinks().remove(session_id).is_some()
    }

    /// Removes the sink for `session_id` only if `request_id` still owns it.
    ///
    /// A request whose sink was retired by a newer registration must not
    /// remove its successor.
    pub fn release(&self, session_id: &str, request_id: RequestId) -> bool {
        let mut sinks = self.sinks();
        let owned = sinks
            .get(session_id)
            .is_some_and(|entry| entry.request_id == request_id);
        if owned {
            sinks.remove(session_id);
            debug!(session_id, %request_id, "session released");
        }
        owned
    }

    /// Wakes every reader with [`Delivery::Shutdown`] and clears the table.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.sinks().drain().collect();
        for (session_id, entry) in drained {
            if entry.tx.send(Delivery::Shutdown).is_err() {
                debug!(%session_id, "reader already gone at shutdown");
            }
        }
    }

    /// Returns `true` when a sink is registered for `session_id`.
    #[must_use]
    pub fn is_registered(&self, session_id: &str) -> bool {
        self.sinks().contains_key(session_id)
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks().len()
    }

    /// Returns `true` when no sink is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks().is_empty()
    }

    /// Returns a guard that releases `sink`'s registration when dropped.
    #[must_use]
    pub fn teardown(self: &Arc<Self>, sink: &Sink) -> Teardown {
        Teardown {
            router: Arc::clone(self),
            session_id: sink.session_id.clone(),
            request_id: sink.request_id,
            completed: false,
        }
    }
}

impl Default for SessionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRouter")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

/// Releases one request's registration exactly once, when dropped.
///
/// Dropping the guard before [`Teardown::complete`] is treated as the client
/// abandoning the stream.
#[derive(Debug)]
pub struct Teardown {
    router: Arc<SessionRouter>,
    session_id: SessionId,
    request_id: RequestId,
    completed: bool,
}

impl Teardown {
    /// Marks the stream as finished by the server rather than abandoned.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.completed {
            debug!(session_id = %self.session_id, "client disconnected before stream ended");
        }
        self.router.release(self.session_id.as_str(), self.request_id);
    }
}
