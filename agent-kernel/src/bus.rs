//! In-process message bus decoupling channels from the agent loop.
//!
//! Channels publish [`InboundMessage`]s and the agent consumes them; the agent
//! publishes [`OutboundMessage`]s and the channel manager dispatches them back
//! to the originating channel. Both queues are unbounded FIFOs.

use std::sync::{Mutex, PoisonError};

use agent_primitives::{InboundMessage, OutboundMessage};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

/// Errors returned by bus publishers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been closed and no longer accepts messages.
    #[error("message bus is closed")]
    Closed,
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Two-queue bus shared between channels and the agent.
#[derive(Debug)]
pub struct MessageBus {
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<InboundMessage>>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<OutboundMessage>>>,
    outbound_rx: AsyncMutex<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl MessageBus {
    /// Creates an open bus with empty queues.
    #[must_use]
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: AsyncMutex::new(inbound_rx),
            outbound_tx: Mutex::new(Some(outbound_tx)),
            outbound_rx: AsyncMutex::new(outbound_rx),
        }
    }

    /// Queues a message for the agent.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`MessageBus::close`].
    pub fn publish_inbound(&self, message: InboundMessage) -> BusResult<()> {
        send(&self.inbound_tx, message)
    }

    /// Waits for the next message addressed to the agent.
    ///
    /// Returns `None` once the bus is closed and the queue is drained.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Queues a message for delivery through a channel.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`MessageBus::close`].
    pub fn publish_outbound(&self, message: OutboundMessage) -> BusResult<()> {
        send(&self.outbound_tx, message)
    }

    /// Waits for the next message to dispatch to a channel.
    ///
    /// Returns `None` once the bus is closed and the queue is drained.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Stops accepting new messages. Already queued messages stay consumable.
    pub fn close(&self) {
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Returns `true` once [`MessageBus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

fn send<T>(slot: &Mutex<Option<mpsc::UnboundedSender<T>>>, message: T) -> BusResult<()> {
    let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    let sender = guard.as_ref().ok_or(BusError::Closed)?;
    sender.send(message).map_err(|_| BusError::Closed)
}
