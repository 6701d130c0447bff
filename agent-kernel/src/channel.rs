//! Contract shared by every chat channel.

use std::io;

use agent_primitives::OutboundMessage;
use async_trait::async_trait;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// A transport that accepts user messages and delivers agent replies.
///
/// Implementations publish inbound traffic onto the [`MessageBus`](crate::MessageBus)
/// and receive outbound traffic through [`Channel::send`] and
/// [`Channel::edit`], called by the [`ChannelManager`](crate::ChannelManager).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Name matched against [`OutboundMessage::channel`].
    fn name(&self) -> &str;

    /// Starts serving and runs until [`Channel::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel is already running or its listener
    /// cannot be established.
    async fn start(&self) -> ChannelResult<()>;

    /// Stops serving and releases pending requests. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when shutdown cannot be signalled.
    async fn stop(&self) -> ChannelResult<()>;

    /// Delivers a message, returning a transport message id when the transport
    /// supports editing what it sent.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the message.
    async fn send(&self, message: &OutboundMessage) -> ChannelResult<Option<String>>;

    /// Replaces the content of a message previously returned by [`Channel::send`].
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects the edit.
    async fn edit(&self, chat_id: &str, message_id: &str, content: &str) -> ChannelResult<()>;

    /// Returns `true` while the channel is serving.
    fn is_running(&self) -> bool;

    /// Sender ids allowed to talk to the agent. Empty allows everyone.
    fn allow_from(&self) -> &[String] {
        &[]
    }

    /// Returns `true` when `sender_id` passes the allow list.
    fn is_allowed(&self, sender_id: &str) -> bool {
        sender_allowed(self.allow_from(), sender_id)
    }
}

/// Returns `true` when `allow_from` is empty or lists `sender_id`.
#[must_use]
pub fn sender_allowed(allow_from: &[String], sender_id: &str) -> bool {
    allow_from.is_empty() || allow_from.iter().any(|id| id == sender_id)
}

/// Errors surfaced by channel implementations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Lifecycle transition rejected.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The server loop terminated with an error.
    #[error("channel server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Result alias for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
