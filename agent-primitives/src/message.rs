//! Channel-agnostic messages carried by the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user message received by a channel and handed to the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    channel: String,
    sender_id: String,
    chat_id: String,
    content: String,
    received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl InboundMessage {
    /// Creates an inbound message stamped with the current time.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            received_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Attaches channel-specific metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Name of the channel the message arrived on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Identifier of the sender within the channel.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Conversation identifier within the channel.
    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Time the channel accepted the message.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Channel-specific metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Key identifying the conversation across channels (`channel:chat_id`).
    #[must_use]
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// Distinguishes intermediate output from the message that ends an exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Intermediate, non-terminal output.
    Progress,
    /// Terminal output; delivering it ends the exchange.
    #[default]
    Final,
}

/// A message produced by the agent for delivery through a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    channel: String,
    chat_id: String,
    content: String,
    #[serde(default)]
    kind: MessageKind,
}

impl OutboundMessage {
    /// Creates an outbound message of the given kind.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            kind,
        }
    }

    /// Creates an intermediate progress message.
    #[must_use]
    pub fn progress(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(channel, chat_id, content, MessageKind::Progress)
    }

    /// Creates the final message of an exchange.
    #[must_use]
    pub fn reply(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(channel, chat_id, content, MessageKind::Final)
    }

    /// Creates a reply addressed to the origin of an inbound message.
    #[must_use]
    pub fn reply_to(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        Self::reply(inbound.channel(), inbound.chat_id(), content)
    }

    /// Creates a progress message addressed to the origin of an inbound message.
    #[must_use]
    pub fn progress_to(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        Self::progress(inbound.channel(), inbound.chat_id(), content)
    }

    /// Name of the channel that should deliver the message.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Conversation identifier within the channel.
    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether this is progress or the final message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns `true` for intermediate output.
    #[must_use]
    pub const fn is_progress(&self) -> bool {
        matches!(self.kind, MessageKind::Progress)
    }
}
