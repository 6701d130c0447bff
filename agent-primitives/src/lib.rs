//! Core shared types for the agent runtime.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod message;

/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Identifiers used to route output back to a waiting request.
pub use ids::{RequestId, SessionId};
/// Channel-agnostic messages exchanged over the bus.
pub use message::{InboundMessage, MessageKind, OutboundMessage};
