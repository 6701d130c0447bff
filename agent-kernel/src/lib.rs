//! Message bus, channel contract, and channel lifecycle management.
//!
//! Channels publish user messages onto the [`MessageBus`]; the agent loop
//! consumes them and publishes replies, which the [`ChannelManager`] routes
//! back to the channel each reply names.

#![warn(missing_docs, clippy::pedantic)]

mod bus;
mod channel;
mod lifecycle;
mod manager;

pub use bus::{BusError, BusResult, MessageBus};
pub use channel::{Channel, ChannelError, ChannelResult, sender_allowed};
pub use lifecycle::{
    ChannelLifecycle, ChannelState, LifecycleError, LifecycleEvent, LifecycleResult,
};
pub use manager::ChannelManager;
