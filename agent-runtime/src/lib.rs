//! Agent runtime SDK facade.
//!
//! Depend on this crate to pull in the runtime crates behind feature flags so
//! downstream agents can enable only the components they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Message bus and channel lifecycle (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Tool discovery and sandboxed execution (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Session routing and the streaming HTTP channel (enabled by `channels` feature).
#[cfg(feature = "channels")]
pub use agent_channels as channels;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Configuration management (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;
