//! Configuration management for the agent runtime.
//!
//! Configuration is a single JSON document. Every field is optional; missing
//! fields take the defaults documented on [`schema`] types, and unknown fields
//! are rejected so typos surface at startup.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{load_config, parse_config};
pub use schema::{ChannelsConfig, HttpConfig, LoggingConfig, RuntimeConfig, ToolsConfig};
