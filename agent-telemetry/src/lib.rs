//! Observability utilities for the agent runtime.

#![warn(missing_docs, clippy::pedantic)]

pub mod tracing_support;

pub use tracing_support::{TracingOptions, init_tracing};
