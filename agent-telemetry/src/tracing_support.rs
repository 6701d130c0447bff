//! Structured tracing helpers.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingOptions {
    /// Filter directives used when `RUST_LOG` is unset, e.g. `info,agent_tools=debug`.
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over [`TracingOptions::filter`].
///
/// # Errors
///
/// Returns an error when the filter cannot be parsed or a global subscriber
/// is already installed.
pub fn init_tracing(options: &TracingOptions) -> Result<()> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), &options.filter)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    tracing::debug!(json = options.json, "tracing initialised");
    Ok(())
}

fn build_filter(from_env: Option<String>, fallback: &str) -> Result<EnvFilter> {
    if let Some(directives) = from_env.filter(|value| !value.trim().is_empty()) {
        return EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid {} value `{directives}`", EnvFilter::DEFAULT_ENV));
    }
    EnvFilter::try_new(fallback).with_context(|| format!("invalid log filter `{fallback}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_overrides_configured_filter() {
        let filter = build_filter(Some("warn".into()), "debug").unwrap();
        assert!(filter.to_string().contains("warn"));
    }

    #[test]
    fn blank_environment_falls_back() {
        let filter = build_filter(Some("  ".into()), "info,agent_tools=debug").unwrap();
        assert!(filter.to_string().contains("agent_tools=debug"));
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let err = build_filter(None, "agent_tools=loud").unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: TracingOptions = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(
            options,
            TracingOptions {
                filter: "info".into(),
                json: true,
            }
        );
    }
}
