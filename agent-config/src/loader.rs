//! Configuration loader implementations.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::schema::RuntimeConfig;

/// Parses and validates a JSON configuration document.
///
/// # Errors
///
/// Returns an error when the document is not valid JSON, contains unknown
/// fields, or fails [`RuntimeConfig::validate`].
pub fn parse_config(text: &str) -> Result<RuntimeConfig> {
    let config: RuntimeConfig =
        serde_json::from_str(text).context("failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `path`, or defaults when no path is given or the
/// file does not exist.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        debug!("no configuration file given, using defaults");
        return Ok(RuntimeConfig::default());
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(RuntimeConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    parse_config(&text).with_context(|| format!("invalid configuration in {}", path.display()))
}
