//! Strongly typed configuration schemas.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Workspace directory holding `tools/` and `agents/<name>/tools/`.
    pub workspace: PathBuf,
    /// Tool discovery settings.
    pub tools: ToolsConfig,
    /// Channel settings.
    pub channels: ChannelsConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("./workspace"),
            tools: ToolsConfig::default(),
            channels: ChannelsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.tools.manifest_file.trim().is_empty(),
            "tools.manifest_file must not be empty"
        );
        ensure!(
            !self.tools.entry_point.trim().is_empty(),
            "tools.entry_point must not be empty"
        );
        ensure!(
            self.tools.default_timeout_secs > 0,
            "tools.default_timeout_secs must be positive"
        );
        ensure!(
            !self.channels.http.host.trim().is_empty(),
            "channels.http.host must not be empty"
        );
        ensure!(
            self.channels.http.stream_timeout_secs > 0,
            "channels.http.stream_timeout_secs must be positive"
        );
        Ok(())
    }
}

/// Tool discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Whether workspace tools are discovered at all.
    pub enabled: bool,
    /// Manifest file name inside each bundle.
    pub manifest_file: String,
    /// Entry point file name inside each bundle.
    pub entry_point: String,
    /// Deadline for tools whose manifest declares none.
    pub default_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest_file: "tool.json".into(),
            entry_point: "run.py".into(),
            default_timeout_secs: 30,
        }
    }
}

impl ToolsConfig {
    /// [`ToolsConfig::default_timeout_secs`] as a [`Duration`].
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Settings for every built-in channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelsConfig {
    /// HTTP streaming channel.
    pub http: HttpConfig,
}

/// HTTP streaming channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the channel is started.
    pub enabled: bool,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Sender ids allowed to chat. Empty allows everyone.
    pub allow_from: Vec<String>,
    /// Seconds a response stream may stay silent before it is closed.
    pub stream_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 18790,
            allow_from: Vec::new(),
            stream_timeout_secs: 300,
        }
    }
}

impl HttpConfig {
    /// [`HttpConfig::stream_timeout_secs`] as a [`Duration`].
    #[must_use]
    pub const fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}
