//! Static tool descriptions parsed from bundle manifests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::registry::{ToolError, ToolResult};

/// Deadline applied when a manifest does not declare one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw manifest record as written next to a tool's entry point.
///
/// Every field is optional at the parsing stage so that a missing `name`
/// can be reported distinctly from malformed JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolManifest {
    /// Unique tool name.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description; defaults to the name.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-schema object describing accepted arguments.
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Deadline in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ToolManifest {
    /// Parses a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidManifest`] when the text is not a JSON
    /// object of the expected shape.
    pub fn from_json(text: &str) -> ToolResult<Self> {
        serde_json::from_str(text).map_err(|err| ToolError::invalid_manifest(err.to_string()))
    }
}

/// Validated, immutable description of a tool bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDefinition {
    name: String,
    description: String,
    parameters: Value,
    timeout: Duration,
    directory: PathBuf,
    entry_point: PathBuf,
}

impl ToolDefinition {
    /// Creates a definition with default description, schema, and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidManifest`] if the name is blank.
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        entry_point: impl Into<PathBuf>,
    ) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::invalid_manifest("tool name cannot be empty"));
        }
        Ok(Self {
            description: name.clone(),
            name,
            parameters: empty_schema(),
            timeout: DEFAULT_TIMEOUT,
            directory: directory.into(),
            entry_point: entry_point.into(),
        })
    }

    /// Builds a definition from a parsed manifest found in `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingName`] when the manifest has no usable
    /// name and [`ToolError::InvalidManifest`] when the timeout is not a
    /// positive, finite number of seconds.
    pub fn from_manifest(
        manifest: ToolManifest,
        directory: &Path,
        entry_point: &Path,
    ) -> ToolResult<Self> {
        let name = manifest
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ToolError::MissingName)?;

        let mut definition = Self::new(name, directory, entry_point)?;
        if let Some(description) = manifest.description {
            definition = definition.with_description(description);
        }
        if let Some(parameters) = manifest.parameters {
            definition = definition.with_parameters(parameters);
        }
        if let Some(seconds) = manifest.timeout {
            definition = definition.with_timeout(parse_timeout(seconds)?);
        }
        Ok(definition)
    }

    /// Overrides the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Overrides the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Overrides the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON-schema object describing accepted arguments.
    #[must_use]
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Deadline for a single invocation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bundle directory; invocations run with it as working directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Executable entry point.
    #[must_use]
    pub fn entry_point(&self) -> &Path {
        &self.entry_point
    }
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn parse_timeout(seconds: f64) -> ToolResult<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ToolError::invalid_manifest(format!(
            "timeout must be a positive number of seconds, got {seconds}"
        )));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|err| ToolError::invalid_manifest(format!("timeout out of range: {err}")))
}
