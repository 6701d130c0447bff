//! Runtime registry for tool definitions and execution.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::outcome::ToolOutcome;

/// Result alias for tool registration and lookup.
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait implemented by invocable tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description advertised to the agent.
    fn description(&self) -> &str;

    /// JSON-schema object describing accepted arguments.
    fn parameters(&self) -> &Value;

    /// Runs the tool once with the supplied named arguments.
    ///
    /// Failures are reported through the returned [`ToolOutcome`], never as
    /// errors or panics.
    async fn execute(&self, args: &Map<String, Value>) -> ToolOutcome;

    /// Function-calling schema advertised to the model.
    fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

/// Registry that stores tool implementations keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present;
    /// the existing registration is left untouched.
    pub fn register(&self, tool: Arc<dyn Tool>) -> ToolResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let name = tool.name().to_owned();
        if inner.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        inner.insert(name, tool);
        Ok(())
    }

    /// Removes a tool, returning it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Returns `true` when a tool with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns the tool matching the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Invokes a registered tool.
    ///
    /// The registry lock is not held while the tool runs, so concurrent
    /// invocations proceed independently.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found. Every
    /// failure of the tool itself is carried inside the [`ToolOutcome`].
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> ToolResult<ToolOutcome> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        Ok(tool.execute(args).await)
    }

    /// Sorted names of all registered tools.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Function-calling schemas of all registered tools, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.names()
            .iter()
            .filter_map(|name| self.get(name))
            .map(|tool| tool.to_schema())
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors produced by tool loading, registration, and lookup.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool manifest failed to parse or validate.
    #[error("invalid tool manifest: {reason}")]
    InvalidManifest {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool manifest has no `name` field.
    #[error("tool manifest is missing the `name` field")]
    MissingName,

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },
}

impl ToolError {
    /// Creates a manifest error from the supplied reason.
    #[must_use]
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}
