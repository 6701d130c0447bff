//! Tool discovery and execution utilities.
//!
//! Tools are externally defined bundles (a JSON manifest next to an
//! executable entry point) that the agent can invoke. The modules exposed
//! here discover bundles on disk, register them by name, and run each
//! invocation as an isolated subprocess whose every failure mode collapses
//! into a [`ToolOutcome`](outcome::ToolOutcome).

#![warn(missing_docs, clippy::pedantic)]

pub mod definition;
pub mod discovery;
pub mod outcome;
pub mod registry;
pub mod workspace;

pub use definition::{DEFAULT_TIMEOUT, ToolDefinition, ToolManifest};
pub use discovery::{
    DEFAULT_ENTRY_POINT, DEFAULT_MANIFEST_FILE, DiscoveryOptions, DiscoveryReport, SkipReason,
    SkippedBundle, discover_tool_dirs, load_tools, load_workspace_tools, workspace_tool_roots,
};
pub use outcome::{MAX_OUTPUT_CHARS, ToolOutcome};
pub use registry::{Tool, ToolError, ToolRegistry, ToolResult};
pub use workspace::WorkspaceTool;
