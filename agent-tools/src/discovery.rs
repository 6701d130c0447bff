//! Tool bundle discovery.
//!
//! A bundle is a non-hidden directory containing a manifest file and an
//! executable entry point. Discovery never fails as a whole: every bundle
//! that cannot be loaded is skipped with a warning and recorded in the
//! returned [`DiscoveryReport`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::definition::{DEFAULT_TIMEOUT, ToolDefinition, ToolManifest};
use crate::registry::{ToolError, ToolRegistry};
use crate::workspace::WorkspaceTool;

/// Manifest file name expected inside each bundle.
pub const DEFAULT_MANIFEST_FILE: &str = "tool.json";

/// Entry point file name expected inside each bundle.
pub const DEFAULT_ENTRY_POINT: &str = "run.py";

/// File names and defaults used while scanning bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Manifest file name inside each bundle directory.
    pub manifest_file: String,
    /// Entry point file name inside each bundle directory.
    pub entry_point: String,
    /// Deadline applied when a manifest does not declare one.
    pub default_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            manifest_file: DEFAULT_MANIFEST_FILE.into(),
            entry_point: DEFAULT_ENTRY_POINT.into(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Why a bundle was left out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The manifest could not be read or parsed.
    InvalidManifest(String),
    /// The manifest has no usable `name`.
    MissingName,
    /// The bundle has a manifest but no entry point.
    MissingEntryPoint,
    /// A tool with the same name was registered first.
    NameConflict(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidManifest(reason) => write!(f, "invalid manifest: {reason}"),
            Self::MissingName => f.write_str("manifest missing 'name' field"),
            Self::MissingEntryPoint => f.write_str("manifest present but no entry point"),
            Self::NameConflict(name) => write!(f, "'{name}' conflicts with existing tool"),
        }
    }
}

/// A bundle that discovery skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBundle {
    /// Bundle directory.
    pub directory: PathBuf,
    /// Reason it was skipped.
    pub reason: SkipReason,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Names of tools registered, in registration order.
    pub registered: Vec<String>,
    /// Bundles that were skipped.
    pub skipped: Vec<SkippedBundle>,
}

impl DiscoveryReport {
    /// Number of tools registered.
    #[must_use]
    pub fn count(&self) -> usize {
        self.registered.len()
    }
}

/// Base directories scanned for a workspace.
///
/// The flat `<workspace>/tools` directory comes first, followed by the
/// per-agent `<workspace>/agents/<agent>/tools` directories in name order.
#[must_use]
pub fn workspace_tool_roots(workspace: &Path) -> Vec<PathBuf> {
    let mut roots = vec![workspace.join("tools")];
    roots.extend(
        visible_subdirectories(&workspace.join("agents"))
            .into_iter()
            .map(|agent| agent.join("tools")),
    );
    roots
}

/// Discovers bundles under every root and registers them.
///
/// Roots are scanned in the order given; within a root, bundles are visited
/// in name order. When two bundles declare the same name, the first one wins.
pub fn load_tools(
    roots: &[PathBuf],
    registry: &ToolRegistry,
    options: &DiscoveryOptions,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    for root in roots {
        for directory in discover_tool_dirs(root, &options.manifest_file) {
            let bundle = directory
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let tool = match load_bundle(&directory, options) {
                Ok(tool) => tool,
                Err(reason) => {
                    warn!(bundle = %bundle, %reason, "skipping tool bundle");
                    report.skipped.push(SkippedBundle { directory, reason });
                    continue;
                }
            };

            let name = tool.definition().name().to_owned();
            match registry.register(Arc::new(tool)) {
                Ok(()) => {
                    info!(tool = %name, bundle = %bundle, "registered workspace tool");
                    report.registered.push(name);
                }
                Err(ToolError::DuplicateTool { name }) => {
                    let reason = SkipReason::NameConflict(name);
                    warn!(bundle = %bundle, %reason, "skipping tool bundle");
                    report.skipped.push(SkippedBundle { directory, reason });
                }
                Err(err) => {
                    let reason = SkipReason::InvalidManifest(err.to_string());
                    warn!(bundle = %bundle, %reason, "skipping tool bundle");
                    report.skipped.push(SkippedBundle { directory, reason });
                }
            }
        }
    }

    report
}

/// Discovers every bundle belonging to a workspace and registers it.
pub fn load_workspace_tools(
    workspace: &Path,
    registry: &ToolRegistry,
    options: &DiscoveryOptions,
) -> DiscoveryReport {
    let report = load_tools(&workspace_tool_roots(workspace), registry, options);
    debug!(
        workspace = %workspace.display(),
        registered = report.count(),
        skipped = report.skipped.len(),
        "workspace tool discovery finished"
    );
    report
}

fn load_bundle(directory: &Path, options: &DiscoveryOptions) -> Result<WorkspaceTool, SkipReason> {
    let manifest_path = directory.join(&options.manifest_file);
    let text = fs::read_to_string(&manifest_path)
        .map_err(|err| SkipReason::InvalidManifest(err.kind().to_string()))?;
    let manifest = ToolManifest::from_json(&text).map_err(|err| match err {
        ToolError::InvalidManifest { reason } => SkipReason::InvalidManifest(reason),
        other => SkipReason::InvalidManifest(other.to_string()),
    })?;

    let entry_point = directory.join(&options.entry_point);
    let declares_timeout = manifest.timeout.is_some();
    let definition = ToolDefinition::from_manifest(manifest, directory, &entry_point)
        .map_err(|err| match err {
            ToolError::MissingName => SkipReason::MissingName,
            ToolError::InvalidManifest { reason } => SkipReason::InvalidManifest(reason),
            other => SkipReason::InvalidManifest(other.to_string()),
        })?;

    if !entry_point.is_file() {
        return Err(SkipReason::MissingEntryPoint);
    }

    let definition = if declares_timeout {
        definition
    } else {
        definition.with_timeout(options.default_timeout)
    };
    Ok(WorkspaceTool::new(definition))
}

/// Sorted, non-hidden bundle directories directly under `root` that hold
/// `manifest_file`. A missing root yields no bundles.
#[must_use]
pub fn discover_tool_dirs(root: &Path, manifest_file: &str) -> Vec<PathBuf> {
    visible_subdirectories(root)
        .into_iter()
        .filter(|dir| dir.join(manifest_file).is_file())
        .collect()
}

/// Sorted non-hidden subdirectories; a missing or unreadable root is empty.
fn visible_subdirectories(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
