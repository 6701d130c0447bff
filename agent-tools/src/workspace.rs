//! User-installed tools executed as subprocesses.
//!
//! A workspace tool is a bundle directory holding a manifest and an entry
//! point script. Each invocation spawns one fresh process with the bundle
//! directory as working directory and the JSON-encoded arguments as its single
//! argument. Standard output is the result; standard error is only surfaced
//! when the process exits unsuccessfully.
//!
//! On Unix every invocation leads its own process group, and the whole group
//! is killed once the call ends, whether the entry point exited or overran
//! its deadline. Nothing a tool forks outlives the call.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::definition::ToolDefinition;
use crate::outcome::ToolOutcome;
use crate::registry::Tool;

/// How long output pipes may stay open after the entry point has exited.
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

/// Tool backed by an executable entry point inside a bundle directory.
#[derive(Clone, Debug)]
pub struct WorkspaceTool {
    definition: ToolDefinition,
}

impl WorkspaceTool {
    /// Wraps a validated definition.
    #[must_use]
    pub fn new(definition: ToolDefinition) -> Self {
        Self { definition }
    }

    /// Returns the underlying definition.
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Runs the entry point once and shapes the result.
    pub async fn run(&self, args: &Map<String, Value>) -> ToolOutcome {
        let name = self.definition.name();
        let entry_point = self.definition.entry_point();

        if !entry_point.is_file() {
            let file = entry_point.file_name().map_or_else(
                || entry_point.display().to_string(),
                |file| file.to_string_lossy().into_owned(),
            );
            return ToolOutcome::execution_error(format!(
                "Error: {file} not found for tool '{name}'"
            ));
        }

        let payload = match serde_json::to_string(args) {
            Ok(payload) => payload,
            Err(err) => {
                return ToolOutcome::execution_error(format!(
                    "Error executing tool '{name}': arguments could not be encoded: {err}"
                ));
            }
        };

        let (program, mut argv) = resolve_interpreter(entry_point);
        argv.push(payload);

        debug!(
            tool = name,
            entry_point = %entry_point.display(),
            program = %program,
            "executing workspace tool"
        );

        let mut command = std::process::Command::new(&program);
        command
            .args(&argv)
            .current_dir(self.definition.directory())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut command = Command::from(command);
        command.kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(tool = name, %err, "failed to spawn workspace tool");
                return ToolOutcome::execution_error(format!(
                    "Error executing tool '{name}': {}",
                    err.kind()
                ));
            }
        };
        let group = child.id();

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let timeout = self.definition.timeout();

        let status = {
            let reading = async {
                tokio::join!(
                    drain(stdout_pipe.as_mut(), &mut stdout),
                    drain(stderr_pipe.as_mut(), &mut stderr)
                );
            };
            tokio::pin!(reading);
            let mut drained = false;

            let exited = tokio::time::timeout(timeout, async {
                loop {
                    tokio::select! {
                        status = child.wait() => break status,
                        () = &mut reading, if !drained => drained = true,
                    }
                }
            })
            .await;

            if let Ok(status) = exited {
                // Background children may still hold the pipes open.
                kill_group(group);
                if !drained && tokio::time::timeout(OUTPUT_GRACE, &mut reading).await.is_err() {
                    debug!(tool = name, "tool output still open after exit");
                }
                Some(status)
            } else {
                None
            }
        };

        let Some(status) = status else {
            kill_group(group);
            if let Err(err) = child.kill().await {
                warn!(tool = name, %err, "failed to kill timed out workspace tool");
            }
            warn!(tool = name, ?timeout, "workspace tool timed out");
            return ToolOutcome::TimedOut {
                tool: name.to_owned(),
                timeout,
            };
        };

        let status = match status {
            Ok(status) => status,
            Err(err) => {
                warn!(tool = name, %err, "failed to wait for workspace tool");
                return ToolOutcome::execution_error(format!(
                    "Error executing tool '{name}': {}",
                    err.kind()
                ));
            }
        };

        shape(name, status, &stdout, &stderr)
    }
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn name(&self) -> &str {
        self.definition.name()
    }

    fn description(&self) -> &str {
        self.definition.description()
    }

    fn parameters(&self) -> &Value {
        self.definition.parameters()
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutcome {
        self.run(args).await
    }
}

fn shape(name: &str, status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> ToolOutcome {
    if status.success() {
        let outcome = ToolOutcome::from_stdout(stdout);
        debug!(tool = name, "workspace tool finished");
        return outcome;
    }
    debug!(tool = name, code = ?status.code(), "workspace tool exited unsuccessfully");
    ToolOutcome::failed(status.code(), stderr)
}

/// Reads a pipe to completion into `buffer`. Read errors truncate rather than
/// fail the call, and bytes read before cancellation stay in `buffer`.
async fn drain<R>(reader: Option<&mut R>, buffer: &mut Vec<u8>)
where
    R: AsyncRead + Unpin,
{
    if let Some(reader) = reader {
        if let Err(err) = reader.read_to_end(buffer).await {
            debug!(%err, "tool output pipe closed with error");
        }
    }
}

/// Sends `SIGKILL` to the process group led by the tool process.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(group) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if group <= 1 {
        return;
    }
    match killpg(Pid::from_raw(group), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(group, %err, "failed to kill tool process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Determines the program and leading arguments for an entry point based on
/// its extension. The entry point path is always included.
fn resolve_interpreter(entry_point: &Path) -> (String, Vec<String>) {
    let path = entry_point.to_string_lossy().into_owned();
    let ext = entry_point
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match ext {
        "py" => ("python3".into(), vec![path]),
        "sh" => ("sh".into(), vec![path]),
        "bash" => ("bash".into(), vec![path]),
        "js" | "mjs" => ("node".into(), vec![path]),
        "rb" => ("ruby".into(), vec![path]),
        _ => (path, Vec::new()),
    }
}
