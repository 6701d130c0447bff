//! The closed set of results a tool invocation can produce.

use std::fmt;
use std::time::Duration;

/// Maximum number of characters of tool output relayed to the caller.
pub const MAX_OUTPUT_CHARS: usize = 10_000;

/// Outcome of exactly one tool invocation.
///
/// Every subprocess failure mode maps onto one of these variants; callers
/// never see raw I/O errors. [`ToolOutcome::to_text`] renders the variant as
/// the plain text handed back to the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool exited successfully and printed something.
    ///
    /// The text is trimmed and capped at [`MAX_OUTPUT_CHARS`] characters plus
    /// a trailer counting the characters that were dropped.
    Success(String),
    /// The tool exited successfully without printing anything.
    NoOutput,
    /// The tool ran and exited unsuccessfully.
    Failed {
        /// Exit code, or `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Trimmed standard error; empty when the tool wrote nothing.
        stderr: String,
    },
    /// The deadline elapsed and the process was killed.
    TimedOut {
        /// Name of the tool that overran.
        tool: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },
    /// The tool could not be started at all.
    ExecutionError {
        /// Human-readable message naming the tool and the reason.
        message: String,
    },
}

impl ToolOutcome {
    /// Shapes raw standard output of a successful run.
    ///
    /// Invalid UTF-8 is replaced rather than rejected, surrounding whitespace
    /// is trimmed, and overlong output is truncated.
    #[must_use]
    pub fn from_stdout(stdout: &[u8]) -> Self {
        let text = String::from_utf8_lossy(stdout);
        let text = text.trim();
        if text.is_empty() {
            return Self::NoOutput;
        }
        Self::Success(truncate(text))
    }

    /// Builds a failure outcome from an exit code and raw standard error.
    #[must_use]
    pub fn failed(exit_code: Option<i32>, stderr: &[u8]) -> Self {
        Self::Failed {
            exit_code,
            stderr: String::from_utf8_lossy(stderr).trim().to_owned(),
        }
    }

    /// Builds an execution error from a human-readable message.
    #[must_use]
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::ExecutionError {
            message: message.into(),
        }
    }

    /// Returns `true` when the tool ran to a successful exit.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_) | Self::NoOutput)
    }

    /// Renders the outcome as the text relayed to the agent.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(text) => f.write_str(text),
            Self::NoOutput => f.write_str("(no output)"),
            Self::Failed { exit_code, stderr } => {
                let code = exit_code.map_or_else(|| "signal".to_owned(), |code| code.to_string());
                if stderr.is_empty() {
                    write!(f, "Error (exit {code})")
                } else {
                    write!(f, "Error (exit {code}): {stderr}")
                }
            }
            Self::TimedOut { tool, timeout } => write!(
                f,
                "Error: Tool '{tool}' timed out after {}s",
                format_seconds(*timeout)
            ),
            Self::ExecutionError { message } => f.write_str(message),
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_OUTPUT_CHARS) {
        None => text.to_owned(),
        Some((cut, _)) => {
            let omitted = text[cut..].chars().count();
            format!("{}\n... (truncated, {omitted} more chars)", &text[..cut])
        }
    }
}

fn format_seconds(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        timeout.as_secs().to_string()
    } else {
        timeout.as_secs_f64().to_string()
    }
}
