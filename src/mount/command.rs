//! External process execution
//!
//! Every process the plugin spawns goes through [`CommandRunner`] so callers
//! only ever see an exit code and the combined output.

use crate::error::{CsiError, CsiResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Outcome of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    /// Build an output from an exit code and text
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning its exit code and output.
    ///
    /// A non-zero exit is not an error here; only failing to spawn is.
    async fn run(&self, program: &str, args: &[String]) -> CsiResult<CommandOutput>;
}

/// Command runner backed by `tokio::process`
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Create a new system command runner
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> CsiResult<CommandOutput> {
        let command_line = render(program, args);
        debug!("Executing: {}", command_line);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CsiError::command_failed(command_line.clone(), e))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("{} exited with {:?}: {}", command_line, output.status.code(), combined.trim_end());

        Ok(CommandOutput {
            code: output.status.code(),
            output: combined,
        })
    }
}

/// Render a command line for logs and error messages
pub(crate) fn render(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
