//! Execution of the comparison tool.

use anyhow::{Context as _, Result};
use log::debug;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Exit status and combined output of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    #[inline]
    #[must_use]
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the comparison tool.
///
/// An `Err` means the tool could not be run at all; a tool that ran and
/// failed is an `Ok` with a non-zero exit code.
pub trait CommandRunner {
    /// Runs `program` with `args` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or awaited.
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput>;
}

/// Runs the tool as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput> {
        debug!("Running {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", program.display()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        // Killed by a signal: no exit code.
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(CommandOutput::new(exit_code, combined))
    }
}
