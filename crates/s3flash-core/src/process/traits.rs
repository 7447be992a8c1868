//! Flash process abstraction.
//!
//! Defines the `FlashProcess` and `ProcessLauncher` traits so the
//! orchestrator can drive either the real tool or a scripted mock.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    #[error("Failed to kill flash process: {0}")]
    Kill(String),

    #[error("Failed to wait for flash process: {0}")]
    Wait(String),
}

/// Result of polling the merged output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// One complete line, without its terminator.
    Line(String),
    /// Nothing arrived within the timeout.
    Pending,
    /// The output stream reached its end. The process may still be
    /// running.
    Closed,
}

/// A running external flashing tool.
pub trait FlashProcess: Send {
    /// Next line of the merged stdout/stderr stream, waiting at most
    /// `timeout`.
    fn read_line(&mut self, timeout: Duration) -> OutputLine;

    /// Block until the process exits and return its exit code.
    ///
    /// A process killed by a signal reports `-1`.
    fn wait(&mut self) -> Result<i32, ProcessError>;

    /// Exit code if the process has exited, `None` while it still runs.
    /// Reaps the process once it reports an exit.
    fn try_wait(&mut self) -> Result<Option<i32>, ProcessError>;

    /// Forcefully terminate the process. Calling it on an exited process is
    /// not an error.
    fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Starts flash processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, args: &[String]) -> Result<Box<dyn FlashProcess>, ProcessError>;
}
