//! Error types for shell sessions and the agent loop

use thiserror::Error;

use crate::llm::ChatError;

/// Errors raised by the shell session layer and the task loop.
///
/// `StepExhausted` is deliberately absent: running out of steps is a
/// [`TaskOutcome`](crate::agent::TaskOutcome), not a failure.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The requested shell kind is not one of powershell, cmd, bash, sh
    #[error("Unsupported shell kind: {0} (supported: powershell, cmd, bash, sh)")]
    UnsupportedShellKind(String),

    /// No runnable executable was found, or the process failed to start
    #[error("Failed to start {shell} session: {message}")]
    SpawnFailure {
        /// Shell kind that was requested
        shell: String,
        /// What went wrong
        message: String,
    },

    /// The shell kind cannot run on this host in the requested mode
    #[error("{shell} sessions are not supported on {platform}")]
    PlatformMismatch {
        /// Shell kind that was requested
        shell: String,
        /// Host operating system
        platform: String,
    },

    /// The session has no live, piped process to send commands to
    #[error("Session {0} is not active")]
    SessionNotActive(String),

    /// A task was started with no active session in the registry
    #[error("No active agent session. Start one with 'agent: open <shell>'")]
    NoActiveSession,

    /// The remote completion service could not be used
    #[error("Remote call failed: {0}")]
    RemoteCall(#[from] ChatError),

    /// I/O error talking to a child process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a spawn failure error
    pub fn spawn_failure(shell: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailure {
            shell: shell.into(),
            message: message.into(),
        }
    }

    /// Create a platform mismatch error for the current host
    pub fn platform_mismatch(shell: impl Into<String>) -> Self {
        Self::PlatformMismatch {
            shell: shell.into(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, AgentError>;
