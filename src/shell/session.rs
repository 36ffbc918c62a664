//! Shell Session - one shell process under agent control
//!
//! Background sessions own a piped child process and run commands by writing
//! them to stdin followed by a marker command. Visible sessions only record
//! that a terminal was opened.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, info_span, warn, Instrument};

use super::capture::{new_marker, OutputCapture};
use super::kind::ShellKind;
use super::launcher::{self, LaunchMode};
use crate::error::{AgentError, Result};
use crate::metrics::{SHELL_COMMANDS, SHELL_SESSIONS_OPEN};

/// Timing knobs for shell sessions
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// How long to wait for a command's completion marker
    pub capture_timeout: Duration,
    /// How long to wait for a graceful exit before killing
    pub close_timeout: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Session identifier of the form `session_<n>_<kind>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(sequence: u64, kind: ShellKind) -> Self {
        Self(format!("session_{}_{}", sequence, kind.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of running one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// The command as written
    pub command: String,
    /// Captured output, or a status line when capture was incomplete
    pub output: String,
    /// The completion marker was seen, so `output` is the full output
    pub framed: bool,
    /// Exit status reported by the shell, when framed
    pub exit_code: Option<i32>,
    /// The shell process is still running
    pub alive: bool,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub id: SessionId,
    pub kind: ShellKind,
    pub working_dir: PathBuf,
    pub mode: LaunchMode,
    pub is_active: bool,
    pub command_count: usize,
    pub created_at: DateTime<Local>,
    pub last_command: Option<String>,
}

/// A shell process and everything the agent knows about it
pub struct ShellSession {
    id: SessionId,
    kind: ShellKind,
    working_dir: PathBuf,
    mode: LaunchMode,
    config: ShellConfig,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    capture: Option<OutputCapture>,
    is_active: bool,
    history: Vec<String>,
    last_output: String,
    /// Marker of the last command whose capture timed out; its late
    /// output must not be attributed to the next command
    stale_marker: Option<String>,
    created_at: DateTime<Local>,
    /// Still counted in `SHELL_SESSIONS_OPEN`
    counted: bool,
}

impl ShellSession {
    /// Start a shell of `kind` in `working_dir` (process cwd when `None`)
    pub async fn open(
        id: SessionId,
        kind: ShellKind,
        working_dir: Option<&Path>,
        mode: LaunchMode,
        config: ShellConfig,
    ) -> Result<Self> {
        let working_dir = resolve_working_dir(kind, working_dir)?;

        let mut session = Self {
            id,
            kind,
            working_dir,
            mode,
            config,
            process: None,
            stdin: None,
            capture: None,
            is_active: false,
            history: Vec::new(),
            last_output: String::new(),
            stale_marker: None,
            created_at: Local::now(),
            counted: false,
        };

        match mode {
            LaunchMode::Background => {
                let mut child = launcher::spawn_background(kind, &session.working_dir)?;
                let capture = OutputCapture::attach(child.stdout.take(), child.stderr.take());
                session.stdin = child.stdin.take();
                session.process = Some(child);
                session.capture = Some(capture);

                if let Some(init) = kind.init_script() {
                    session.write_line(init).await?;
                }
            }
            LaunchMode::Visible => launcher::spawn_visible(kind, &session.working_dir).await?,
        }

        session.is_active = true;
        session.counted = true;
        SHELL_SESSIONS_OPEN.inc();

        info!(
            session = %session.id,
            shell = kind.as_str(),
            mode = mode.as_str(),
            working_dir = %session.working_dir.display(),
            "shell session opened"
        );
        Ok(session)
    }

    /// Run `command` and capture its output
    ///
    /// Only background sessions with a live process accept commands. The
    /// command is appended to history and `last_output` is overwritten
    /// whatever the outcome.
    pub async fn execute(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.is_active || self.process.is_none() || self.stdin.is_none() {
            return Err(AgentError::SessionNotActive(self.id.to_string()));
        }

        self.history.push(command.to_string());

        let span = info_span!(
            "shell_exec",
            session = %self.id,
            shell = self.kind.as_str(),
            step = self.history.len(),
        );
        let result = self.run_framed(command).instrument(span).await;

        match result {
            Ok(output) => {
                self.last_output = output.output.clone();
                SHELL_COMMANDS
                    .with_label_values(&[self.kind.as_str(), if output.framed { "true" } else { "false" }])
                    .inc();
                Ok(output)
            }
            Err(e) => {
                self.last_output = format!("Error executing command: {}", e);
                if !self.refresh_liveness() {
                    self.release();
                }
                Err(e)
            }
        }
    }

    async fn run_framed(&mut self, command: &str) -> Result<CommandOutput> {
        let marker = new_marker();

        let mut stale = self.stale_marker.take();
        if let Some(capture) = self.capture.as_mut() {
            let (dropped, stale_seen) = capture.discard_pending(stale.as_deref());
            if stale_seen {
                stale = None;
            }
            if dropped > 0 {
                debug!(lines = dropped, "discarded output from earlier commands");
            }
        }

        // Command and marker go out in a single write
        let ending = self.kind.line_ending();
        let payload = format!(
            "{}{}{}",
            command,
            ending,
            self.kind.marker_command(&marker)
        );
        self.write_line(&payload).await?;

        let window = self.config.capture_timeout;
        let captured = match self.capture.as_mut() {
            Some(capture) => capture.collect_until(&marker, stale.as_deref(), window).await,
            None => return Err(AgentError::SessionNotActive(self.id.to_string())),
        };
        if captured.skipped > 0 {
            debug!(lines = captured.skipped, "skipped late output from earlier commands");
        }

        if captured.complete {
            debug!(lines = captured.lines.len(), exit_code = ?captured.exit_code, "command framed");
            return Ok(CommandOutput {
                command: command.to_string(),
                output: captured.text(),
                framed: true,
                exit_code: captured.exit_code,
                alive: true,
            });
        }

        // Anything before this marker belongs to a command that already returned
        self.stale_marker = Some(marker);

        // Pipes closed: give the process a moment to be reaped
        if captured.eof {
            if let Some(child) = self.process.as_mut() {
                let _ = tokio::time::timeout(Duration::from_millis(500), child.wait()).await;
            }
        }

        let alive = self.refresh_liveness();
        let output = if alive {
            let status = format!(
                "Executed: {}\nWorking directory: {}",
                command,
                self.working_dir.display()
            );
            if captured.lines.is_empty() {
                status
            } else {
                format!("{}\n{}", captured.text(), status)
            }
        } else {
            warn!(session = %self.id, "shell process ended");
            self.release();
            if captured.lines.is_empty() {
                "Process ended".to_string()
            } else {
                format!("{}\nProcess ended", captured.text())
            }
        };

        Ok(CommandOutput {
            command: command.to_string(),
            output,
            framed: false,
            exit_code: None,
            alive,
        })
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AgentError::SessionNotActive(self.id.to_string()))?;
        let payload = format!("{}{}", line, self.kind.line_ending());
        stdin.write_all(payload.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Check whether the process is still running, without blocking
    pub fn refresh_liveness(&mut self) -> bool {
        let alive = match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => self.mode == LaunchMode::Visible && self.is_active,
        };
        if !alive {
            self.is_active = false;
        }
        alive
    }

    /// Terminate the shell: ask politely, wait, then kill
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        // EOF on stdin lets the shell exit on its own
        drop(self.stdin.take());

        let mut outcome = Ok(());
        if let Some(mut child) = self.process.take() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                if let Some(pid) = child.id() {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        debug!(session = %self.id, error = %e, "SIGTERM failed");
                    }
                }
            }

            match tokio::time::timeout(self.config.close_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!(session = %self.id, %status, "shell exited"),
                Ok(Err(e)) => outcome = Err(AgentError::Io(e)),
                Err(_) => {
                    warn!(session = %self.id, "shell did not exit in time, killing");
                    if let Err(e) = child.kill().await {
                        outcome = Err(AgentError::Io(e));
                    }
                }
            }
        }

        if let Some(mut capture) = self.capture.take() {
            capture.shutdown();
        }
        self.release();
        info!(session = %self.id, "shell session closed");
        outcome
    }

    /// Mark inactive and drop out of the open-sessions gauge
    fn release(&mut self) {
        self.is_active = false;
        if self.counted {
            self.counted = false;
            SHELL_SESSIONS_OPEN.dec();
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id.clone(),
            kind: self.kind,
            working_dir: self.working_dir.clone(),
            mode: self.mode,
            is_active: self.is_active,
            command_count: self.history.len(),
            created_at: self.created_at,
            last_command: self.history.last().cloned(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Some(child) = self.process.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!(session = %self.id, error = %e, "kill on drop failed");
            }
        }
        self.release();
    }
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("working_dir", &self.working_dir)
            .field("mode", &self.mode)
            .field("is_active", &self.is_active)
            .field("commands", &self.history.len())
            .finish()
    }
}

fn resolve_working_dir(kind: ShellKind, requested: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let dir = match requested {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd,
    };
    if !dir.is_dir() {
        return Err(AgentError::spawn_failure(
            kind.as_str(),
            format!("working directory {} does not exist", dir.display()),
        ));
    }
    Ok(dir)
}
