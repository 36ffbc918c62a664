//! Process spawning for shell sessions
//!
//! Background sessions are piped child processes. Visible sessions are handed
//! to a terminal emulator and are not driven programmatically.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info};

use super::kind::ShellKind;
use crate::error::{AgentError, Result};

/// How a session's process is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Piped child process driven by the agent
    Background,
    /// Separate terminal window for the user
    Visible,
}

impl LaunchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchMode::Background => "background",
            LaunchMode::Visible => "visible",
        }
    }
}

/// How long a launcher gets to fail before the window counts as opened
const LAUNCH_CHECK: Duration = Duration::from_millis(300);

/// Linux terminal emulators and the flag that precedes the program to run
const LINUX_TERMINALS: &[(&str, &str)] = &[
    ("gnome-terminal", "--"),
    ("konsole", "-e"),
    ("xterm", "-e"),
    ("xfce4-terminal", "--execute"),
    ("mate-terminal", "--execute"),
    ("lxterminal", "-e"),
    ("terminator", "-e"),
];

/// Spawn a piped shell process in `working_dir`
pub fn spawn_background(kind: ShellKind, working_dir: &Path) -> Result<tokio::process::Child> {
    if !kind.supported_on_host() {
        return Err(AgentError::platform_mismatch(kind.as_str()));
    }
    let program = kind.locate().ok_or_else(|| {
        AgentError::spawn_failure(kind.as_str(), "no executable found on PATH")
    })?;

    let mut cmd = tokio::process::Command::new(&program);
    cmd.args(kind.background_args())
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Keep terminal Ctrl-C away from the shell; the REPL handles it
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| AgentError::spawn_failure(kind.as_str(), e.to_string()))?;

    debug!(
        shell = kind.as_str(),
        program = %program.display(),
        pid = child.id(),
        "spawned background shell"
    );
    Ok(child)
}

/// Open `kind` in a new terminal window rooted at `working_dir`
///
/// Candidates are tried in order. A launcher that exits with a failure
/// within `LAUNCH_CHECK` (no display, missing binary) moves on to the next
/// one. The terminal process is detached; the session keeps no handle to it.
pub async fn spawn_visible(kind: ShellKind, working_dir: &Path) -> Result<()> {
    let program = match kind.locate() {
        Some(program) => program,
        None if !kind.supported_on_host() => {
            return Err(AgentError::platform_mismatch(kind.as_str()))
        }
        None => {
            return Err(AgentError::spawn_failure(
                kind.as_str(),
                "no executable found on PATH",
            ))
        }
    };
    let program = program.to_string_lossy().into_owned();

    let mut last_error = String::from("no terminal launcher available");
    for candidate in visible_candidates(kind, &program) {
        let launcher = candidate.get_program().to_string_lossy().into_owned();
        let mut cmd = tokio::process::Command::from(candidate);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(launcher = %launcher, error = %e, "launcher failed");
                last_error = format!("{}: {}", launcher, e);
                continue;
            }
        };

        match tokio::time::timeout(LAUNCH_CHECK, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                debug!(launcher = %launcher, %status, "launcher exited early");
                last_error = format!("{} exited with {}", launcher, status);
                continue;
            }
            Ok(Err(e)) => {
                last_error = format!("{}: {}", launcher, e);
                continue;
            }
            // handed the window to a server process and exited cleanly
            Ok(Ok(_)) => {}
            Err(_) => {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }

        info!(shell = kind.as_str(), launcher = %launcher, "opened visible shell");
        return Ok(());
    }

    Err(AgentError::spawn_failure(kind.as_str(), last_error))
}

/// Launcher commands for this platform, most preferred first
fn visible_candidates(kind: ShellKind, program: &str) -> Vec<std::process::Command> {
    let shell_args = kind.visible_args();
    let mut candidates = Vec::new();

    if cfg!(windows) {
        let mut cmd = std::process::Command::new("cmd");
        cmd.args(["/C", "start", "", program]).args(shell_args);
        candidates.push(cmd);
    } else if cfg!(target_os = "macos") {
        let mut cmd = std::process::Command::new("open");
        cmd.args(["-a", "Terminal", program]);
        candidates.push(cmd);
    } else {
        for (terminal, flag) in LINUX_TERMINALS {
            let mut cmd = std::process::Command::new(terminal);
            cmd.arg(flag).arg(program).args(shell_args);
            candidates.push(cmd);
        }
    }

    candidates
}
