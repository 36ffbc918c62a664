//! Line capture from a piped shell process
//!
//! stdout and stderr are drained by background tasks into one channel. A
//! command's output is collected until the completion marker line arrives or
//! the capture window closes.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

const MARKER_PREFIX: &str = "__SHELLPILOT_DONE_";

/// Output gathered for one command
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Captured {
    /// Lines seen before the marker (or before the window closed)
    pub lines: Vec<String>,
    /// Whether the marker line was seen
    pub complete: bool,
    /// Exit status reported alongside the marker, when the shell provides one
    pub exit_code: Option<i32>,
    /// Both pipes reached end-of-file
    pub eof: bool,
    /// Lines left behind by earlier commands that were dropped
    pub skipped: usize,
    /// The earlier command's marker has still not arrived
    pub stale_pending: bool,
}

impl Captured {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Reader tasks plus the receiving end of their line channel
pub struct OutputCapture {
    rx: mpsc::UnboundedReceiver<String>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    /// Start draining the child's pipes
    pub fn attach(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            readers.push(spawn_reader(stdout, tx.clone(), "stdout"));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_reader(stderr, tx.clone(), "stderr"));
        }

        Self { rx, readers }
    }

    /// Drop lines left over from earlier commands
    ///
    /// Returns how many lines were dropped and whether `stale` (the marker of
    /// an earlier command that timed out) was among them.
    pub fn discard_pending(&mut self, stale: Option<&str>) -> (usize, bool) {
        let mut dropped = 0;
        let mut stale_seen = false;
        while let Ok(line) = self.rx.try_recv() {
            if let Some(stale) = stale {
                stale_seen |= parse_marker(&line, stale).is_some();
            }
            dropped += 1;
        }
        (dropped, stale_seen)
    }

    /// Collect lines until `marker` is seen or `window` elapses
    ///
    /// When `stale` is set, everything up to and including that marker
    /// belongs to an earlier command and is skipped. Marker lines of any
    /// other command are never reported as output.
    pub async fn collect_until(
        &mut self,
        marker: &str,
        stale: Option<&str>,
        window: Duration,
    ) -> Captured {
        let deadline = Instant::now() + window;
        let mut captured = Captured::default();
        let mut stale = stale;

        loop {
            let line = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    captured.eof = true;
                    break;
                }
                Err(_) => break,
            };

            if let Some(old) = stale {
                if parse_marker(&line, old).is_some() {
                    stale = None;
                }
                captured.skipped += 1;
                continue;
            }

            match parse_marker(&line, marker) {
                Some(exit_code) => {
                    captured.complete = true;
                    captured.exit_code = exit_code;
                    break;
                }
                None if is_marker_line(&line) => captured.skipped += 1,
                None => captured.lines.push(line),
            }
        }

        captured.stale_pending = stale.is_some();
        captured
    }

    /// Stop the reader tasks
    pub fn shutdown(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_reader<R>(
    pipe: R,
    tx: mpsc::UnboundedSender<String>,
    stream: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end_matches('\r').to_string();
            if tx.send(line).is_err() {
                break;
            }
        }
        trace!(stream, "pipe closed");
    })
}

/// Match a `<marker>:<code>` line. Returns `Some(code)` on a match, where
/// the code is `None` if the shell printed nothing parseable after the colon.
pub fn parse_marker(line: &str, marker: &str) -> Option<Option<i32>> {
    let rest = line.trim().strip_prefix(marker)?.strip_prefix(':')?;
    Some(rest.trim().parse().ok())
}

/// A fresh marker unlikely to appear in real output
pub fn new_marker() -> String {
    format!("{}{}__", MARKER_PREFIX, uuid::Uuid::now_v7().simple())
}

/// Whether `line` is the completion marker of some command
pub fn is_marker_line(line: &str) -> bool {
    line.trim_start().starts_with(MARKER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker() {
        assert_eq!(parse_marker("__M__:0", "__M__"), Some(Some(0)));
        assert_eq!(parse_marker("  __M__:127  ", "__M__"), Some(Some(127)));
        assert_eq!(parse_marker("__M__:", "__M__"), Some(None));
        assert_eq!(parse_marker("echo __M__:$?", "__M__"), None);
        assert_eq!(parse_marker("__M__", "__M__"), None);
        assert_eq!(parse_marker("hello", "__M__"), None);
    }

    #[test]
    fn test_markers_are_unique() {
        let a = new_marker();
        let b = new_marker();
        assert_ne!(a, b);
        assert!(a.starts_with("__SHELLPILOT_DONE_"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_until_marker() {
        use std::process::Stdio;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo one; echo two; echo __M__:3; echo after")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut capture = OutputCapture::attach(child.stdout.take(), child.stderr.take());
        let captured = capture.collect_until("__M__", None, Duration::from_secs(5)).await;

        assert!(captured.complete);
        assert_eq!(captured.exit_code, Some(3));
        assert_eq!(captured.lines, vec!["one", "two"]);
        let _ = child.wait().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_reports_eof_without_marker() {
        use std::process::Stdio;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo only")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut capture = OutputCapture::attach(child.stdout.take(), child.stderr.take());
        let captured = capture.collect_until("__M__", None, Duration::from_secs(5)).await;

        assert!(!captured.complete);
        assert!(captured.eof);
        assert_eq!(captured.text(), "only");
        let _ = child.wait().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_skips_earlier_command_output() {
        use std::process::Stdio;

        let current = new_marker();
        let other = new_marker();
        let script = format!(
            "echo late; echo __OLD__:0; echo {}:1; echo now; echo {}:0",
            other, current
        );
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut capture = OutputCapture::attach(child.stdout.take(), child.stderr.take());
        let captured = capture
            .collect_until(&current, Some("__OLD__"), Duration::from_secs(5))
            .await;

        assert!(captured.complete);
        assert_eq!(captured.exit_code, Some(0));
        assert_eq!(captured.lines, vec!["now"]);
        assert_eq!(captured.skipped, 3);
        assert!(!captured.stale_pending);
        let _ = child.wait().await;
    }

    #[test]
    fn test_marker_lines_are_recognised() {
        assert!(is_marker_line(&format!("{}:0", new_marker())));
        assert!(!is_marker_line("echo __SHELLPILOT"));
        assert!(!is_marker_line("hello"));
    }
}
