//! Supported shell kinds and how to find and invoke them on this host

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AgentError;

/// A shell the agent knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    PowerShell,
    Cmd,
    Bash,
    Sh,
}

impl ShellKind {
    /// Every supported kind, in display order
    pub const ALL: [ShellKind; 4] = [
        ShellKind::PowerShell,
        ShellKind::Cmd,
        ShellKind::Bash,
        ShellKind::Sh,
    ];

    /// Identifier used on the command line and in session ids
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::PowerShell => "powershell",
            ShellKind::Cmd => "cmd",
            ShellKind::Bash => "bash",
            ShellKind::Sh => "sh",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ShellKind::PowerShell => "PowerShell",
            ShellKind::Cmd => "Command Prompt",
            ShellKind::Bash => "Bash",
            ShellKind::Sh => "Shell",
        }
    }

    /// Whether this kind can run as a piped background process on this host
    pub fn supported_on_host(&self) -> bool {
        match self {
            ShellKind::Cmd => cfg!(windows),
            ShellKind::Sh => !cfg!(windows),
            ShellKind::PowerShell | ShellKind::Bash => true,
        }
    }

    /// Executable names and well-known install paths, in lookup order
    fn candidates(&self) -> Vec<&'static str> {
        match self {
            ShellKind::PowerShell if cfg!(windows) => vec!["powershell", "pwsh"],
            ShellKind::PowerShell => vec![
                "pwsh",
                "/usr/bin/pwsh",
                "/usr/local/bin/pwsh",
                "/opt/microsoft/powershell/7/pwsh",
                "/snap/bin/pwsh",
            ],
            ShellKind::Cmd => vec!["cmd"],
            ShellKind::Bash if cfg!(windows) => vec![
                "bash",
                "C:\\Program Files\\Git\\bin\\bash.exe",
                "C:\\Program Files (x86)\\Git\\bin\\bash.exe",
                "C:\\msys64\\usr\\bin\\bash.exe",
            ],
            ShellKind::Bash => vec!["bash"],
            ShellKind::Sh => vec!["sh"],
        }
    }

    /// Locate a runnable executable for this kind
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates()
            .into_iter()
            .find_map(|candidate| which::which(candidate).ok())
    }

    /// Arguments that make the shell read commands from a piped stdin
    pub fn background_args(&self) -> &'static [&'static str] {
        match self {
            ShellKind::PowerShell => &["-NoLogo", "-NoProfile", "-Command", "-"],
            ShellKind::Cmd => &["/Q", "/K"],
            ShellKind::Bash | ShellKind::Sh => &[],
        }
    }

    /// Arguments that keep an interactive window open after startup
    pub fn visible_args(&self) -> &'static [&'static str] {
        match self {
            ShellKind::PowerShell => &["-NoExit"],
            ShellKind::Cmd => &["/K"],
            ShellKind::Bash | ShellKind::Sh => &[],
        }
    }

    /// Commands written once after spawn, before any user command
    pub fn init_script(&self) -> Option<&'static str> {
        match self {
            // Interleave stderr with stdout so output stays in order
            ShellKind::Bash | ShellKind::Sh => Some("exec 2>&1"),
            ShellKind::PowerShell | ShellKind::Cmd => None,
        }
    }

    /// A command that prints `<marker>:<last exit code>` on its own line
    pub fn marker_command(&self, marker: &str) -> String {
        match self {
            ShellKind::Bash | ShellKind::Sh => format!("echo \"{}:$?\"", marker),
            ShellKind::PowerShell => format!("Write-Output \"{}:$LASTEXITCODE\"", marker),
            ShellKind::Cmd => format!("echo {}:%ERRORLEVEL%", marker),
        }
    }

    /// Line terminator the shell expects on stdin
    pub fn line_ending(&self) -> &'static str {
        match self {
            ShellKind::Cmd | ShellKind::PowerShell if cfg!(windows) => "\r\n",
            _ => "\n",
        }
    }

    /// Kinds that can actually be started on this host
    pub fn detect_available() -> Vec<ShellKind> {
        let mut available: Vec<ShellKind> = ShellKind::ALL
            .into_iter()
            .filter(|kind| kind.supported_on_host() && kind.locate().is_some())
            .collect();

        // sh is only listed as a fallback when bash is missing
        if available.contains(&ShellKind::Bash) {
            available.retain(|kind| *kind != ShellKind::Sh);
        }
        available
    }

    /// Best default shell for this host among `available`
    ///
    /// Windows prefers PowerShell, then cmd, then bash. Other hosts prefer
    /// bash, then sh, then PowerShell.
    pub fn preferred_from(available: &[ShellKind]) -> Option<ShellKind> {
        let order: &[ShellKind] = if cfg!(windows) {
            &[ShellKind::PowerShell, ShellKind::Cmd, ShellKind::Bash]
        } else {
            &[ShellKind::Bash, ShellKind::Sh, ShellKind::PowerShell]
        };

        order
            .iter()
            .copied()
            .find(|kind| available.contains(kind))
            .or_else(|| available.first().copied())
    }

    /// Best default shell for this host
    pub fn preferred() -> Option<ShellKind> {
        Self::preferred_from(&Self::detect_available())
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "powershell" | "pwsh" => Ok(ShellKind::PowerShell),
            "cmd" => Ok(ShellKind::Cmd),
            "bash" => Ok(ShellKind::Bash),
            "sh" => Ok(ShellKind::Sh),
            other => Err(AgentError::UnsupportedShellKind(other.to_string())),
        }
    }
}
