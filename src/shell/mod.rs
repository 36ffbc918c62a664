//! Shell sessions driven by the agent
//!
//! - `kind`: supported shells, discovery and per-shell syntax
//! - `launcher`: background and visible process spawning
//! - `capture`: marker-framed output collection
//! - `session`: the session itself

pub mod capture;
pub mod kind;
pub mod launcher;
pub mod session;

pub use kind::ShellKind;
pub use launcher::LaunchMode;
pub use session::{CommandOutput, SessionId, SessionStatus, ShellConfig, ShellSession};
