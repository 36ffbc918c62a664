//! shellpilot - terminal assistant that chats and drives shell sessions
//!
//! User input is either answered by a remote text model or, when it looks
//! like a task, carried out by an agent loop that proposes shell commands
//! one at a time and runs them in a persistent local shell.
//!
//! # Modules
//!
//! - `shell` - shell process lifecycle and marker-framed output capture
//! - `registry` - open sessions and the active pointer
//! - `llm` - chat completion and image generation clients
//! - `agent` - proposer, task loop, intent classifier, conversation memory
//! - `assistant` - routes input lines to the above
//! - `commands` - REPL input parsing
//! - `config` - runtime configuration
//! - `metrics` - Prometheus metrics
//! - `telemetry` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use shellpilot::{Assistant, Config, NoopObserver};
//!
//! let mut assistant = Assistant::new(Config::from_env());
//! let reply = assistant.handle("agent: open bash", &NoopObserver).await;
//! let reply = assistant.handle("agent: ls -la", &NoopObserver).await;
//! let reply = assistant.handle("create a folder named demo", &NoopObserver).await;
//! assistant.shutdown().await;
//! ```

pub mod agent;
pub mod assistant;
pub mod commands;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod registry;
pub mod shell;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use agent::{
    AgentConfig, CommandProposer, NoopObserver, ProposedAction, TaskEvent, TaskLoop, TaskObserver,
    TaskOutcome, TaskReport,
};
pub use assistant::{Assistant, Reply};
pub use config::Config;
pub use error::{AgentError, Result};
pub use registry::SessionRegistry;
pub use shell::{LaunchMode, SessionId, ShellKind, ShellSession};
