//! Agent module for model-driven shell automation
//!
//! # Architecture
//!
//! ```text
//! User input → IntentClassifier → Task? ─┐
//!                                        ↓
//!              TaskLoop ← ProposedAction ← CommandProposer (remote model)
//!                 ↓
//!           ShellSession.execute() → output
//!                 ↓
//!           Feed output back as context → Loop or Complete
//! ```

pub mod classifier;
pub mod conversation;
pub mod proposer;
pub mod task_loop;

pub use classifier::{keyword_intent, Classification, Intent, IntentClassifier, IntentSource};
pub use conversation::Conversation;
pub use proposer::{parse_action, CommandProposer, ProposalContext, ProposedAction, RemoteProposer};
pub use task_loop::{
    AgentConfig, ExecutionRecord, NoopObserver, TaskEvent, TaskLoop, TaskObserver, TaskOutcome,
    TaskReport,
};
