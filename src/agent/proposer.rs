//! Command Proposer - asks the model for the next shell command
//!
//! The reply is reduced to a [`ProposedAction`]: finish, give up, or run a
//! command. Remote failures never escape; they become
//! [`ProposedAction::Error`].

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::commands::strip_prefix_ignore_case;
use crate::llm::client::truncate;
use crate::llm::{ChatClient, ChatMessage, CompletionOptions};
use crate::shell::{SessionStatus, ShellKind};

use super::task_loop::AgentConfig;

/// Reply prefix that ends a task successfully
pub const COMPLETE_SENTINEL: &str = "TASK_COMPLETE";

/// Reply prefix that ends a task with an error
pub const ERROR_SENTINEL: &str = "ERROR:";

/// What the model wants to do next
#[derive(Debug, Clone, PartialEq)]
pub enum ProposedAction {
    /// The task is done; `summary` is any text after the sentinel
    Complete { summary: String },
    /// The model (or the call to it) failed
    Error { reason: String },
    /// A shell command to run
    Command(String),
}

/// Everything the proposer sees about the current step
#[derive(Debug, Clone)]
pub struct ProposalContext<'a> {
    pub task: &'a str,
    pub session: SessionStatus,
    /// Commands run so far in this session, oldest first
    pub history: &'a [String],
    pub last_output: &'a str,
    pub step: usize,
    pub max_steps: usize,
}

/// Source of next-command proposals
#[async_trait]
pub trait CommandProposer: Send + Sync {
    /// Propose the next action given the step context and recent conversation
    async fn propose(
        &self,
        context: &ProposalContext<'_>,
        conversation: &[ChatMessage],
    ) -> ProposedAction;
}

/// Proposer backed by the remote completion service
pub struct RemoteProposer {
    client: ChatClient,
    options: CompletionOptions,
    config: AgentConfig,
}

impl RemoteProposer {
    pub fn new(client: ChatClient, model: impl Into<String>, config: AgentConfig) -> Self {
        let options = CompletionOptions::new(model, "proposal")
            .max_tokens(config.max_tokens)
            .temperature(config.temperature)
            .timeout(config.proposal_timeout);
        Self {
            client,
            options,
            config,
        }
    }

    /// Messages sent for one proposal
    pub fn build_messages(
        &self,
        context: &ProposalContext<'_>,
        conversation: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let recent_start = conversation
            .len()
            .saturating_sub(self.config.context_messages);

        let mut messages = Vec::with_capacity(conversation.len() - recent_start + 2);
        messages.push(ChatMessage::system(system_prompt(context)));
        messages.extend(conversation[recent_start..].iter().cloned());
        messages.push(ChatMessage::user(user_context(
            context,
            self.config.context_commands,
            self.config.output_excerpt_chars,
        )));
        messages
    }
}

#[async_trait]
impl CommandProposer for RemoteProposer {
    async fn propose(
        &self,
        context: &ProposalContext<'_>,
        conversation: &[ChatMessage],
    ) -> ProposedAction {
        let messages = self.build_messages(context, conversation);

        match self.client.complete(&messages, &self.options).await {
            Ok(reply) => {
                let action = parse_action(&reply);
                debug!(step = context.step, ?action, "proposal received");
                action
            }
            Err(e) => {
                warn!(step = context.step, error = %e, "proposal request failed");
                ProposedAction::Error {
                    reason: format!("Failed to generate command - {}", e),
                }
            }
        }
    }
}

/// Instruction describing the session and the expected reply format
pub fn system_prompt(context: &ProposalContext<'_>) -> String {
    let shell = context.session.kind;
    let listing = if matches!(shell, ShellKind::Cmd | ShellKind::PowerShell) {
        "dir, type, copy"
    } else {
        "ls, cat, cp"
    };

    format!(
        "You are an AI agent controlling a {shell} CLI session. Your task is to help the user complete: \"{task}\"\n\
         \n\
         Current context:\n\
         - CLI Type: {shell}\n\
         - Working Directory: {dir}\n\
         - Commands executed so far: {count}\n\
         - Last command: {last}\n\
         - Step: {step} of {max_steps}\n\
         \n\
         Break the task into individual {shell} commands and issue them one at a time. \
         You will see the output of each command before choosing the next one. \
         Useful commands include cd, mkdir, echo, pwd and {listing}.\n\
         \n\
         Respond with ONLY the next command to execute, or \"{complete}\" if finished, \
         or \"{error} description\" if something went wrong.",
        shell = shell.as_str(),
        task = context.task,
        dir = context.session.working_dir.display(),
        count = context.session.command_count,
        last = context.session.last_command.as_deref().unwrap_or("None"),
        step = context.step,
        max_steps = context.max_steps,
        listing = listing,
        complete = COMPLETE_SENTINEL,
        error = ERROR_SENTINEL,
    )
}

/// Per-step user message: task, shell, recent commands and output excerpt
pub fn user_context(
    context: &ProposalContext<'_>,
    max_commands: usize,
    max_output_chars: usize,
) -> String {
    let mut text = format!(
        "Task: {}\nCLI: {}\nWorking Directory: {}\n",
        context.task,
        context.session.kind.as_str(),
        context.session.working_dir.display()
    );

    if !context.history.is_empty() {
        let start = context.history.len().saturating_sub(max_commands);
        text.push_str(&format!(
            "Previous commands: {}\n",
            context.history[start..].join(", ")
        ));
    }
    if !context.last_output.is_empty() {
        text.push_str(&format!(
            "Last output: {}",
            truncate(context.last_output, max_output_chars)
        ));
    }
    text
}

/// Turn a model reply into an action
///
/// Surrounding code fences are removed, then the first non-empty line
/// decides: a `TASK_COMPLETE` or `ERROR:` prefix (any case) is a terminal
/// signal, anything else means the whole reply is the command.
pub fn parse_action(reply: &str) -> ProposedAction {
    let body = strip_code_fence(reply);
    let first_line = body.lines().map(str::trim).find(|l| !l.is_empty());

    let Some(first_line) = first_line else {
        return ProposedAction::Error {
            reason: "Empty command proposal".to_string(),
        };
    };

    if let Some(rest) = strip_prefix_ignore_case(first_line, COMPLETE_SENTINEL) {
        let mut summary = rest.trim_start_matches([':', '-', ' ']).trim().to_string();
        let tail = body.trim().splitn(2, '\n').nth(1).map(str::trim).unwrap_or("");
        if !tail.is_empty() {
            if !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(tail);
        }
        return ProposedAction::Complete { summary };
    }

    if let Some(rest) = strip_prefix_ignore_case(first_line, ERROR_SENTINEL) {
        return ProposedAction::Error {
            reason: rest.trim().to_string(),
        };
    }

    ProposedAction::Command(body.trim().to_string())
}

/// Remove a single surrounding ``` fence (with optional language tag)
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop the language tag line, if any
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().contains(' ') => rest.trim(),
        _ => inner.trim(),
    }
}
