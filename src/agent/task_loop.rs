//! Task Loop - drives a shell session toward a goal one command at a time
//!
//! Each step asks the proposer for the next action, runs commands in the
//! active session and feeds the output back into the run's context. The loop
//! stops when the model signals completion or an error, when a command cannot
//! be executed, or after `max_steps` commands.

use std::time::{Duration, Instant};

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::llm::client::truncate;
use crate::llm::ChatMessage;
use crate::metrics::{AGENT_STEPS, AGENT_TASKS};
use crate::registry::SessionRegistry;

use super::conversation::Conversation;
use super::proposer::{CommandProposer, ProposalContext, ProposedAction};

/// Output longer than this is shortened before it enters the run context
const CONTEXT_OUTPUT_CHARS: usize = 1000;

/// Configuration for the task loop and its proposals
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of commands executed per task
    pub max_steps: usize,
    /// Timeout for each proposal request
    pub proposal_timeout: Duration,
    /// Token limit for proposals
    pub max_tokens: u32,
    /// Sampling temperature for proposals
    pub temperature: f32,
    /// How many previous commands the proposer sees
    pub context_commands: usize,
    /// How much of the last output the proposer sees, in characters
    pub output_excerpt_chars: usize,
    /// How many conversation messages accompany each proposal
    pub context_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            proposal_timeout: Duration::from_secs(30),
            max_tokens: 200,
            temperature: 0.3,
            context_commands: 3,
            output_excerpt_chars: 200,
            context_messages: 4,
        }
    }
}

/// How a task run ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The model signalled completion
    Completed { summary: String },
    /// The model signalled an error, or a command could not be executed
    Failed { reason: String },
    /// `max_steps` commands ran without a terminal signal
    StepExhausted { max_steps: usize },
}

impl TaskOutcome {
    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed { .. } => "completed",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::StepExhausted { .. } => "step_exhausted",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

/// Record of a single command execution
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Step the command was proposed in
    pub step: usize,
    /// Command as written to the shell
    pub command: String,
    /// Captured output or status line
    pub output: String,
    /// Whether the output was fully captured
    pub framed: bool,
    /// Exit status, when the shell reported one
    pub exit_code: Option<i32>,
    /// Wall time from write to capture
    pub duration: Duration,
}

/// Result of a task run
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub outcome: TaskOutcome,
    /// Proposals requested, including the terminal one
    pub steps: usize,
    /// Every command executed, in order
    pub records: Vec<ExecutionRecord>,
    /// Correlates log lines and spans for this run
    pub trace_id: String,
}

/// Progress notifications from a running task
#[derive(Debug, Clone)]
pub enum TaskEvent<'a> {
    Started {
        task: &'a str,
        trace_id: &'a str,
        session: &'a str,
    },
    Thinking {
        step: usize,
        max_steps: usize,
    },
    Executing {
        step: usize,
        command: &'a str,
    },
    Executed {
        step: usize,
        record: &'a ExecutionRecord,
    },
    Finished {
        outcome: &'a TaskOutcome,
    },
}

/// Receives progress events; implemented by the terminal front-end
pub trait TaskObserver: Send + Sync {
    fn on_event(&self, event: &TaskEvent<'_>);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {
    fn on_event(&self, _event: &TaskEvent<'_>) {}
}

/// The bounded propose/execute loop
pub struct TaskLoop<P> {
    proposer: P,
    config: AgentConfig,
}

impl<P: CommandProposer> TaskLoop<P> {
    pub fn new(proposer: P, config: AgentConfig) -> Self {
        Self { proposer, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn proposer(&self) -> &P {
        &self.proposer
    }

    /// Run `task` in the registry's active session
    ///
    /// # Arguments
    /// * `task` - What the user wants done
    /// * `registry` - Must have an active session
    /// * `conversation` - Prior messages; copied into the run's own context
    /// * `observer` - Receives progress events
    ///
    /// # Returns
    /// A report for every ending, including failures signalled by the model.
    /// Only a missing active session is an `Err`.
    pub async fn run(
        &self,
        task: &str,
        registry: &mut SessionRegistry,
        conversation: &Conversation,
        observer: &dyn TaskObserver,
    ) -> Result<TaskReport> {
        let session = registry.get_active_mut().ok_or(AgentError::NoActiveSession)?;
        let trace_id = Uuid::now_v7().to_string();
        let max_steps = self.config.max_steps;

        let root_span = info_span!(
            "agent_task",
            trace_id = %trace_id,
            task = %task,
            shell = session.kind().as_str(),
            otel.name = "agent_task"
        );

        async {
            info!(trace_id = %trace_id, session = %session.id(), "starting agent task");
            observer.on_event(&TaskEvent::Started {
                task,
                trace_id: &trace_id,
                session: session.id().as_str(),
            });

            let mut context = conversation.clone();
            let mut records: Vec<ExecutionRecord> = Vec::new();
            let mut step = 1;

            let outcome = loop {
                if step > max_steps {
                    warn!(trace_id = %trace_id, max_steps, "step limit reached");
                    break TaskOutcome::StepExhausted { max_steps };
                }

                observer.on_event(&TaskEvent::Thinking { step, max_steps });

                let proposal_context = ProposalContext {
                    task,
                    session: session.status(),
                    history: session.history(),
                    last_output: session.last_output(),
                    step,
                    max_steps,
                };
                let llm_span = info_span!(
                    "llm_call",
                    trace_id = %trace_id,
                    step,
                    otel.name = "llm_call"
                );
                let action = self
                    .proposer
                    .propose(&proposal_context, context.messages())
                    .instrument(llm_span)
                    .await;

                let command = match action {
                    ProposedAction::Complete { summary } => {
                        break TaskOutcome::Completed { summary };
                    }
                    ProposedAction::Error { reason } => {
                        warn!(trace_id = %trace_id, step, reason = %reason, "agent reported an error");
                        break TaskOutcome::Failed { reason };
                    }
                    ProposedAction::Command(command) => command,
                };

                observer.on_event(&TaskEvent::Executing {
                    step,
                    command: &command,
                });
                info!(trace_id = %trace_id, step, command = %command, "executing command");

                let start = Instant::now();
                let output = match session.execute(&command).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(trace_id = %trace_id, step, error = %e, "command could not be executed");
                        break TaskOutcome::Failed {
                            reason: e.to_string(),
                        };
                    }
                };

                let record = ExecutionRecord {
                    step,
                    command: command.clone(),
                    output: output.output,
                    framed: output.framed,
                    exit_code: output.exit_code,
                    duration: start.elapsed(),
                };
                observer.on_event(&TaskEvent::Executed {
                    step,
                    record: &record,
                });

                context.push(ChatMessage::assistant(command));
                context.push(ChatMessage::user(format!(
                    "Command output:\n{}",
                    truncate(&record.output, CONTEXT_OUTPUT_CHARS)
                )));
                records.push(record);

                step += 1;
            };

            // A terminal signal at step n counts as a step; exhaustion stops at max_steps
            let steps = step.min(max_steps);
            AGENT_TASKS.with_label_values(&[outcome.label()]).inc();
            AGENT_STEPS.observe(steps as f64);
            info!(
                trace_id = %trace_id,
                outcome = outcome.label(),
                steps,
                commands = records.len(),
                "agent task finished"
            );
            observer.on_event(&TaskEvent::Finished { outcome: &outcome });

            Ok(TaskReport {
                outcome,
                steps,
                records,
                trace_id: trace_id.clone(),
            })
        }
        .instrument(root_span)
        .await
    }
}
