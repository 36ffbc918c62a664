//! Integration tests for the agent system
//!
//! The task loop is driven by a scripted proposer so no model is needed.
//! Tests that open a real shell use `sh` and only run on Unix.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use shellpilot::agent::{
    keyword_intent, Conversation, Intent, IntentClassifier, IntentSource, ProposalContext,
};
use shellpilot::llm::{ChatClient, ChatMessage};
use shellpilot::{
    AgentConfig, AgentError, CommandProposer, NoopObserver, ProposedAction, SessionRegistry,
    TaskEvent, TaskLoop, TaskObserver, TaskOutcome,
};

/// Nothing listens on the discard port, so every request fails fast
const UNREACHABLE: &str = "http://127.0.0.1:9";

/// Replays a fixed list of actions, then repeats the fallback forever
struct ScriptedProposer {
    script: Mutex<VecDeque<ProposedAction>>,
    fallback: ProposedAction,
    seen_steps: Mutex<Vec<usize>>,
}

impl ScriptedProposer {
    fn new(script: Vec<ProposedAction>, fallback: ProposedAction) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            seen_steps: Mutex::new(Vec::new()),
        }
    }

    fn steps(&self) -> Vec<usize> {
        self.seen_steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandProposer for ScriptedProposer {
    async fn propose(
        &self,
        context: &ProposalContext<'_>,
        _conversation: &[ChatMessage],
    ) -> ProposedAction {
        self.seen_steps.lock().unwrap().push(context.step);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Counts events by kind
#[derive(Default)]
struct CountingObserver {
    events: Mutex<Vec<&'static str>>,
}

impl TaskObserver for CountingObserver {
    fn on_event(&self, event: &TaskEvent<'_>) {
        let name = match event {
            TaskEvent::Started { .. } => "started",
            TaskEvent::Thinking { .. } => "thinking",
            TaskEvent::Executing { .. } => "executing",
            TaskEvent::Executed { .. } => "executed",
            TaskEvent::Finished { .. } => "finished",
        };
        self.events.lock().unwrap().push(name);
    }
}

fn complete() -> ProposedAction {
    ProposedAction::Complete {
        summary: "done".to_string(),
    }
}

fn command(c: &str) -> ProposedAction {
    ProposedAction::Command(c.to_string())
}

/// A task with no active session is rejected before any proposal
#[tokio::test]
async fn test_run_without_session_fails() {
    let proposer = ScriptedProposer::new(vec![], complete());
    let task_loop = TaskLoop::new(proposer, AgentConfig::default());
    let mut registry = SessionRegistry::default();

    let err = task_loop
        .run("anything", &mut registry, &Conversation::new(), &NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::NoActiveSession));
    assert!(task_loop.proposer().steps().is_empty());
}

/// Keyword fallback is deterministic
#[test]
fn test_keyword_fallback_is_deterministic() {
    for _ in 0..3 {
        assert_eq!(keyword_intent("create a folder called demo"), Intent::Task);
        assert_eq!(keyword_intent("what is the capital of france?"), Intent::Chat);
    }
}

/// An unreachable classifier service falls back to keywords (task)
#[tokio::test]
async fn test_classifier_offline_task() {
    let classifier = IntentClassifier::new(ChatClient::new(UNREACHABLE, None), "openai-large");
    let c = classifier.classify("create a folder called demo", &[]).await;
    assert_eq!(c.intent, Intent::Task);
    assert_eq!(c.source, IntentSource::Heuristic);
}

/// An unreachable classifier service falls back to keywords (chat)
#[tokio::test]
async fn test_classifier_offline_chat() {
    let classifier = IntentClassifier::new(ChatClient::new(UNREACHABLE, None), "openai-large");
    let c = classifier
        .classify("what is the capital of france?", &[])
        .await;
    assert_eq!(c.intent, Intent::Chat);
    assert_eq!(c.source, IntentSource::Heuristic);
}

#[cfg(unix)]
mod with_shell {
    use super::*;
    use shellpilot::{LaunchMode, ShellKind};

    async fn registry_with_sh() -> SessionRegistry {
        let mut registry = SessionRegistry::default();
        registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .expect("sh should start");
        registry
    }

    /// Complete on the first proposal: no commands run
    #[tokio::test]
    async fn test_immediate_completion() {
        let mut registry = registry_with_sh().await;
        let task_loop = TaskLoop::new(ScriptedProposer::new(vec![complete()], complete()), AgentConfig::default());
        let observer = CountingObserver::default();

        let report = task_loop
            .run("nothing to do", &mut registry, &Conversation::new(), &observer)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            TaskOutcome::Completed {
                summary: "done".to_string()
            }
        );
        assert_eq!(report.steps, 1);
        assert!(report.records.is_empty());
        assert_eq!(registry.get_active().unwrap().history().len(), 0);
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["started", "thinking", "finished"]
        );
        registry.close_all().await;
    }

    /// An error proposal ends the run without executing anything
    #[tokio::test]
    async fn test_error_terminates() {
        let mut registry = registry_with_sh().await;
        let proposer = ScriptedProposer::new(
            vec![ProposedAction::Error {
                reason: "cannot do that".to_string(),
            }],
            command("echo never"),
        );
        let task_loop = TaskLoop::new(proposer, AgentConfig::default());

        let report = task_loop
            .run("impossible", &mut registry, &Conversation::new(), &NoopObserver)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            TaskOutcome::Failed {
                reason: "cannot do that".to_string()
            }
        );
        assert!(report.records.is_empty());
        assert_eq!(task_loop.proposer().steps(), vec![1]);
        registry.close_all().await;
    }

    /// Commands run in order and their output is recorded
    #[tokio::test]
    async fn test_commands_then_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::default();
        registry
            .create(ShellKind::Sh, Some(dir.path()), LaunchMode::Background)
            .await
            .unwrap();

        let proposer = ScriptedProposer::new(
            vec![command("mkdir demo"), command("ls"), complete()],
            complete(),
        );
        let task_loop = TaskLoop::new(proposer, AgentConfig::default());

        let report = task_loop
            .run("make a demo folder", &mut registry, &Conversation::new(), &NoopObserver)
            .await
            .unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.steps, 3);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].command, "ls");
        assert!(report.records[1].framed);
        assert_eq!(report.records[1].output, "demo");
        assert!(dir.path().join("demo").is_dir());
        assert_eq!(task_loop.proposer().steps(), vec![1, 2, 3]);

        let status = registry.get_active().unwrap().status();
        assert_eq!(status.command_count, 2);
        assert_eq!(status.last_command.as_deref(), Some("ls"));
        registry.close_all().await;
    }

    /// Without a terminal signal the loop stops after exactly max_steps commands
    #[tokio::test]
    async fn test_step_exhaustion() {
        let mut registry = registry_with_sh().await;
        let proposer = ScriptedProposer::new(vec![], command("echo again"));
        let task_loop = TaskLoop::new(proposer, AgentConfig::default());

        let report = task_loop
            .run("loop forever", &mut registry, &Conversation::new(), &NoopObserver)
            .await
            .unwrap();

        assert_eq!(report.outcome, TaskOutcome::StepExhausted { max_steps: 10 });
        assert_eq!(report.records.len(), 10);
        assert_eq!(report.steps, 10);
        assert_eq!(
            task_loop.proposer().steps(),
            (1..=10).collect::<Vec<usize>>()
        );
        assert_eq!(registry.get_active().unwrap().history().len(), 10);
        registry.close_all().await;
    }

    /// A shell that exits mid-task fails the next command
    #[tokio::test]
    async fn test_dead_session_fails_task() {
        let mut registry = registry_with_sh().await;
        let proposer = ScriptedProposer::new(
            vec![command("exit 0"), command("echo after")],
            complete(),
        );
        let config = AgentConfig {
            max_steps: 5,
            ..AgentConfig::default()
        };
        let task_loop = TaskLoop::new(proposer, config);

        let report = task_loop
            .run("leave", &mut registry, &Conversation::new(), &NoopObserver)
            .await
            .unwrap();

        assert!(matches!(report.outcome, TaskOutcome::Failed { .. }));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].output, "Process ended");
        registry.close_all().await;
    }
}
