//! Assistant - routes each input line to chat, images, sessions or tasks
//!
//! Owns every piece of mutable state: the session registry, the
//! conversation, and the clients. The terminal front-end only renders the
//! returned [`Reply`].

use std::path::PathBuf;

use tracing::{info, warn};

use crate::agent::{
    Classification, CommandProposer, Conversation, Intent, IntentClassifier, RemoteProposer,
    TaskLoop, TaskObserver, TaskOutcome, TaskReport,
};
use crate::commands::{parse_input, AgentCommand, Input};
use crate::config::Config;
use crate::error::AgentError;
use crate::llm::client::truncate;
use crate::llm::{ChatClient, ChatMessage, CompletionOptions, ImageClient, ImageOptions};
use crate::metrics::encode_metrics;
use crate::registry::SessionRegistry;
use crate::shell::{CommandOutput, LaunchMode, SessionId, SessionStatus, ShellKind};

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant running in a terminal. \
Answer clearly and concisely, using markdown code blocks for code.\n\n\
You are in Agent Mode. You can both chat and execute tasks in a shell. Be helpful and friendly!";

/// What the front-end should show for one input line
#[derive(Debug)]
pub enum Reply {
    /// Blank input
    Nothing,
    Exit,
    Help,
    Metrics(String),
    Sessions(SessionsOverview),
    /// `/close-agent`; how many sessions were closed
    SessionsClosed(usize),
    ConversationCleared,
    SessionOpened(SessionStatus),
    SessionClosed,
    NoSessionToClose,
    /// `agent: <command>` ran in the active session
    CommandResult(CommandOutput),
    Image(PathBuf),
    Chat(ChatReply),
    Task(TaskReply),
    Error(String),
}

/// Snapshot for `/sessions`
#[derive(Debug, Clone)]
pub struct SessionsOverview {
    pub sessions: Vec<SessionStatus>,
    pub active: Option<SessionId>,
    /// Shells that could be opened; only checked when no session exists
    pub available: Vec<ShellKind>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    /// The service was unreachable and `text` is a canned apology
    pub offline: bool,
    pub classification: Option<Classification>,
}

#[derive(Debug, Clone)]
pub struct TaskReply {
    pub report: TaskReport,
    /// Session opened on demand for this task
    pub opened: Option<SessionStatus>,
    pub classification: Option<Classification>,
}

/// The interactive assistant
pub struct Assistant<P = RemoteProposer> {
    config: Config,
    chat: ChatClient,
    images: ImageClient,
    classifier: IntentClassifier,
    task_loop: TaskLoop<P>,
    registry: SessionRegistry,
    conversation: Conversation,
}

impl Assistant<RemoteProposer> {
    /// Build an assistant that proposes commands with the remote model
    pub fn new(config: Config) -> Self {
        let chat = ChatClient::new(config.text_api_url.clone(), config.api_token.clone());
        let proposer = RemoteProposer::new(
            chat.clone(),
            config.agent_model.clone(),
            config.agent.clone(),
        );
        Self::with_proposer(config, proposer)
    }
}

impl<P: CommandProposer> Assistant<P> {
    /// Build an assistant around any proposer
    pub fn with_proposer(config: Config, proposer: P) -> Self {
        let chat = ChatClient::new(config.text_api_url.clone(), config.api_token.clone());
        let images = ImageClient::new(config.image_api_url.clone(), config.api_token.clone());
        let classifier = IntentClassifier::new(chat.clone(), config.agent_model.clone());
        let task_loop = TaskLoop::new(proposer, config.agent.clone());
        let registry = SessionRegistry::new(config.shell.clone());

        Self {
            config,
            chat,
            images,
            classifier,
            task_loop,
            registry,
            conversation: Conversation::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Handle one line of user input
    pub async fn handle(&mut self, line: &str, observer: &dyn TaskObserver) -> Reply {
        match parse_input(line) {
            Input::Empty => Reply::Nothing,
            Input::Exit => Reply::Exit,
            Input::Help => Reply::Help,
            Input::Metrics => Reply::Metrics(encode_metrics()),
            Input::Sessions => Reply::Sessions(self.sessions_overview()),
            Input::CloseAll => Reply::SessionsClosed(self.registry.close_all().await),
            Input::NewConversation => {
                self.conversation.clear();
                Reply::ConversationCleared
            }
            Input::Image(prompt) => self.generate_image(&prompt).await,
            Input::Agent(command) => self.handle_agent(command).await,
            Input::Text(text) => self.handle_text(&text, observer).await,
        }
    }

    async fn handle_agent(&mut self, command: AgentCommand) -> Reply {
        match command {
            AgentCommand::Usage => Reply::Help,
            AgentCommand::Open { shell: None, .. } => Reply::Error(
                "Usage: agent: open <powershell|cmd|bash|sh> [visible]".to_string(),
            ),
            AgentCommand::Open {
                shell: Some(shell),
                visible,
            } => self.open_session(&shell, visible).await,
            AgentCommand::Close => {
                if self.registry.close_active().await {
                    Reply::SessionClosed
                } else {
                    Reply::NoSessionToClose
                }
            }
            AgentCommand::Exec(command) => match self.exec_command(&command).await {
                Ok(output) => Reply::CommandResult(output),
                Err(e) => Reply::Error(e.to_string()),
            },
        }
    }

    /// Run `command` as written in the active session, without the model
    pub async fn exec_command(&mut self, command: &str) -> Result<CommandOutput, AgentError> {
        let session = self
            .registry
            .get_active_mut()
            .ok_or(AgentError::NoActiveSession)?;
        info!(session = %session.id(), command = %command, "executing user command");
        session.execute(command).await
    }

    /// Parse a shell name and open it as the active session
    pub async fn open_session(&mut self, shell: &str, visible: bool) -> Reply {
        let kind = match shell.parse::<ShellKind>() {
            Ok(kind) => kind,
            Err(e) => return Reply::Error(e.to_string()),
        };
        let mode = if visible {
            LaunchMode::Visible
        } else {
            LaunchMode::Background
        };

        let working_dir = self.config.working_dir.clone();
        match self
            .registry
            .try_create(kind, working_dir.as_deref(), mode)
            .await
        {
            Ok(id) => match self.registry.get(&id) {
                Some(session) => Reply::SessionOpened(session.status()),
                None => Reply::Error(AgentError::NoActiveSession.to_string()),
            },
            Err(e) => Reply::Error(e.to_string()),
        }
    }

    /// Run a task in the active session and remember it in the conversation
    ///
    /// Dropping the future mid-run (Ctrl-C in the REPL) leaves the session
    /// open but records nothing in the conversation.
    pub async fn run_task(
        &mut self,
        task: &str,
        observer: &dyn TaskObserver,
    ) -> Result<TaskReport, AgentError> {
        let report = self
            .task_loop
            .run(task, &mut self.registry, &self.conversation, observer)
            .await?;

        self.conversation
            .push_exchange(task, outcome_summary(&report.outcome));
        Ok(report)
    }

    async fn handle_text(&mut self, text: &str, observer: &dyn TaskObserver) -> Reply {
        let classification = self
            .classifier
            .classify(text, self.conversation.messages())
            .await;
        info!(
            intent = classification.intent.as_str(),
            source = classification.source.as_str(),
            "input classified"
        );

        if classification.intent == Intent::Chat {
            return Reply::Chat(self.chat(text, Some(classification)).await);
        }

        let opened = if self.registry.get_active().is_none() {
            match self.auto_provision().await {
                Some(status) => Some(status),
                None => return Reply::Chat(self.chat(text, Some(classification)).await),
            }
        } else {
            None
        };

        match self.run_task(text, observer).await {
            Ok(report) => Reply::Task(TaskReply {
                report,
                opened,
                classification: Some(classification),
            }),
            Err(e) => Reply::Error(e.to_string()),
        }
    }

    /// Open the preferred shell for this host in the background
    async fn auto_provision(&mut self) -> Option<SessionStatus> {
        let Some(kind) = ShellKind::preferred() else {
            warn!("no usable shell found for task");
            return None;
        };
        let working_dir = self.config.working_dir.clone();
        let id = self
            .registry
            .create(kind, working_dir.as_deref(), LaunchMode::Background)
            .await?;
        info!(session = %id, "opened session for task");
        self.registry.get(&id).map(|s| s.status())
    }

    /// Plain chat reply with conversation memory
    pub async fn chat(
        &mut self,
        input: &str,
        classification: Option<Classification>,
    ) -> ChatReply {
        let mut messages = Vec::with_capacity(self.conversation.len() + 2);
        messages.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));
        messages.extend(self.conversation.messages().iter().cloned());
        messages.push(ChatMessage::user(input));

        let options = CompletionOptions::new(self.config.chat_model.clone(), "chat");
        let (text, offline) = match self.chat.complete(&messages, &options).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                (offline_reply(input), true)
            }
        };

        self.conversation.push_exchange(input, text.clone());
        ChatReply {
            text,
            offline,
            classification,
        }
    }

    async fn generate_image(&mut self, prompt: &str) -> Reply {
        if prompt.is_empty() {
            return Reply::Error("Please provide a prompt after 'img:'".to_string());
        }
        match self
            .images
            .generate(
                prompt,
                &self.config.image_model,
                &ImageOptions::default(),
                &self.config.image_dir,
            )
            .await
        {
            Ok(path) => Reply::Image(path),
            Err(e) => Reply::Error(format!("Image generation failed: {}", e)),
        }
    }

    pub fn sessions_overview(&self) -> SessionsOverview {
        let sessions = self.registry.list();
        let available = if sessions.is_empty() {
            ShellKind::detect_available()
        } else {
            Vec::new()
        };
        SessionsOverview {
            sessions,
            active: self.registry.active_id().cloned(),
            available,
        }
    }

    /// Close every session; call before exiting
    pub async fn shutdown(&mut self) -> usize {
        self.registry.close_all().await
    }
}

/// One-line description of a task outcome for the conversation
pub fn outcome_summary(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Completed { summary } if summary.is_empty() => {
            "Task completed.".to_string()
        }
        TaskOutcome::Completed { summary } => format!("Task completed: {}", summary),
        TaskOutcome::Failed { reason } => format!("Task failed: {}", reason),
        TaskOutcome::StepExhausted { max_steps } => {
            format!("Task stopped after {} steps without finishing.", max_steps)
        }
    }
}

fn offline_reply(input: &str) -> String {
    format!(
        "I understand you're asking about '{}'. However, I'm currently unable to connect \
         to the AI service. Please try again later.",
        truncate(input, 50)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::NoopObserver;

    fn offline_config() -> Config {
        Config {
            text_api_url: "http://127.0.0.1:9".to_string(),
            image_api_url: "http://127.0.0.1:9".to_string(),
            api_token: None,
            ..Config::default()
        }
    }

    #[test]
    fn test_outcome_summary() {
        assert_eq!(
            outcome_summary(&TaskOutcome::Completed {
                summary: String::new()
            }),
            "Task completed."
        );
        assert_eq!(
            outcome_summary(&TaskOutcome::StepExhausted { max_steps: 10 }),
            "Task stopped after 10 steps without finishing."
        );
    }

    #[test]
    fn test_offline_reply_truncates_input() {
        let reply = offline_reply(&"q".repeat(80));
        assert!(reply.contains(&format!("'{}...'", "q".repeat(50))));
    }

    #[tokio::test]
    async fn test_chat_falls_back_when_offline() {
        let mut assistant = Assistant::new(offline_config());
        let reply = assistant.chat("hello", None).await;
        assert!(reply.offline);
        assert!(reply.text.contains("unable to connect"));
        assert_eq!(assistant.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_builtin_commands() {
        let mut assistant = Assistant::new(offline_config());
        assert!(matches!(assistant.handle("", &NoopObserver).await, Reply::Nothing));
        assert!(matches!(assistant.handle("exit", &NoopObserver).await, Reply::Exit));
        assert!(matches!(
            assistant.handle("agent: close", &NoopObserver).await,
            Reply::NoSessionToClose
        ));
        assert!(matches!(
            assistant.handle("agent: open fish", &NoopObserver).await,
            Reply::Error(ref msg) if msg.contains("Unsupported shell kind")
        ));
        assert!(matches!(
            assistant.handle("img:", &NoopObserver).await,
            Reply::Error(_)
        ));
        assert!(matches!(
            assistant.handle("agent: ls", &NoopObserver).await,
            Reply::Error(ref msg) if msg.contains("No active agent session")
        ));
        assert!(assistant.registry().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_command_runs_literally() {
        let mut assistant = Assistant::new(offline_config());
        assert!(matches!(
            assistant.handle("agent: open sh", &NoopObserver).await,
            Reply::SessionOpened(_)
        ));

        // no model is reachable, so this only works if the text goes straight to the shell
        match assistant.handle("agent: echo hi", &NoopObserver).await {
            Reply::CommandResult(output) => {
                assert_eq!(output.command, "echo hi");
                assert_eq!(output.output, "hi");
                assert!(output.framed);
                assert_eq!(output.exit_code, Some(0));
            }
            other => panic!("expected command result, got {:?}", other),
        }

        let session = assistant.registry().get_active().unwrap();
        assert_eq!(session.history().to_vec(), vec!["echo hi".to_string()]);
        assert_eq!(session.last_output(), "hi");
        assert_eq!(assistant.conversation().len(), 0);

        assistant.shutdown().await;
    }

    /// Never answers, so a run only ends when its future is dropped
    struct StalledProposer;

    #[async_trait::async_trait]
    impl CommandProposer for StalledProposer {
        async fn propose(
            &self,
            _context: &crate::agent::ProposalContext<'_>,
            _conversation: &[ChatMessage],
        ) -> crate::agent::ProposedAction {
            std::future::pending().await
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_task_leaves_session_usable() {
        let mut assistant = Assistant::with_proposer(offline_config(), StalledProposer);
        assistant.open_session("sh", false).await;

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            assistant.run_task("never finishes", &NoopObserver),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(assistant.conversation().len(), 0);

        let output = assistant.exec_command("echo still here").await.unwrap();
        assert_eq!(output.output, "still here");

        assistant.shutdown().await;
    }
}
