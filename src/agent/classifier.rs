//! Intent Classifier - decides whether input is chat or a shell task
//!
//! Asks the model first. If the call fails for any reason, a keyword
//! heuristic decides instead.

use tracing::debug;

use crate::llm::client::truncate;
use crate::llm::{ChatClient, ChatMessage, CompletionOptions};
use crate::metrics::INTENT_DECISIONS;

/// Words that suggest the user wants something done
pub const TASK_KEYWORDS: &[&str] = &[
    "create", "make", "build", "generate", "write", "add", "new", "folder", "file", "directory",
    "script", "project", "list", "show", "display", "find", "search", "copy", "move", "delete",
    "remove", "rename", "install", "setup", "configure", "run", "execute",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Task,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Chat => "chat",
            Intent::Task => "task",
        }
    }
}

/// Which path produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Model,
    Heuristic,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Model => "model",
            IntentSource::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub source: IntentSource,
}

/// Classifier backed by the remote completion service
pub struct IntentClassifier {
    client: ChatClient,
    options: CompletionOptions,
}

impl IntentClassifier {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        let options = CompletionOptions::new(model, "intent")
            .max_tokens(10)
            .temperature(0.1)
            .timeout(std::time::Duration::from_secs(10));
        Self { client, options }
    }

    /// Classify `input`, falling back to [`keyword_intent`] on any failure
    pub async fn classify(&self, input: &str, conversation: &[ChatMessage]) -> Classification {
        let prompt = decision_prompt(input, conversation);

        let classification = match self
            .client
            .complete(&[ChatMessage::user(prompt)], &self.options)
            .await
        {
            Ok(reply) => Classification {
                intent: if reply.to_uppercase().contains("TASK") {
                    Intent::Task
                } else {
                    Intent::Chat
                },
                source: IntentSource::Model,
            },
            Err(e) => {
                debug!(error = %e, "intent request failed, using keywords");
                Classification {
                    intent: keyword_intent(input),
                    source: IntentSource::Heuristic,
                }
            }
        };

        INTENT_DECISIONS
            .with_label_values(&[classification.intent.as_str(), classification.source.as_str()])
            .inc();
        classification
    }
}

/// Keyword heuristic: any vocabulary word as a substring means `Task`
pub fn keyword_intent(input: &str) -> Intent {
    let lower = input.to_lowercase();
    if TASK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Intent::Task
    } else {
        Intent::Chat
    }
}

/// Binary instruction with examples and the last three messages
pub fn decision_prompt(input: &str, conversation: &[ChatMessage]) -> String {
    let mut context = format!("User input: {}\n", input);
    if !conversation.is_empty() {
        context.push_str("Recent conversation:\n");
        let start = conversation.len().saturating_sub(3);
        for message in &conversation[start..] {
            context.push_str(&format!(
                "- {}: {}\n",
                message.role,
                truncate(&message.content, 100)
            ));
        }
    }

    format!(
        "You are an assistant that can either chat or run shell tasks.\n\
         Decide whether the user wants to:\n\
         1. CHAT - have a normal conversation (questions, explanations, help)\n\
         2. TASK - execute a command or perform an action (create files, run commands)\n\
         \n\
         {context}\n\
         Examples:\n\
         - \"Hello, how are you?\" -> CHAT\n\
         - \"What is Python?\" -> CHAT\n\
         - \"Create a folder called test\" -> TASK\n\
         - \"List all files in this directory\" -> TASK\n\
         - \"Can you help me with coding?\" -> CHAT\n\
         - \"Make a Python script that prints hello\" -> TASK\n\
         \n\
         Respond with ONLY: CHAT or TASK",
        context = context
    )
}
