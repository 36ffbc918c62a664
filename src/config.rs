//! Runtime configuration
//!
//! Values come from command-line flags, then environment variables, then the
//! defaults below. The task loop and shell layer carry their own tuning
//! structs ([`AgentConfig`](crate::agent::AgentConfig) and
//! [`ShellConfig`](crate::shell::ShellConfig)).

use std::path::PathBuf;

use crate::agent::AgentConfig;
use crate::shell::ShellConfig;

/// Default text completion service
pub const DEFAULT_TEXT_API_URL: &str = "https://text.pollinations.ai";

/// Default image generation service
pub const DEFAULT_IMAGE_API_URL: &str = "https://image.pollinations.ai/prompt";

/// Model used for chat replies
pub const DEFAULT_CHAT_MODEL: &str = "openai";

/// Model used to propose shell commands and classify intent
pub const DEFAULT_AGENT_MODEL: &str = "openai-large";

/// Model used for images
pub const DEFAULT_IMAGE_MODEL: &str = "flux";

/// Directory generated images are written to
pub const DEFAULT_IMAGE_DIR: &str = "generated_images";

/// Credential embedded at build time, if any
pub const EMBEDDED_API_TOKEN: Option<&str> = option_env!("SHELLPILOT_DEFAULT_TOKEN");

/// Top-level configuration for the assistant
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the text completion API
    pub text_api_url: String,
    /// Base URL of the image API
    pub image_api_url: String,
    /// Bearer credential for both APIs
    pub api_token: Option<String>,
    /// Model for chat replies
    pub chat_model: String,
    /// Model for command proposals and intent classification
    pub agent_model: String,
    /// Model for image generation
    pub image_model: String,
    /// Where `img:` results are saved
    pub image_dir: PathBuf,
    /// OTLP collector endpoint; console logging only when unset
    pub otlp_endpoint: Option<String>,
    /// Working directory for new shell sessions (process cwd when unset)
    pub working_dir: Option<PathBuf>,
    /// Task loop tuning
    pub agent: AgentConfig,
    /// Shell session tuning
    pub shell: ShellConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_api_url: DEFAULT_TEXT_API_URL.to_string(),
            image_api_url: DEFAULT_IMAGE_API_URL.to_string(),
            api_token: EMBEDDED_API_TOKEN.map(str::to_string),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            agent_model: DEFAULT_AGENT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            otlp_endpoint: None,
            working_dir: None,
            agent: AgentConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TEXT_API_URL") {
            self.text_api_url = v;
        }
        if let Some(v) = get("IMAGE_API_URL") {
            self.image_api_url = v;
        }
        if let Some(v) = get("API_TOKEN") {
            self.api_token = Some(v);
        }
        if let Some(v) = get("TEXT_MODEL") {
            self.chat_model = v;
        }
        if let Some(v) = get("AGENT_MODEL") {
            self.agent_model = v;
        }
        if let Some(v) = get("IMAGE_MODEL") {
            self.image_model = v;
        }
        if let Some(v) = get("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.otlp_endpoint = Some(v);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chat_model, "openai");
        assert_eq!(config.agent_model, "openai-large");
        assert_eq!(config.image_model, "flux");
        assert_eq!(config.agent.max_steps, 10);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("TEXT_API_URL", "http://localhost:9000"),
            ("AGENT_MODEL", "mistral"),
            ("API_TOKEN", "secret"),
            ("IMAGE_MODEL", "   "),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.text_api_url, "http://localhost:9000");
        assert_eq!(config.agent_model, "mistral");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        // blank values keep the default
        assert_eq!(config.image_model, "flux");
    }
}
