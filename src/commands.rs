//! Parsing of REPL input lines
//!
//! Recognised forms:
//! - `exit`, `quit`, `/exit`
//! - `/sessions`, `/close-agent`, `/new`, `/help`, `/metrics`
//! - `img: <prompt>`
//! - `agent: open <shell> [visible]`, `agent: close`, `agent: <command>`
//!
//! Anything else is free text for the intent classifier.

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Exit,
    Help,
    Sessions,
    CloseAll,
    NewConversation,
    Metrics,
    /// `img:` with the prompt (may be empty)
    Image(String),
    Agent(AgentCommand),
    /// Free text to classify
    Text(String),
}

/// The part after `agent:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Nothing after the prefix
    Usage,
    /// `open` with a shell name (unvalidated, may be missing)
    Open { shell: Option<String>, visible: bool },
    Close,
    /// Anything else is a shell command for the active session
    Exec(String),
}

/// Parse one line of user input
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    match trimmed.to_lowercase().as_str() {
        "exit" | "quit" | "/exit" | "/quit" => return Input::Exit,
        "/help" => return Input::Help,
        "/sessions" => return Input::Sessions,
        "/close-agent" => return Input::CloseAll,
        "/new" | "/clear" => return Input::NewConversation,
        "/metrics" => return Input::Metrics,
        _ => {}
    }

    if let Some(rest) = strip_prefix_ignore_case(trimmed, "img:") {
        return Input::Image(rest.trim().to_string());
    }
    if let Some(rest) = strip_prefix_ignore_case(trimmed, "agent:") {
        return Input::Agent(parse_agent_command(rest.trim()));
    }

    Input::Text(trimmed.to_string())
}

fn parse_agent_command(rest: &str) -> AgentCommand {
    let mut words = rest.split_whitespace();
    let Some(verb) = words.next() else {
        return AgentCommand::Usage;
    };

    match verb.to_lowercase().as_str() {
        "open" => {
            let shell = words.next().map(str::to_lowercase);
            let visible = words.any(|w| w.eq_ignore_ascii_case("visible"));
            AgentCommand::Open { shell, visible }
        }
        "close" if words.next().is_none() => AgentCommand::Close,
        _ => AgentCommand::Exec(rest.to_string()),
    }
}

/// ASCII case-insensitive `str::strip_prefix`
pub(crate) fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}
