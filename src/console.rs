//! Terminal rendering for the REPL

use std::borrow::Cow::{self, Borrowed, Owned};

use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use shellpilot::agent::{Intent, IntentSource};
use shellpilot::assistant::{ChatReply, SessionsOverview, TaskReply};
use shellpilot::shell::CommandOutput;
use shellpilot::{Reply, TaskEvent, TaskObserver, TaskOutcome};

const COMMANDS: &[&str] = &[
    "/sessions",
    "/close-agent",
    "/new",
    "/help",
    "/metrics",
    "agent: open ",
    "agent: close",
    "img: ",
    "exit",
];

/// Completion, hints and highlighting for the input line
#[derive(Clone, Default)]
pub struct CliHelper;

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if line.is_empty() {
            return Ok((0, vec![]));
        }

        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else if line.to_lowercase().starts_with("agent:") {
            Owned(line.bright_yellow().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].bright_black().to_string())
    }
}

impl Validator for CliHelper {}

/// Prints task progress as it happens
pub struct ConsoleObserver;

impl TaskObserver for ConsoleObserver {
    fn on_event(&self, event: &TaskEvent<'_>) {
        match event {
            TaskEvent::Started {
                task,
                trace_id,
                session,
            } => {
                println!("{} {}", "🎯 Task:".bold().cyan(), task);
                println!(
                    "{}",
                    format!("   session {}  trace {}", session, trace_id).bright_black()
                );
            }
            TaskEvent::Thinking { step, max_steps } => {
                println!(
                    "{}",
                    format!("🤖 Thinking... (step {}/{})", step, max_steps).green()
                );
            }
            TaskEvent::Executing { step, command } => {
                println!("{} {}", format!("⚡ Step {}:", step).yellow().bold(), command);
            }
            TaskEvent::Executed { record, .. } => {
                println!("┌─────────────────────────────────────────");
                for line in record.output.lines() {
                    println!("│ {}", line);
                }
                let mut footer = format!("└─ {:.2}s", record.duration.as_secs_f64());
                if let Some(code) = record.exit_code {
                    footer.push_str(&format!(", exit {}", code));
                }
                if !record.framed {
                    footer.push_str(", output may be incomplete");
                }
                println!("{}", footer.bright_black());
            }
            TaskEvent::Finished { .. } => {}
        }
    }
}

pub fn print_banner() {
    println!("{}", "=== shellpilot ===".bright_magenta().bold());
    println!(
        "{}",
        "Chat, or ask for something to be done. '/help' lists commands, 'exit' quits."
            .bright_black()
    );
    println!();
}

pub fn print_help() {
    println!("{}", "Commands".bold());
    let rows = [
        ("agent: open <shell> [visible]", "open powershell, cmd, bash or sh"),
        ("agent: close", "close the active session"),
        ("agent: <command>", "run a command as written in the active session"),
        ("img: <prompt>", "generate an image"),
        ("/sessions", "list sessions and available shells"),
        ("/close-agent", "close every session"),
        ("/new", "start a new conversation"),
        ("/metrics", "show Prometheus metrics"),
        ("exit, quit", "leave"),
    ];
    for (command, description) in rows {
        println!("  {:<32} {}", command.cyan(), description);
    }
    println!();
    println!(
        "{}",
        "Anything else is answered as chat, or run as a task if it looks like one."
            .bright_black()
    );
}

/// Print a reply. Returns `false` when the REPL should exit.
pub fn render(reply: &Reply) -> bool {
    match reply {
        Reply::Nothing => {}
        Reply::Exit => {
            println!("{}", "Goodbye!".bright_green());
            return false;
        }
        Reply::Help => print_help(),
        Reply::Metrics(text) => print!("{}", text),
        Reply::Sessions(overview) => render_sessions(overview),
        Reply::SessionsClosed(0) => println!("{}", "No sessions to close.".yellow()),
        Reply::SessionsClosed(count) => {
            println!("{}", format!("Closed {} session(s).", count).green())
        }
        Reply::ConversationCleared => println!("{}", "Started a new conversation.".green()),
        Reply::SessionOpened(status) => {
            println!(
                "{} {} ({}, {})",
                "✅ Opened".green().bold(),
                status.id,
                status.kind.display_name(),
                status.mode.as_str()
            );
            println!("{}", format!("   {}", status.working_dir.display()).bright_black());
        }
        Reply::SessionClosed => println!("{}", "Session closed.".green()),
        Reply::NoSessionToClose => println!("{}", "No active session.".yellow()),
        Reply::CommandResult(output) => render_command(output),
        Reply::Image(path) => {
            println!("{} {}", "🖼  Saved".green().bold(), path.display());
        }
        Reply::Chat(chat) => render_chat(chat),
        Reply::Task(task) => render_task(task),
        Reply::Error(message) => println!("{} {}", "❌".red(), message.red()),
    }
    true
}

fn render_decision(intent: Intent, source: IntentSource) {
    let label = match (intent, source) {
        (Intent::Task, IntentSource::Model) => "→ task",
        (Intent::Task, IntentSource::Heuristic) => "→ task (offline guess)",
        (Intent::Chat, IntentSource::Model) => "→ chat",
        (Intent::Chat, IntentSource::Heuristic) => "→ chat (offline guess)",
    };
    println!("{}", label.bright_black());
}

fn render_chat(chat: &ChatReply) {
    if let Some(c) = chat.classification {
        render_decision(c.intent, c.source);
    }
    for line in chat.text.lines() {
        if chat.offline {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.bright_blue());
        }
    }
    println!();
}

fn render_command(output: &CommandOutput) {
    println!("{} {}", "$".bright_black(), output.command.cyan());
    for line in output.output.lines() {
        println!("  {}", line);
    }
    match output.exit_code {
        Some(0) | None if output.framed => {}
        Some(code) => println!("{}", format!("exit {}", code).yellow()),
        None if !output.alive => println!("{}", "The shell has exited.".red()),
        None => println!("{}", "Output may be incomplete.".bright_black()),
    }
}

fn render_task(reply: &TaskReply) {
    if let Some(c) = reply.classification {
        render_decision(c.intent, c.source);
    }
    if let Some(opened) = &reply.opened {
        println!(
            "{}",
            format!("(opened {} for this task)", opened.id).bright_black()
        );
    }

    let report = &reply.report;
    match &report.outcome {
        TaskOutcome::Completed { summary } => {
            println!("{}", "🎉 Task complete".green().bold());
            if !summary.is_empty() {
                println!("{}", summary);
            }
        }
        TaskOutcome::Failed { reason } => {
            println!("{} {}", "⚠️  Task failed:".red().bold(), reason);
        }
        TaskOutcome::StepExhausted { max_steps } => {
            println!(
                "{}",
                format!("⏹  Stopped after {} steps without finishing", max_steps)
                    .yellow()
                    .bold()
            );
        }
    }
    println!(
        "{}",
        format!(
            "   steps {}  commands {}  trace {}",
            report.steps,
            report.records.len(),
            report.trace_id
        )
        .bright_black()
    );
    println!();
}

fn render_sessions(overview: &SessionsOverview) {
    if overview.sessions.is_empty() {
        println!("{}", "No agent sessions.".yellow());
        if overview.available.is_empty() {
            println!("{}", "No supported shells found on this system.".red());
        } else {
            let names: Vec<&str> = overview.available.iter().map(|k| k.as_str()).collect();
            println!("Available shells: {}", names.join(", ").cyan());
            println!(
                "{}",
                format!("Start one with 'agent: open {}'", names[0]).bright_black()
            );
        }
        return;
    }

    println!(
        "{}",
        format!(
            "  {:<24} {:<11} {:<10} {:<8} {:>4}  {}",
            "ID", "SHELL", "MODE", "STATE", "CMDS", "DIRECTORY"
        )
        .bold()
    );
    for status in &overview.sessions {
        let marker = if overview.active.as_ref() == Some(&status.id) {
            "*"
        } else {
            " "
        };
        let state = if status.is_active {
            "active".green()
        } else {
            "ended".red()
        };
        println!(
            "{} {:<24} {:<11} {:<10} {:<8} {:>4}  {}",
            marker,
            status.id.as_str(),
            status.kind.as_str(),
            status.mode.as_str(),
            state,
            status.command_count,
            status.working_dir.display()
        );
    }
}
