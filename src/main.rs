use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::Editor;

use shellpilot::telemetry::{init_tracing, shutdown_tracing};
use shellpilot::{Assistant, Config};

mod console;

use console::{print_banner, render, CliHelper, ConsoleObserver};

#[derive(Parser, Debug)]
#[command(name = "shellpilot", version)]
#[command(about = "Terminal assistant that chats and runs tasks in local shells", long_about = None)]
struct Args {
    /// Base URL of the text completion API
    #[arg(long, env = "TEXT_API_URL")]
    text_api_url: Option<String>,

    /// Base URL of the image API
    #[arg(long, env = "IMAGE_API_URL")]
    image_api_url: Option<String>,

    /// Model for chat replies
    #[arg(long = "model", env = "TEXT_MODEL")]
    chat_model: Option<String>,

    /// Model for command proposals and intent decisions
    #[arg(long, env = "AGENT_MODEL")]
    agent_model: Option<String>,

    /// Model for image generation
    #[arg(long, env = "IMAGE_MODEL")]
    image_model: Option<String>,

    /// Maximum commands per task
    #[arg(long)]
    max_steps: Option<usize>,

    /// Working directory for new shell sessions
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// OTLP collector endpoint for trace export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Process a single input and exit
    #[arg(long, value_name = "INPUT")]
    once: Option<String>,

    /// More detailed logs on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::from_env();
        if let Some(v) = self.text_api_url {
            config.text_api_url = v;
        }
        if let Some(v) = self.image_api_url {
            config.image_api_url = v;
        }
        if let Some(v) = self.chat_model {
            config.chat_model = v;
        }
        if let Some(v) = self.agent_model {
            config.agent_model = v;
        }
        if let Some(v) = self.image_model {
            config.image_model = v;
        }
        if let Some(v) = self.max_steps {
            config.agent.max_steps = v.max(1);
        }
        if let Some(v) = self.otlp_endpoint {
            config.otlp_endpoint = Some(v);
        }
        config.working_dir = self.workdir;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let once = args.once.clone();
    let verbose = args.verbose;
    let config = args.into_config();

    if let Err(e) = init_tracing("shellpilot", config.otlp_endpoint.as_deref(), verbose) {
        eprintln!("{}", format!("Failed to initialize tracing: {}", e).red());
    }

    let mut assistant = Assistant::new(config);

    let result = match once {
        Some(input) => {
            let reply = assistant.handle(&input, &ConsoleObserver).await;
            render(&reply);
            Ok(())
        }
        None => repl(&mut assistant).await,
    };

    assistant.shutdown().await;
    shutdown_tracing();
    result
}

async fn repl(assistant: &mut Assistant) -> Result<()> {
    let mut rl = Editor::new()?;
    rl.set_helper(Some(CliHelper));

    print_banner();

    loop {
        let readline = tokio::task::block_in_place(|| rl.readline(">> "));

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                let keep_going = tokio::select! {
                    reply = assistant.handle(&line, &ConsoleObserver) => render(&reply),
                    _ = tokio::signal::ctrl_c() => {
                        println!("{}", "Interrupted.".yellow());
                        true
                    }
                };
                if !keep_going {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'exit' to quit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    Ok(())
}
