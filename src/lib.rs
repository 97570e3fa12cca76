pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

pub use editor::{ create_claude_service, ClaudeTextEditor, EditMode };
pub use error::ClaudeError;
pub use llm::{ Claude, ClaudeConfig, MessageStream, RequestOptions, StreamUpdate };
pub use models::{ Message, Response, Role, Usage };

use cli::{ Args, Command };
use config::{ load_prompts, PromptTemplates };
use futures::StreamExt;
use log::info;
use server::{ session::SessionFactory, Server };
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = args.client_config();
    let options = args.request_options();

    info!("--- Core Configuration ---");
    info!("Base URL: {}", config.base_url);
    info!("Model: {}", config.model);
    info!("API Version: {}", config.api_version);
    info!("Session ID: {}", config.session_id);
    info!("History Turns: {:?}", config.max_history_turns);
    info!("Request Timeout: {:?}", config.request_timeout);
    info!("Prompts Path: {:?}", args.prompts_path);
    info!("-------------------------");

    if config.api_key.is_empty() {
        return Err("An API key is required (--api-key or ANTHROPIC_API_KEY)".into());
    }

    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => Arc::new(PromptTemplates::default()),
    };

    match args.command {
        Command::Ask { mode, argument, file, stream } => {
            let argument = match argument {
                Some(argument) => argument,
                None if mode.takes_argument() => {
                    return Err(format!("Mode '{}' requires --argument", mode).into());
                }
                None => String::new(),
            };
            let text = read_input(file.as_deref()).await?;
            let claude = Arc::new(Claude::new(config)?);
            let editor = ClaudeTextEditor::with_prompts(claude, prompts).with_options(options);

            if stream {
                let mut updates = editor.run_stream(mode, &text, &argument).await?;
                let mut stdout = std::io::stdout();
                while let Some(update) = updates.next().await {
                    match update? {
                        StreamUpdate::Delta(delta) => {
                            write!(stdout, "{}", delta)?;
                            stdout.flush()?;
                        }
                        StreamUpdate::Complete(response) => {
                            writeln!(stdout)?;
                            info!(
                                "Response {} from {} (usage: {:?}, stop: {:?})",
                                response.id,
                                response.model,
                                response.usage,
                                response.stop_reason
                            );
                        }
                    }
                }
            } else {
                println!("{}", editor.run(mode, &text, &argument).await?);
            }
        }
        Command::Serve { addr, server_api_key, max_connections_per_second } => {
            info!("Starting server on: {}", addr);
            let factory = SessionFactory::new(config, prompts, options);
            let server = Server::new(addr, factory, server_api_key, max_connections_per_second);
            server.run().await?;
        }
    }

    Ok(())
}

async fn read_input(file: Option<&str>) -> Result<String, Box<dyn Error + Send + Sync>> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };
    if text.trim().is_empty() {
        return Err("No input text".into());
    }
    Ok(text)
}
