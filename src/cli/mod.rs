use clap::{ Parser, Subcommand };
use std::time::Duration;

use crate::editor::EditMode;
use crate::llm::{
    ClaudeConfig,
    RequestOptions,
    DEFAULT_API_VERSION,
    DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Client Args ---
    /// API key sent in the x-api-key header.
    #[arg(long, env = "ANTHROPIC_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of the messages API; requests go to {base_url}/messages.
    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Model used for new requests (e.g., claude-3-opus-20240229, claude-3-haiku-20240307)
    #[arg(long, env = "CLAUDE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Value of the anthropic-version header.
    #[arg(long, env = "ANTHROPIC_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Session identifier. Defaults to ai-text-editor-{unix millis}.
    #[arg(long, env = "SESSION_ID")]
    pub session_id: Option<String>,

    /// Number of past turns sent with each request. Unset sends the whole history.
    #[arg(long, env = "HISTORY_TURNS")]
    pub history_turns: Option<usize>,

    /// Client-side request timeout in seconds. Unset waits for the server.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    // --- Request Args ---
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    #[arg(long, env = "MAX_TOKENS", default_value = "4096")]
    pub max_tokens: u32,

    /// Optional system prompt sent with every request.
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system: Option<String>,

    // --- General App Args ---
    /// Path to a JSON file overriding the editing prompt templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Runs one editing operation on text from a file or stdin.
    Ask {
        #[arg(long, short = 'm', value_parser = parse_mode)]
        mode: EditMode,

        /// Language for translate, style for rewrite, instruction for custom.
        #[arg(long, short = 'a')]
        argument: Option<String>,

        /// Read the text from this file instead of stdin.
        #[arg(long, short = 'f')]
        file: Option<String>,

        /// Print the reply as it is generated.
        #[arg(long, default_value = "false")]
        stream: bool,
    },
    /// Serves editor sessions over WebSocket.
    Serve {
        /// Host address and port for the server to listen on.
        #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
        addr: String,

        /// Optional key clients must pass as ?key= when connecting.
        #[arg(long, env = "SERVER_API_KEY")]
        server_api_key: Option<String>,

        /// New connections accepted per second across all clients.
        #[arg(long, env = "MAX_CONNECTIONS_PER_SECOND", default_value = "10")]
        max_connections_per_second: u32,
    },
}

fn parse_mode(value: &str) -> Result<EditMode, String> {
    value.parse::<EditMode>().map_err(|e| e.to_string())
}

impl Args {
    pub fn client_config(&self) -> ClaudeConfig {
        let session_id = self.session_id
            .clone()
            .unwrap_or_else(|| format!("ai-text-editor-{}", chrono::Utc::now().timestamp_millis()));
        ClaudeConfig {
            api_key: self.api_key.clone(),
            session_id,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_version: self.api_version.clone(),
            max_history_turns: self.history_turns,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            stream: false,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system: self.system.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_with_flags() {
        let args = Args::try_parse_from([
            "claude-text-editor",
            "--api-key",
            "sk-test",
            "--session-id",
            "doc-1",
            "--history-turns",
            "3",
            "ask",
            "--mode",
            "translate",
            "--argument",
            "French",
            "--stream",
        ]).unwrap();

        match &args.command {
            Command::Ask { mode, argument, file, stream } => {
                assert_eq!(*mode, EditMode::Translate);
                assert_eq!(argument.as_deref(), Some("French"));
                assert!(file.is_none());
                assert!(*stream);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let config = args.client_config();
        assert_eq!(config.session_id, "doc-1");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.max_history_turns, Some(3));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn bad_mode_is_rejected() {
        let parsed = Args::try_parse_from(["claude-text-editor", "ask", "--mode", "shout"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn generated_session_id_has_editor_prefix() {
        let args = Args::try_parse_from([
            "claude-text-editor",
            "--request-timeout-secs",
            "30",
            "--system",
            "Be brief.",
            "serve",
        ]).unwrap();
        let config = args.client_config();
        assert!(config.session_id.starts_with("ai-text-editor-"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(args.request_options().system.as_deref(), Some("Be brief."));
        assert!(matches!(args.command, Command::Serve { max_connections_per_second: 10, .. }));
    }
}
