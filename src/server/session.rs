use chrono::Utc;
use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::Arc;
use tokio::sync::mpsc::{ self, error::SendError };
use uuid::Uuid;

use crate::config::PromptTemplates;
use crate::editor::ClaudeTextEditor;
use crate::error::ClaudeError;
use crate::llm::{ Claude, ClaudeConfig, RequestOptions, StreamUpdate };
use crate::models::chat::Response;
use crate::models::websocket::{ ClientMessage, ServerMessage };

pub type Outbox = mpsc::Sender<ServerMessage>;

/// Builds one editor session per connection. Sessions share configuration
/// and templates but never history or model.
pub struct SessionFactory {
    config: ClaudeConfig,
    prompts: Arc<PromptTemplates>,
    options: RequestOptions,
}

impl SessionFactory {
    pub fn new(config: ClaudeConfig, prompts: Arc<PromptTemplates>, options: RequestOptions) -> Self {
        Self { config, prompts, options }
    }

    pub fn create(&self) -> Result<EditorSession, ClaudeError> {
        let id = Uuid::new_v4().to_string();
        let mut config = self.config.clone();
        config.session_id = if self.config.session_id.is_empty() {
            id.clone()
        } else {
            format!("{}-{}", self.config.session_id, id)
        };
        let claude = Arc::new(Claude::new(config)?);
        let editor = ClaudeTextEditor::with_prompts(claude, Arc::clone(&self.prompts)).with_options(
            self.options.clone()
        );
        Ok(EditorSession::new(id, editor))
    }
}

/// State of one connected editor: its conversation and its model.
pub struct EditorSession {
    id: String,
    editor: ClaudeTextEditor,
}

impl EditorSession {
    pub fn new(id: impl Into<String>, editor: ClaudeTextEditor) -> Self {
        Self { id: id.into(), editor }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn editor(&self) -> &ClaudeTextEditor {
        &self.editor
    }

    /// Answers one client message on `out`. Failures of the request itself
    /// are reported to the client; only a closed `out` is returned as an
    /// error.
    pub async fn handle(&self, msg: ClientMessage, out: &Outbox) -> Result<(), SendError<ServerMessage>> {
        let claude = self.editor.claude();
        match msg {
            ClientMessage::Edit { mode, text, argument, stream } => {
                let argument = match argument {
                    Some(argument) => argument,
                    None if mode.takes_argument() => {
                        return out.send(ServerMessage::error(format!("Mode '{}' requires an argument", mode))).await;
                    }
                    None => String::new(),
                };
                let prompt = match self.editor.prompt_for(mode, &text, &argument) {
                    Ok(prompt) => prompt,
                    Err(e) => {
                        return out.send(error_message(&e)).await;
                    }
                };
                debug!("Session {} running {} on {} chars", self.id, mode, text.len());
                self.turn(&prompt, stream, out).await
            }
            ClientMessage::Prompt { content, stream } => self.turn(&content, stream, out).await,
            ClientMessage::ClearHistory => {
                claude.clear_history();
                info!("Session {} history cleared", self.id);
                out.send(ServerMessage::Ok).await
            }
            ClientMessage::GetHistory => {
                out.send(ServerMessage::History { messages: claude.history() }).await
            }
            ClientMessage::SetHistory { messages } => {
                info!("Session {} history replaced with {} message(s)", self.id, messages.len());
                claude.set_history(messages);
                out.send(ServerMessage::Ok).await
            }
            ClientMessage::SetModel { model } => {
                if model.trim().is_empty() {
                    return out.send(ServerMessage::error("Model name cannot be empty")).await;
                }
                claude.set_model(model);
                out.send(ServerMessage::Ok).await
            }
        }
    }

    async fn turn(&self, prompt: &str, stream: bool, out: &Outbox) -> Result<(), SendError<ServerMessage>> {
        out.send(ServerMessage::Processing).await?;
        let claude = self.editor.claude();
        let options = self.editor.options();

        if !stream {
            return match claude.message(prompt, options).await {
                Ok(response) => out.send(response_message(response)).await,
                Err(e) => {
                    warn!("Session {} request failed: {}", self.id, e);
                    out.send(error_message(&e)).await
                }
            };
        }

        let mut updates = match claude.stream_message(prompt, options).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Session {} could not open stream: {}", self.id, e);
                return out.send(error_message(&e)).await;
            }
        };
        while let Some(update) = updates.next().await {
            match update {
                Ok(StreamUpdate::Delta(content)) => out.send(ServerMessage::Partial { content }).await?,
                Ok(StreamUpdate::Complete(response)) => {
                    return out.send(response_message(response)).await;
                }
                Err(e) => {
                    warn!("Session {} stream failed: {}", self.id, e);
                    return out.send(error_message(&e)).await;
                }
            }
        }
        Ok(())
    }
}

fn response_message(response: Response) -> ServerMessage {
    ServerMessage::Response {
        content: response.content,
        id: response.id,
        model: response.model,
        usage: response.usage,
        timestamp: Utc::now().timestamp(),
    }
}

fn error_message(err: &ClaudeError) -> ServerMessage {
    ServerMessage::Error { message: err.to_string(), status: err.status() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditMode;
    use crate::llm::request::{ ContentBlock, MessagesRequest, MessagesResponse };
    use crate::llm::transport::{ ByteStream, Transport };
    use crate::models::chat::{ Message, Role, Usage };
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CannedTransport {
        reject_with: Option<u16>,
        models: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, payload: &MessagesRequest) -> Result<MessagesResponse, ClaudeError> {
            self.models.lock().push(payload.model.clone());
            if let Some(status) = self.reject_with {
                return Err(ClaudeError::api(status, "rejected", None));
            }
            Ok(MessagesResponse {
                id: "msg_canned".into(),
                model: payload.model.clone(),
                content: vec![ContentBlock { kind: "text".into(), text: Some("Bonjour".into()) }],
                stop_reason: Some("end_turn".into()),
                usage: Some(Usage { input_tokens: 3, output_tokens: 1 }),
            })
        }

        async fn open_stream(&self, payload: &MessagesRequest) -> Result<ByteStream, ClaudeError> {
            self.models.lock().push(payload.model.clone());
            if let Some(status) = self.reject_with {
                return Err(ClaudeError::api(status, "rejected", None));
            }
            let chunks = vec![
                Ok::<_, ClaudeError>(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Bon\"}}\n".to_vec()),
                Ok(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"jour\"}}\n".to_vec())
            ];
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn session_with(transport: Arc<CannedTransport>) -> EditorSession {
        let claude = Arc::new(Claude::with_transport(ClaudeConfig::new("key", "ws-test"), transport));
        EditorSession::new("ws-test", ClaudeTextEditor::new(claude))
    }

    async fn exchange(session: &EditorSession, msg: ClientMessage) -> Vec<ServerMessage> {
        let (tx, mut rx) = mpsc::channel(64);
        session.handle(msg, &tx).await.unwrap();
        drop(tx);
        let mut replies = Vec::new();
        while let Some(reply) = rx.recv().await {
            replies.push(reply);
        }
        replies
    }

    #[tokio::test]
    async fn buffered_edit_replies_with_response() {
        let session = session_with(Arc::new(CannedTransport::default()));
        let replies = exchange(&session, ClientMessage::Edit {
            mode: EditMode::Translate,
            text: "Hola".into(),
            argument: Some("French".into()),
            stream: false,
        }).await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], ServerMessage::Processing);
        match &replies[1] {
            ServerMessage::Response { content, id, usage, .. } => {
                assert_eq!(content, "Bonjour");
                assert_eq!(id, "msg_canned");
                assert_eq!(usage.map(|u| u.output_tokens), Some(1));
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let history = session.editor().claude().history();
        assert_eq!(history[0].content, "Please translate the following text to French:\n\nHola");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn streamed_prompt_sends_partials_then_response() {
        let session = session_with(Arc::new(CannedTransport::default()));
        let replies = exchange(&session, ClientMessage::Prompt { content: "hi".into(), stream: true }).await;

        assert_eq!(replies[0], ServerMessage::Processing);
        assert_eq!(replies[1], ServerMessage::Partial { content: "Bon".into() });
        assert_eq!(replies[2], ServerMessage::Partial { content: "jour".into() });
        assert!(matches!(&replies[3], ServerMessage::Response { content, .. } if content == "Bonjour"));
        assert_eq!(replies.len(), 4);
    }

    #[tokio::test]
    async fn missing_argument_is_reported() {
        let transport = Arc::new(CannedTransport::default());
        let session = session_with(transport.clone());
        let replies = exchange(&session, ClientMessage::Edit {
            mode: EditMode::Rewrite,
            text: "x".into(),
            argument: None,
            stream: false,
        }).await;

        assert!(matches!(&replies[..], [ServerMessage::Error { status: None, .. }]));
        assert!(transport.models.lock().is_empty());
    }

    #[tokio::test]
    async fn api_failure_carries_status() {
        let transport = Arc::new(CannedTransport { reject_with: Some(401), ..Default::default() });
        let session = session_with(transport);

        let replies = exchange(&session, ClientMessage::Prompt { content: "hi".into(), stream: false }).await;
        assert!(matches!(&replies[1], ServerMessage::Error { status: Some(401), .. }));

        let replies = exchange(&session, ClientMessage::Prompt { content: "hi".into(), stream: true }).await;
        assert!(matches!(&replies[1], ServerMessage::Error { status: Some(401), .. }));

        assert!(session.editor().claude().history().is_empty());
    }

    #[tokio::test]
    async fn history_commands_round_trip() {
        let session = session_with(Arc::new(CannedTransport::default()));
        let messages = vec![Message::user("a"), Message::assistant("b")];

        let replies = exchange(&session, ClientMessage::SetHistory { messages: messages.clone() }).await;
        assert_eq!(replies, vec![ServerMessage::Ok]);

        let replies = exchange(&session, ClientMessage::GetHistory).await;
        assert_eq!(replies, vec![ServerMessage::History { messages }]);

        exchange(&session, ClientMessage::ClearHistory).await;
        let replies = exchange(&session, ClientMessage::GetHistory).await;
        assert_eq!(replies, vec![ServerMessage::History { messages: vec![] }]);
    }

    #[tokio::test]
    async fn set_model_applies_to_later_requests() {
        let transport = Arc::new(CannedTransport::default());
        let session = session_with(transport.clone());

        let replies = exchange(&session, ClientMessage::SetModel { model: "claude-3-haiku-20240307".into() }).await;
        assert_eq!(replies, vec![ServerMessage::Ok]);
        let replies = exchange(&session, ClientMessage::SetModel { model: "  ".into() }).await;
        assert!(matches!(&replies[..], [ServerMessage::Error { .. }]));

        exchange(&session, ClientMessage::Prompt { content: "hi".into(), stream: false }).await;
        assert_eq!(transport.models.lock().as_slice(), ["claude-3-haiku-20240307".to_string()]);
    }

    #[test]
    fn factory_sessions_are_independent() {
        let factory = SessionFactory::new(
            ClaudeConfig::new("key", "editor"),
            Arc::new(PromptTemplates::default()),
            RequestOptions::default()
        );
        let first = factory.create().unwrap();
        let second = factory.create().unwrap();

        assert_ne!(first.id(), second.id());
        assert!(first.editor().claude().session_id().starts_with("editor-"));
        first.editor().claude().set_model("other");
        assert_eq!(second.editor().claude().model(), crate::llm::DEFAULT_MODEL);
    }
}
