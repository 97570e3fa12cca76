//! Named editing operations layered over a shared `Claude` client.
//!
//! Each operation renders one prompt template around the caller's text and
//! sends it as a regular conversation turn, so the edits of one document
//! build on each other until the history is cleared.

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::prompt::{ render, PromptTemplates };
use crate::error::ClaudeError;
use crate::llm::{ Claude, ClaudeConfig, MessageStream, RequestOptions };

/// Editing modes offered to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    Suggestion,
    Completion,
    Edit,
    Summarize,
    Rewrite,
    Translate,
    Custom,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEditModeError {
    message: String,
}

impl fmt::Display for ParseEditModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseEditModeError {}

impl FromStr for EditMode {
    type Err = ParseEditModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "suggestion" | "suggest" => Ok(EditMode::Suggestion),
            "completion" | "complete" => Ok(EditMode::Completion),
            "edit" => Ok(EditMode::Edit),
            "summarize" => Ok(EditMode::Summarize),
            "rewrite" => Ok(EditMode::Rewrite),
            "translate" => Ok(EditMode::Translate),
            "custom" => Ok(EditMode::Custom),
            _ =>
                Err(ParseEditModeError {
                    message: format!("Invalid edit mode: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditMode::Suggestion => "suggestion",
            EditMode::Completion => "completion",
            EditMode::Edit => "edit",
            EditMode::Summarize => "summarize",
            EditMode::Rewrite => "rewrite",
            EditMode::Translate => "translate",
            EditMode::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

impl EditMode {
    /// Whether the mode needs a language, style or instruction.
    pub fn takes_argument(&self) -> bool {
        matches!(self, EditMode::Rewrite | EditMode::Translate | EditMode::Custom)
    }
}

#[derive(Clone)]
pub struct ClaudeTextEditor {
    claude: Arc<Claude>,
    prompts: Arc<PromptTemplates>,
    options: RequestOptions,
}

impl ClaudeTextEditor {
    pub fn new(claude: Arc<Claude>) -> Self {
        Self::with_prompts(claude, Arc::new(PromptTemplates::default()))
    }

    pub fn with_prompts(claude: Arc<Claude>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            claude,
            prompts,
            options: RequestOptions::default(),
        }
    }

    /// Options used for every request this editor sends.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn claude(&self) -> &Arc<Claude> {
        &self.claude
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn summarize_prompt(&self, text: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.summarize, &[("text", text)])?)
    }

    pub fn suggest_prompt(&self, text: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.suggest, &[("text", text)])?)
    }

    pub fn complete_prompt(&self, text: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.complete, &[("text", text)])?)
    }

    pub fn edit_prompt(&self, text: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.edit, &[("text", text)])?)
    }

    pub fn translate_prompt(&self, text: &str, language: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.translate, &[("text", text), ("language", language)])?)
    }

    pub fn rewrite_prompt(&self, text: &str, style: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.rewrite, &[("text", text), ("style", style)])?)
    }

    pub fn custom_prompt(&self, text: &str, instruction: &str) -> Result<String, ClaudeError> {
        Ok(render(&self.prompts.custom, &[("text", text), ("instruction", instruction)])?)
    }

    /// Prompt for `mode`; `argument` is the language, style or instruction
    /// for the modes that take one and is ignored otherwise.
    pub fn prompt_for(&self, mode: EditMode, text: &str, argument: &str) -> Result<String, ClaudeError> {
        match mode {
            EditMode::Suggestion => self.suggest_prompt(text),
            EditMode::Completion => self.complete_prompt(text),
            EditMode::Edit => self.edit_prompt(text),
            EditMode::Summarize => self.summarize_prompt(text),
            EditMode::Rewrite => self.rewrite_prompt(text, argument),
            EditMode::Translate => self.translate_prompt(text, argument),
            EditMode::Custom => self.custom_prompt(text, argument),
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<String, ClaudeError> {
        self.send(self.summarize_prompt(text)?).await
    }

    pub async fn suggest(&self, text: &str) -> Result<String, ClaudeError> {
        self.send(self.suggest_prompt(text)?).await
    }

    pub async fn complete(&self, text: &str) -> Result<String, ClaudeError> {
        self.send(self.complete_prompt(text)?).await
    }

    /// Streaming variant of `complete`, so a continuation can be shown while
    /// it is written.
    pub async fn complete_stream(&self, text: &str) -> Result<MessageStream, ClaudeError> {
        let prompt = self.complete_prompt(text)?;
        self.claude.stream_message(&prompt, &self.options).await
    }

    pub async fn edit(&self, text: &str) -> Result<String, ClaudeError> {
        self.send(self.edit_prompt(text)?).await
    }

    pub async fn translate(&self, text: &str, language: &str) -> Result<String, ClaudeError> {
        self.send(self.translate_prompt(text, language)?).await
    }

    pub async fn rewrite(&self, text: &str, style: &str) -> Result<String, ClaudeError> {
        self.send(self.rewrite_prompt(text, style)?).await
    }

    pub async fn process_custom_prompt(&self, text: &str, instruction: &str) -> Result<String, ClaudeError> {
        self.send(self.custom_prompt(text, instruction)?).await
    }

    pub async fn run(&self, mode: EditMode, text: &str, argument: &str) -> Result<String, ClaudeError> {
        self.send(self.prompt_for(mode, text, argument)?).await
    }

    pub async fn run_stream(&self, mode: EditMode, text: &str, argument: &str) -> Result<MessageStream, ClaudeError> {
        let prompt = self.prompt_for(mode, text, argument)?;
        self.claude.stream_message(&prompt, &self.options).await
    }

    async fn send(&self, prompt: String) -> Result<String, ClaudeError> {
        let response = self.claude.message(&prompt, &self.options).await?;
        Ok(response.content)
    }
}

/// Builds a client and an editor that shares it.
pub fn create_claude_service(config: ClaudeConfig) -> Result<(Arc<Claude>, ClaudeTextEditor), ClaudeError> {
    let claude = Arc::new(Claude::new(config)?);
    let editor = ClaudeTextEditor::new(Arc::clone(&claude));
    Ok((claude, editor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::request::{ ContentBlock, MessagesRequest, MessagesResponse };
    use crate::llm::transport::{ ByteStream, Transport };
    use crate::llm::StreamUpdate;
    use crate::models::chat::Message;
    use async_trait::async_trait;
    use futures::{ stream, StreamExt };
    use parking_lot::Mutex;

    /// Echoes the last user message back, prefixed with "re: ".
    #[derive(Default)]
    struct EchoTransport {
        seen: Mutex<Vec<MessagesRequest>>,
    }

    impl EchoTransport {
        fn last_prompt(&self) -> String {
            let seen = self.seen.lock();
            seen.last().and_then(|req| req.messages.last()).map(|m| m.content.clone()).unwrap()
        }
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, payload: &MessagesRequest) -> Result<MessagesResponse, ClaudeError> {
            self.seen.lock().push(payload.clone());
            let last = payload.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(MessagesResponse {
                id: "msg_echo".into(),
                model: payload.model.clone(),
                content: vec![ContentBlock { kind: "text".into(), text: Some(format!("re: {}", last)) }],
                stop_reason: None,
                usage: None,
            })
        }

        async fn open_stream(&self, payload: &MessagesRequest) -> Result<ByteStream, ClaudeError> {
            self.seen.lock().push(payload.clone());
            let body = "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"and then\"}}\n\n";
            Ok(Box::pin(stream::iter(vec![Ok::<_, ClaudeError>(body.as_bytes().to_vec())])))
        }
    }

    fn editor() -> (Arc<EchoTransport>, ClaudeTextEditor) {
        let transport = Arc::new(EchoTransport::default());
        let claude = Arc::new(
            Claude::with_transport(ClaudeConfig::new("key", "editor-test"), transport.clone())
        );
        (transport, ClaudeTextEditor::new(claude))
    }

    #[tokio::test]
    async fn translate_sends_exact_template() {
        let (transport, editor) = editor();
        let reply = editor.translate("Hola", "French").await.unwrap();

        assert_eq!(transport.last_prompt(), "Please translate the following text to French:\n\nHola");
        assert_eq!(reply, "re: Please translate the following text to French:\n\nHola");
    }

    #[tokio::test]
    async fn rewrite_sends_exact_template() {
        let (transport, editor) = editor();
        editor.rewrite("X", "more casually").await.unwrap();
        assert_eq!(transport.last_prompt(), "Please rewrite the following text more casually:\n\nX");
    }

    #[tokio::test]
    async fn every_mode_renders_its_template() {
        let (transport, editor) = editor();
        let cases = [
            (EditMode::Summarize, "", "Please summarize the following text:\n\nT"),
            (EditMode::Suggestion, "", "Please provide suggestions to improve the following text:\n\nT"),
            (EditMode::Completion, "", "Please continue the following text in the same style:\n\nT"),
            (EditMode::Edit, "", "Please edit the following text to improve clarity, grammar and flow:\n\nT"),
            (EditMode::Translate, "Spanish", "Please translate the following text to Spanish:\n\nT"),
            (EditMode::Rewrite, "more professionally", "Please rewrite the following text more professionally:\n\nT"),
            (EditMode::Custom, "Make it rhyme", "Make it rhyme\n\nT"),
        ];
        for (mode, argument, expected) in cases {
            editor.run(mode, "T", argument).await.unwrap();
            assert_eq!(transport.last_prompt(), expected, "mode {}", mode);
        }
        assert_eq!(editor.claude().history().len(), cases.len() * 2);
    }

    #[tokio::test]
    async fn edits_accumulate_until_cleared() {
        let (transport, editor) = editor();
        editor.summarize("doc one").await.unwrap();
        editor.edit("doc one").await.unwrap();
        assert_eq!(transport.seen.lock()[1].messages.len(), 3);

        editor.claude().clear_history();
        editor.suggest("doc two").await.unwrap();
        let seen = transport.seen.lock();
        assert_eq!(
            seen[2].messages,
            vec![Message::user("Please provide suggestions to improve the following text:\n\ndoc two")]
        );
    }

    #[tokio::test]
    async fn complete_stream_uses_completion_template() {
        let (transport, editor) = editor();
        let mut stream = editor.complete_stream("Once upon a time").await.unwrap();

        let mut text = String::new();
        while let Some(update) = stream.next().await {
            if let StreamUpdate::Delta(delta) = update.unwrap() {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "and then");
        assert_eq!(
            transport.last_prompt(),
            "Please continue the following text in the same style:\n\nOnce upon a time"
        );
    }

    #[tokio::test]
    async fn custom_templates_are_used() {
        let transport = Arc::new(EchoTransport::default());
        let claude = Arc::new(Claude::with_transport(ClaudeConfig::new("key", "s"), transport.clone()));
        let prompts = PromptTemplates {
            summarize: "TL;DR: {text}".to_string(),
            ..PromptTemplates::default()
        };
        let editor = ClaudeTextEditor::with_prompts(claude, Arc::new(prompts))
            .with_options(RequestOptions::default().with_temperature(0.2));

        editor.summarize("long text").await.unwrap();
        assert_eq!(transport.last_prompt(), "TL;DR: long text");
        assert!((transport.seen.lock()[0].temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Translate".parse::<EditMode>().unwrap(), EditMode::Translate);
        assert_eq!("complete".parse::<EditMode>().unwrap(), EditMode::Completion);
        assert!("shout".parse::<EditMode>().is_err());
        assert!(EditMode::Rewrite.takes_argument());
        assert!(!EditMode::Summarize.takes_argument());
    }

    #[test]
    fn create_claude_service_shares_the_client() {
        let (claude, editor) = create_claude_service(ClaudeConfig::new("key", "svc")).unwrap();
        assert!(Arc::ptr_eq(&claude, editor.claude()));
        assert_eq!(claude.session_id(), "svc");
    }
}
