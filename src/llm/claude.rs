use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use parking_lot::{ Mutex, RwLock };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{ mpsc, Mutex as TurnLock };
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::request::build_request;
use super::stream::StreamDecoder;
use super::transport::{ ByteStream, HttpTransport, Transport };
use super::{ ClaudeConfig, RequestOptions };
use crate::error::ClaudeError;
use crate::history::ConversationHistory;
use crate::models::chat::{ Message, Response };

/// One item of a streaming call: any number of deltas, then exactly one
/// `Complete`. A failure ends the stream with an `Err` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Delta(String),
    Complete(Response),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = Result<StreamUpdate, ClaudeError>> + Send>>;

type UpdateSender = mpsc::UnboundedSender<Result<StreamUpdate, ClaudeError>>;

/// Conversation client for the messages endpoint.
///
/// A client owns one conversation. Turns are serialized: a call made while
/// another is still in flight (including a stream that has not finished)
/// waits for it. The user message and the assistant reply are committed to
/// the history together once a turn completes, so a failed turn leaves the
/// history as it was.
pub struct Claude {
    config: ClaudeConfig,
    model: RwLock<String>,
    history: Arc<Mutex<ConversationHistory>>,
    turn: Arc<TurnLock<()>>,
    transport: Arc<dyn Transport>,
}

impl Claude {
    pub fn new(config: ClaudeConfig) -> Result<Self, ClaudeError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClaudeConfig, transport: Arc<dyn Transport>) -> Self {
        info!(
            "Claude client created: session={}, model={}, history_turns={:?}",
            config.session_id,
            config.model,
            config.max_history_turns
        );
        Self {
            model: RwLock::new(config.model.clone()),
            config,
            history: Arc::new(Mutex::new(ConversationHistory::new())),
            turn: Arc::new(TurnLock::new(())),
            transport,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn model(&self) -> String {
        self.model.read().clone()
    }

    /// Changes the model for requests issued from now on. Calls already in
    /// flight keep the model they started with.
    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        info!("Session {} switching model to {}", self.config.session_id, model);
        *self.model.write() = model;
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.lock().snapshot()
    }

    pub fn set_history(&self, messages: Vec<Message>) {
        self.history.lock().replace(messages);
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Sends `content` and waits for the full reply.
    pub async fn message(
        &self,
        content: &str,
        options: &RequestOptions
    ) -> Result<Response, ClaudeError> {
        let _turn = self.turn.lock().await;
        let model = self.model();
        let user = Message::user(content);
        let options = RequestOptions { stream: false, ..options.clone() };
        let payload = build_request(&self.outgoing(&user), &model, &options);

        let response = match self.transport.send(&payload).await {
            Ok(resp) => resp.into_response(),
            Err(e) => {
                error!("Session {} request failed: {}", self.config.session_id, e);
                return Err(e);
            }
        };

        commit_turn(&self.history, user, &response);
        debug!(
            "Session {} turn complete: id={}, {} chars",
            self.config.session_id,
            response.id,
            response.content.len()
        );
        Ok(response)
    }

    /// Sends `content` as a streaming request. Resolves once the response
    /// headers arrive; text then flows through the returned stream.
    ///
    /// Dropping the stream does not cancel the request: the body is still
    /// read to the end and the completed turn is still committed. Deltas are
    /// queued without bound, so the body is drained and the turn released
    /// even while the stream sits unread.
    pub async fn stream_message(
        &self,
        content: &str,
        options: &RequestOptions
    ) -> Result<MessageStream, ClaudeError> {
        let turn = Arc::clone(&self.turn).lock_owned().await;
        let model = self.model();
        let user = Message::user(content);
        let options = RequestOptions { stream: true, ..options.clone() };
        let payload = build_request(&self.outgoing(&user), &model, &options);

        let body = match self.transport.open_stream(&payload).await {
            Ok(body) => body,
            Err(e) => {
                error!("Session {} failed to open stream: {}", self.config.session_id, e);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let history = Arc::clone(&self.history);
        let session_id = self.config.session_id.clone();

        tokio::spawn(async move {
            let outcome = pump_stream(body, &tx, &model).await;
            match outcome {
                Ok(response) => {
                    commit_turn(&history, user, &response);
                    debug!(
                        "Session {} stream complete: id={}, {} chars",
                        session_id,
                        response.id,
                        response.content.len()
                    );
                    let _ = tx.send(Ok(StreamUpdate::Complete(response)));
                }
                Err(e) => {
                    error!("Session {} stream failed: {}", session_id, e);
                    let _ = tx.send(Err(e));
                }
            }
            drop(turn);
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    /// Callback form of `stream_message`. `on_chunk` sees every delta in
    /// order and `on_complete` runs exactly once with the final response.
    /// Errors, including ones raised mid-stream, are returned.
    pub async fn stream_message_with<C, D>(
        &self,
        content: &str,
        options: &RequestOptions,
        mut on_chunk: C,
        on_complete: D
    ) -> Result<(), ClaudeError>
        where C: FnMut(&str), D: FnOnce(Response)
    {
        let mut stream = self.stream_message(content, options).await?;
        while let Some(update) = stream.next().await {
            match update? {
                StreamUpdate::Delta(text) => on_chunk(&text),
                StreamUpdate::Complete(response) => {
                    on_complete(response);
                    return Ok(());
                }
            }
        }
        Err(ClaudeError::Decode("stream ended without a completion".to_string()))
    }

    /// History to send with `user`: the configured window of past turns
    /// followed by the new message.
    fn outgoing(&self, user: &Message) -> Vec<Message> {
        let mut messages = self.history.lock().window(self.config.max_history_turns);
        messages.push(user.clone());
        messages
    }
}

fn commit_turn(history: &Mutex<ConversationHistory>, user: Message, response: &Response) {
    let mut history = history.lock();
    history.append(user);
    history.append(Message::assistant(response.content.clone()));
}

/// Drives one streaming body to completion, forwarding deltas while anyone
/// is listening.
async fn pump_stream(
    mut body: ByteStream,
    tx: &UpdateSender,
    model: &str
) -> Result<Response, ClaudeError> {
    let mut decoder = StreamDecoder::new();
    let mut listening = true;

    while let Some(chunk) = body.next().await {
        let deltas = decoder.push(&chunk?)?;
        forward(tx, deltas, &mut listening);
    }

    let (deltas, response) = decoder.finish(model)?;
    forward(tx, deltas, &mut listening);
    Ok(response)
}

fn forward(tx: &UpdateSender, deltas: Vec<String>, listening: &mut bool) {
    for delta in deltas {
        if !*listening {
            return;
        }
        if tx.send(Ok(StreamUpdate::Delta(delta))).is_err() {
            warn!("Stream consumer went away; draining the rest of the response");
            *listening = false;
        }
    }
}
