use crate::models::websocket::{ ClientMessage, ServerMessage };
use super::session::{ EditorSession, SessionFactory };

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::mpsc;

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ SinkExt, StreamExt };

pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Query parameter carrying the shared key during the handshake.
pub const KEY_PARAM: &str = "key";

pub type ConnectionLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn connection_limiter(per_second: u32) -> Result<ConnectionLimiter, Box<dyn Error + Send + Sync>> {
    let rate = NonZeroU32::new(per_second).ok_or("Connection rate limit must be greater than zero")?;
    Ok(RateLimiter::direct(Quota::per_second(rate)))
}

pub async fn start_ws_server(
    addr: &str,
    factory: Arc<SessionFactory>,
    api_key: Option<String>,
    max_connections_per_second: u32
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let limiter = connection_limiter(max_connections_per_second)?;
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);
    if api_key.as_deref().map_or(true, str::is_empty) {
        warn!("No server key configured; any client can connect");
    }

    loop {
        let (stream, peer) = listener.accept().await?;

        if limiter.check().is_err() {
            warn!("Connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let factory = Arc::clone(&factory);
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if let Err(e) = process_connection(peer, stream, factory, required_api_key).await {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    factory: Arc<SessionFactory>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if key_matches(req.uri().query(), required_api_key.as_deref()) {
            Ok(response)
        } else {
            warn!("Rejected handshake from {}: missing or wrong key", peer);
            Err(unauthorized())
        }
    };

    let ws = match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            return Err(Box::new(e) as _);
        }
    };
    let session = factory.create()?;
    handle_connection(peer, ws, session).await;
    Ok(())
}

/// True when no key is required or the query string carries the right one.
pub fn key_matches(query: Option<&str>, required: Option<&str>) -> bool {
    let Some(required) = required.filter(|k| !k.is_empty()) else {
        return true;
    };
    form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .any(|(name, value)| name == KEY_PARAM && value == required)
}

fn unauthorized() -> ErrorResponse {
    let mut res = ErrorResponse::new(Some("invalid or missing key".to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

/// Serves one editor over an accepted socket until the peer goes away.
/// Replies are queued on a channel and written by a separate task so a long
/// streamed turn never blocks on the socket.
pub async fn handle_connection<S>(peer: SocketAddr, websocket: WebSocketStream<S>, session: EditorSession)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {} (session {})", peer, session.id());

    let (mut sink, mut rx) = websocket.split();
    let (out, mut outgoing) = mpsc::channel::<ServerMessage>(32);

    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize reply for {}: {}", peer, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json)).await {
                error!("Error sending to {}: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let _ = out.send(ServerMessage::error("Message too large")).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if session.handle(client_msg, &out).await.is_err() {
                                    warn!("Reply channel for {} closed", peer);
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                let reply = ServerMessage::error(format!("Failed to parse message: {}", e));
                                if out.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                        debug!("Control frame from {}", peer);
                    }
                }
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }

    drop(out);
    let _ = writer.await;
    info!("WebSocket connection closed for {} (session {})", peer, session.id());
}
