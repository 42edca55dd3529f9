//! WebSocket server and connection handling.

use crate::actor::{Command, GameDirectory};
use crate::protocol::{ClientMessage, ErrorReply};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_GAME_ID_LEN: usize = 64;

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, directory: Arc<GameDirectory>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Monopoly server listening on {}", addr);
    serve(listener, directory).await
}

/// Accept connections on an already bound listener
pub async fn serve(listener: TcpListener, directory: Arc<GameDirectory>) -> anyhow::Result<()> {
    while let Ok((stream, peer_addr)) = listener.accept().await {
        let directory = Arc::clone(&directory);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, directory).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Letters, digits, `-` and `_`, at most 64 long
fn valid_game_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_GAME_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Game id from a `/games/{id}` path
fn game_path(path: &str) -> Option<&str> {
    path.strip_prefix("/games/")
        .map(|id| id.trim_end_matches('/'))
        .filter(|id| valid_game_id(id))
}

/// Value of `account=` in a query string
fn account_param(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "account")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Game id if the request head is `GET /games/{id}/state`
fn state_request(head: &str) -> Option<String> {
    let mut parts = head.lines().next()?.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let path = parts.next()?;
    let path = path.split('?').next()?;
    game_path(path.strip_suffix("/state")?).map(str::to_string)
}

/// Handle a single connection: a state fetch or a WebSocket session.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    directory: Arc<GameDirectory>,
) -> anyhow::Result<()> {
    let mut head = [0u8; 512];
    let n = stream.peek(&mut head).await?;
    if let Some(game_id) = state_request(&String::from_utf8_lossy(&head[..n])) {
        return serve_state(stream, &game_id, &directory).await;
    }

    let mut target = None;
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        let uri = request.uri();
        match game_path(uri.path()) {
            Some(game_id) => {
                target = Some((game_id.to_string(), account_param(uri.query())));
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some("unknown game path".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    })
    .await?;
    let Some((game_id, account)) = target else {
        return Ok(());
    };

    let session = Uuid::new_v4();
    info!(%session, %game_id, "New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // An actor that is shutting down refuses the connect; a retry starts a new one
    let connect = || Command::Connect {
        session,
        sender: tx.clone(),
        account: account.clone(),
    };
    let mut handle = directory.handle(&game_id);
    if handle.send(connect()).await.is_err() {
        handle = directory.handle(&game_id);
        handle.send(connect()).await?;
    }

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                        Ok(ClientMessage::Ping) => {}
                        Ok(message) => {
                            if handle.send(Command::Inbound { session, message }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!(%session, error = %e, "rejected message");
                            let _ = tx.send(ErrorReply::new(e).to_text());
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Client {} closing connection", session);
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error from {}: {}", session, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = handle.closed() => {
                warn!(%session, %game_id, "game actor stopped, closing session");
                break;
            }
        }
    }

    // Clean up on disconnect
    let _ = handle.send(Command::Disconnect { session }).await;
    send_task.abort();

    info!("Connection closed for {}", session);
    Ok(())
}

/// Answer `GET /games/{id}/state` with the full state JSON and close.
async fn serve_state(
    mut stream: TcpStream,
    game_id: &str,
    directory: &Arc<GameDirectory>,
) -> anyhow::Result<()> {
    // The request head was only peeked at; consume it before replying
    let mut request = [0u8; 2048];
    let _ = stream.read(&mut request).await?;

    let (status, body) = match directory.handle(game_id).fetch_state().await {
        Ok(json) => ("200 OK", json),
        Err(e) => ("503 Service Unavailable", ErrorReply::new(e).to_text()),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
