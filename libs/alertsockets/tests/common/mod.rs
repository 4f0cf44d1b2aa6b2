//! Common test utilities for AlertSockets integration tests
//!
//! A scripted notification server: every accepted connection reads the
//! bearer token, then follows the next [`Behavior`] in the script (the
//! last one repeats).

#![allow(dead_code)]

use alertsockets::{ConnectionStatus, NotificationSession};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the server does with one connection after reading the token
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Acknowledge and stay open, relaying pushed messages
    Accept,
    /// Answer the token with an error envelope carrying `status`
    Reject(u16),
    /// Acknowledge, then close with `code` and `reason`
    AcceptThenClose { code: u16, reason: String },
    /// Acknowledge, then drop the TCP stream without a close frame
    AcceptThenDrop,
}

pub fn ack() -> String {
    r#"{"error":false,"message":"authenticated","type":"AUTH","status":200}"#.to_string()
}

pub fn error_envelope(status: u16) -> String {
    format!(
        r#"{{"error":true,"message":"rejected","type":"AUTH","status":{}}}"#,
        status
    )
}

pub fn entity_update(id: &str, version: u32) -> String {
    format!(
        r#"{{"error":false,"message":"","type":"ENTITY_UPDATE","status":200,"version":{},"entity":{{"id":"{}","state":"acknowledged"}}}}"#,
        version, id
    )
}

#[derive(Default)]
struct Shared {
    tokens: Mutex<Vec<String>>,
    received: Mutex<Vec<String>>,
}

/// A scripted mock notification server
pub struct MockNotifyServer {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
    push_tx: broadcast::Sender<String>,
    shutdown: Arc<Notify>,
}

impl MockNotifyServer {
    /// Create and start a new mock server following `script`
    pub async fn start(script: Vec<Behavior>) -> Self {
        assert!(!script.is_empty(), "script needs at least one behavior");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());
        let (push_tx, _) = broadcast::channel(64);
        let shutdown = Arc::new(Notify::new());

        let accept_shared = Arc::clone(&shared);
        let accept_push = push_tx.clone();
        let accept_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            let script = Arc::new(script);
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shared = Arc::clone(&accept_shared);
                                let push_rx = accept_push.subscribe();
                                let script = Arc::clone(&script);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shared, script, push_rx).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = accept_shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shared,
            push_tx,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        shared: Arc<Shared>,
        script: Arc<Vec<Behavior>>,
        mut push_rx: broadcast::Receiver<String>,
    ) {
        let mut ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let token = match ws_stream.next().await {
            Some(Ok(Message::Text(token))) => token,
            _ => return,
        };

        let behavior = {
            let mut tokens = shared.tokens.lock();
            tokens.push(token);
            let index = (tokens.len() - 1).min(script.len() - 1);
            script[index].clone()
        };

        match behavior {
            Behavior::Accept => {
                if ws_stream.send(Message::Text(ack())).await.is_err() {
                    return;
                }
                loop {
                    tokio::select! {
                        msg = ws_stream.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => shared.received.lock().push(text),
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            }
                        }
                        pushed = push_rx.recv() => {
                            match pushed {
                                Ok(text) => {
                                    if ws_stream.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(broadcast::error::RecvError::Lagged(_)) => {}
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    }
                }
            }
            Behavior::Reject(status) => {
                let _ = ws_stream.send(Message::Text(error_envelope(status))).await;
                drain(&mut ws_stream).await;
            }
            Behavior::AcceptThenClose { code, reason } => {
                if ws_stream.send(Message::Text(ack())).await.is_err() {
                    return;
                }
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                let _ = ws_stream.send(Message::Close(Some(frame))).await;
                drain(&mut ws_stream).await;
            }
            Behavior::AcceptThenDrop => {
                let _ = ws_stream.send(Message::Text(ack())).await;
                drop(ws_stream);
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket/v1/connect", self.addr)
    }

    /// Push a frame to every accepted connection
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(text.into());
    }

    /// Tokens received, one per connection, in order
    pub fn tokens(&self) -> Vec<String> {
        self.shared.tokens.lock().clone()
    }

    /// Number of connections that sent a token
    pub fn connection_count(&self) -> usize {
        self.shared.tokens.lock().len()
    }

    /// Text frames received after authentication
    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockNotifyServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drain(ws_stream: &mut tokio_tungstenite::WebSocketStream<TcpStream>) {
    while let Some(Ok(msg)) = ws_stream.next().await {
        if msg.is_close() {
            break;
        }
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the session to report `status`
pub async fn wait_for_status(
    session: &NotificationSession,
    status: ConnectionStatus,
    timeout: Duration,
) -> bool {
    wait_until(timeout, || session.status() == status).await
}
