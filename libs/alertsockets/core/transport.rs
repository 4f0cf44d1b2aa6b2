//! Transport handle
//!
//! One tokio task per connection attempt owns the WebSocket stream:
//!
//! ```text
//! ┌──────────────────────────┐   TaggedEvent (generation, event)
//! │  Transport task          │ ─────────────────────────────────> Session driver
//! │  connect → handshake →   │
//! │  read / write loop       │ <───────────────────────────────── Outbound (text, close)
//! └──────────────────────────┘
//! ```
//!
//! Every event carries the generation of the handle that produced it, so
//! the driver can ignore anything from a handle it already released.

use crate::connection_state::SessionMetrics;
use crate::error::{Result, SessionError};
use crate::handshake::{self, HandshakeOutcome};
use crate::envelope::Envelope;
use crate::machine::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, warn};

/// Close code reported when a close frame carries no status
const CLOSE_NO_STATUS: u16 = 1005;

/// Events reported by a transport task
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw transport is open, handshake starting
    Opened,
    /// Server accepted the credential
    Authenticated(Envelope),
    /// Server rejected the credential
    Rejected(Envelope),
    /// Inbound text frame after a successful handshake
    Message(String),
    /// Transport closed
    Closed { code: u16, reason: String },
    /// Transport-level error
    Error(String),
}

#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Classification of one read from the stream
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Skip,
    Closed { code: u16, reason: String },
    Failed(String),
}

/// Map a raw stream item to what the session cares about
pub fn classify_frame(item: Option<std::result::Result<Message, tungstenite::Error>>) -> Inbound {
    match item {
        Some(Ok(Message::Text(text))) => Inbound::Text(text),
        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
            Ok(text) => Inbound::Text(text),
            Err(_) => {
                warn!("Ignoring non UTF-8 binary frame");
                Inbound::Skip
            }
        },
        Some(Ok(Message::Close(frame))) => match frame {
            Some(frame) => Inbound::Closed {
                code: u16::from(frame.code),
                reason: frame.reason.into_owned(),
            },
            None => Inbound::Closed {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        },
        Some(Ok(_)) => Inbound::Skip,
        Some(Err(tungstenite::Error::ConnectionClosed))
        | Some(Err(tungstenite::Error::AlreadyClosed))
        | Some(Err(tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)))
        | None => Inbound::Closed {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        },
        Some(Err(e)) => Inbound::Failed(e.to_string()),
    }
}

/// The single live connection owned by the session driver
pub struct TransportHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Open a transport to `url` and authenticate with `token`
    pub fn spawn(
        generation: u64,
        url: String,
        token: String,
        events: mpsc::UnboundedSender<TaggedEvent>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            run_transport(generation, url, token, outbound_rx, events, metrics).await;
        });

        Self {
            generation,
            outbound,
            task,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame
    pub fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|e| SessionError::ChannelSend(e.to_string()))
    }

    /// Close the connection and let the task wind down
    ///
    /// The task sends a normal close frame if the socket is up. A task
    /// still stuck in connect or handshake exits on the same signal.
    pub fn release(self) {
        debug!("Releasing transport generation {}", self.generation);
        if self.outbound.send(Outbound::Close).is_err() {
            // Task already finished
            self.task.abort();
        }
    }
}

async fn run_transport(
    generation: u64,
    url: String,
    token: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    metrics: Arc<SessionMetrics>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(TaggedEvent { generation, event });
    };

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => Some(result),
        _ = outbound_rx.recv() => None,
    };

    let ws_stream = match connected {
        Some(Ok((ws_stream, _))) => ws_stream,
        Some(Err(e)) => {
            error!("Failed to connect to {}: {}", url, e);
            emit(TransportEvent::Error(e.to_string()));
            return;
        }
        None => {
            debug!("Transport released while connecting");
            return;
        }
    };

    debug!("Connected to {}", url);
    emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    let outcome = tokio::select! {
        outcome = handshake::authenticate(&mut write, &mut read, &token) => Some(outcome),
        _ = outbound_rx.recv() => None,
    };

    match outcome {
        Some(HandshakeOutcome::Accepted(reply)) => {
            metrics.increment_sent();
            emit(TransportEvent::Authenticated(reply));
        }
        Some(HandshakeOutcome::Rejected(reply)) => {
            metrics.increment_sent();
            emit(TransportEvent::Rejected(reply));
        }
        Some(HandshakeOutcome::Closed { code, reason }) => {
            emit(TransportEvent::Closed { code, reason });
            return;
        }
        Some(HandshakeOutcome::Failed(e)) => {
            emit(TransportEvent::Error(e.to_string()));
            return;
        }
        None => {
            debug!("Transport released during handshake");
            let _ = write.send(normal_close()).await;
            return;
        }
    }

    loop {
        tokio::select! {
            frame = read.next() => {
                match classify_frame(frame) {
                    Inbound::Text(text) => {
                        metrics.increment_received();
                        emit(TransportEvent::Message(text));
                    }
                    Inbound::Skip => {}
                    Inbound::Closed { code, reason } => {
                        debug!("Socket closed by peer with code {}", code);
                        emit(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Inbound::Failed(e) => {
                        error!("WebSocket error: {}", e);
                        emit(TransportEvent::Error(e));
                        return;
                    }
                }
            }

            command = outbound_rx.recv() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            error!("Failed to send frame: {}", e);
                            emit(TransportEvent::Error(e.to_string()));
                            return;
                        }
                        metrics.increment_sent();
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(normal_close()).await;
                        return;
                    }
                }
            }
        }
    }
}

fn normal_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(CLOSE_NORMAL),
        reason: "".into(),
    }))
}
