//! Authentication handshake
//!
//! Runs once per freshly opened transport: the raw bearer token goes
//! out as the very first frame, then the next inbound frame decides the
//! outcome. The reply is consumed here and never reaches listeners.

use crate::envelope::Envelope;
use crate::error::SessionError;
use crate::transport::{classify_frame, Inbound};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

/// Result of one handshake
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Reply decoded with `error: false`
    Accepted(Envelope),
    /// Reply decoded with `error: true`
    Rejected(Envelope),
    /// Transport closed before replying
    Closed { code: u16, reason: String },
    /// Send failed, reply undecodable, or transport errored
    Failed(SessionError),
}

/// Send `token` and wait for the server's verdict
pub async fn authenticate<W, R>(write: &mut W, read: &mut R, token: &str) -> HandshakeOutcome
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    if let Err(e) = write.send(Message::Text(token.to_string())).await {
        return HandshakeOutcome::Failed(SessionError::WebSocket(format!(
            "Failed to send credential: {}",
            e
        )));
    }
    debug!("Sent credential, awaiting acknowledgement");

    await_reply(read).await
}

/// Resolve on the first meaningful inbound frame
pub async fn await_reply<R>(read: &mut R) -> HandshakeOutcome
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match classify_frame(read.next().await) {
            Inbound::Text(text) => return classify_reply(&text),
            Inbound::Skip => continue,
            Inbound::Closed { code, reason } => return HandshakeOutcome::Closed { code, reason },
            Inbound::Failed(e) => return HandshakeOutcome::Failed(SessionError::WebSocket(e)),
        }
    }
}

/// Decide the outcome from the reply text
pub fn classify_reply(text: &str) -> HandshakeOutcome {
    match Envelope::decode(text) {
        Ok(envelope) if envelope.error => HandshakeOutcome::Rejected(envelope),
        Ok(envelope) => HandshakeOutcome::Accepted(envelope),
        Err(e) => HandshakeOutcome::Failed(e),
    }
}
