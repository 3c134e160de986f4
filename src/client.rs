//! Client channel: the wire frames exchanged with the presentation layer and
//! the sink sessions write them to.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{AppError, Result};

/// Frame sent from the host to the client for one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// The session's engine is running and commands may be sent.
    Open,
    /// The session has ended. `code` is the engine exit code, the code the
    /// client closed with, or `-100` when the engine could not be started.
    Close {
        /// Close code.
        code: Option<i32>,
        /// Spawn failure message.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A reply for one of the session's requests.
    Message {
        /// The reply object.
        data: Value,
    },
}

/// Frame addressed to one session, as written to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outbound {
    /// Target session id.
    pub session: String,
    /// Frame payload.
    #[serde(flatten)]
    pub frame: ClientFrame,
}

/// Event received from the client for one session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Start a session with the given id.
    Connect,
    /// A command for the session.
    Message {
        /// The command, either inline or as an encoded JSON string.
        data: Value,
    },
    /// End the session.
    Close {
        /// Code to report back in the close notice.
        #[serde(default)]
        code: Option<i32>,
    },
}

impl ClientEvent {
    /// Command payload of a `message` event, decoding string-encoded data.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the payload is a string that is not
    /// valid JSON.
    pub fn command_value(data: Value) -> Result<Value> {
        match data {
            Value::String(raw) => serde_json::from_str(&raw)
                .map_err(|err| AppError::Protocol(format!("malformed command: {err}"))),
            other => Ok(other),
        }
    }
}

/// One inbound line: a session id plus the event for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Session the event is addressed to.
    pub session: String,
    /// The event.
    pub event: ClientEvent,
}

impl Inbound {
    /// Decode one line of the client channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the line is not a JSON object with
    /// a string `session` and a known `type`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields: Map<String, Value> = serde_json::from_str(line)
            .map_err(|err| AppError::Protocol(format!("malformed client frame: {err}")))?;

        let session = match fields.remove("session") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => return Err(AppError::Protocol("client frame is missing `session`".into())),
        };

        let event = serde_json::from_value(Value::Object(fields))
            .map_err(|err| AppError::Protocol(format!("unknown client event: {err}")))?;

        Ok(Self { session, event })
    }
}

/// Destination for frames produced by sessions.
///
/// Sending never blocks; a sink whose client has gone away drops frames.
pub trait ClientSink: Send + Sync + fmt::Debug {
    /// Deliver `frame` for `session_id`.
    fn send(&self, session_id: &str, frame: ClientFrame);
}

/// [`ClientSink`] backed by an unbounded channel, drained by the transport's
/// writer task (or by a test).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    /// Create a sink and the receiver its frames arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ClientSink for ChannelSink {
    fn send(&self, session_id: &str, frame: ClientFrame) {
        let outbound = Outbound {
            session: session_id.to_owned(),
            frame,
        };
        if self.tx.send(outbound).is_err() {
            debug!(session_id, "client channel closed, dropping frame");
        }
    }
}
