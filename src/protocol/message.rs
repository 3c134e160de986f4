//! Typed engine messages.
//!
//! Requests are a closed set and are modelled as a serde-tagged enum.
//! Replies are relayed to the client verbatim, so [`Reply`] keeps the raw
//! field map and only lifts out the `type` tag; [`Frame`] then marks each
//! reply as continuing or terminal once, at decode time.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{AppError, Result};

// ── Requests (host → engine) ──────────────────────────────────────────────────

/// Conversion request with the accumulated session settings.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub request_id: String,
    pub anonymous_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_type: String,
    pub input_to_output_dimension: Option<Value>,
    pub mappings: Option<Value>,
    pub nbt_settings: Option<Value>,
    pub pruning_list: Option<Value>,
    pub copy_nbt: bool,
    pub skip_maps: bool,
    pub skip_loot_tables: bool,
    pub skip_item_conversion: bool,
    pub custom_identifiers: bool,
    pub skip_block_connections: bool,
    pub enable_compact: bool,
    pub discard_empty_chunks: bool,
    pub prevent_y_biome_blending: bool,
}

/// Request written to the engine's stdin, one per line.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Detect the format and version of the staged input world.
    #[serde(rename_all = "camelCase")]
    DetectVersion {
        request_id: String,
        anonymous_id: String,
        input_path: PathBuf,
    },
    /// Write the world's editable settings document into `output_path`.
    #[serde(rename_all = "camelCase")]
    Settings {
        request_id: String,
        anonymous_id: String,
        input_path: PathBuf,
        output_path: PathBuf,
    },
    /// Render a binary map preview into `output_path`.
    #[serde(rename_all = "camelCase")]
    Preview {
        request_id: String,
        anonymous_id: String,
        input_path: PathBuf,
        output_path: PathBuf,
    },
    /// Convert the staged world.
    Convert(ConvertRequest),
    /// Ask the engine to cancel the task started by `request_id`.
    #[serde(rename_all = "camelCase")]
    Kill {
        request_id: String,
        anonymous_id: String,
    },
}

impl WorkerRequest {
    /// Correlation id of the request.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::DetectVersion { request_id, .. }
            | Self::Settings { request_id, .. }
            | Self::Preview { request_id, .. }
            | Self::Kill { request_id, .. } => request_id,
            Self::Convert(convert) => &convert.request_id,
        }
    }

    /// Serialize the request as a single JSON line without the delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if serialization fails (for example a
    /// path that is not valid UTF-8).
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Protocol(format!("failed to serialise request: {e}")))
    }
}

// ── Replies (engine → host → client) ─────────────────────────────────────────

/// Reply `type` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Response,
    Error,
    Progress,
    ProgressState,
    QueuePosition,
    /// Any tag the host does not know; treated as terminal.
    Other(String),
}

impl ReplyKind {
    /// Parse a wire tag.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "response" => Self::Response,
            "error" => Self::Error,
            "progress" => Self::Progress,
            "progress_state" => Self::ProgressState,
            "queue_position" => Self::QueuePosition,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Response => "response",
            Self::Error => "error",
            Self::Progress => "progress",
            Self::ProgressState => "progress_state",
            Self::QueuePosition => "queue_position",
            Self::Other(tag) => tag,
        }
    }

    /// Whether a reply of this kind keeps its request open.
    #[must_use]
    pub fn is_continuing(&self) -> bool {
        matches!(self, Self::Progress | Self::ProgressState)
    }
}

/// One reply object. Every field other than `type` is kept as received.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub fields: Map<String, Value>,
}

impl Reply {
    /// Build a reply of `kind` for `request_id` with no other fields.
    #[must_use]
    pub fn new(kind: ReplyKind, request_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("requestId".into(), Value::String(request_id.to_owned()));
        Self { kind, fields }
    }

    /// Plain success reply.
    #[must_use]
    pub fn response(request_id: &str) -> Self {
        Self::new(ReplyKind::Response, request_id)
    }

    /// Terminal error reply with an optional diagnostic trace.
    #[must_use]
    pub fn error(request_id: &str, message: &str, trace: Option<String>) -> Self {
        let mut reply = Self::new(ReplyKind::Error, request_id);
        reply.set("error", Value::String(message.to_owned()));
        if let Some(trace) = trace {
            reply.set("stackTrace", Value::String(trace));
        }
        reply
    }

    /// Determinate progress update; `fraction` is in `0.0..=1.0`.
    #[must_use]
    pub fn progress(request_id: &str, fraction: f64) -> Self {
        let mut reply = Self::new(ReplyKind::Progress, request_id);
        reply.set("percentage", Value::from(fraction));
        reply.set("continue", Value::Bool(true));
        reply
    }

    /// Animated progress state, optionally naming the current phase.
    #[must_use]
    pub fn progress_state(request_id: &str, fraction: f64, name: Option<&str>) -> Self {
        let mut reply = Self::new(ReplyKind::ProgressState, request_id);
        reply.set("percentage", Value::from(fraction));
        reply.set("animated", Value::Bool(true));
        if let Some(name) = name {
            reply.set("name", Value::String(name.to_owned()));
        }
        reply.set("continue", Value::Bool(true));
        reply
    }

    /// Decode a reply from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the value is not an object with a
    /// string `type` field.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(AppError::Protocol("reply is not a json object".into()));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(tag)) => ReplyKind::parse(&tag),
            Some(other) => {
                return Err(AppError::Protocol(format!(
                    "reply `type` must be a string, got {other}"
                )))
            }
            None => return Err(AppError::Protocol("reply is missing `type`".into())),
        };

        Ok(Self { kind, fields })
    }

    /// Re-encode the reply, restoring the `type` tag.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("type".into(), Value::String(self.kind.as_str().to_owned()));
        Value::Object(fields)
    }

    /// Correlation id, when the reply carries a string `requestId`.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.fields.get("requestId").and_then(Value::as_str)
    }

    /// Read a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set or replace a field.
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_owned(), value);
    }

    /// Edit `output` as an object; a missing or non-object output starts empty.
    pub fn edit_output(&mut self, edit: impl FnOnce(&mut Map<String, Value>)) {
        let mut output = match self.fields.remove("output") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        edit(&mut output);
        self.fields.insert("output".into(), Value::Object(output));
    }
}

/// A reply classified for correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Progress-style reply; the request stays open.
    Continuing(Reply),
    /// Final reply for its request id.
    Terminal(Reply),
}

impl Frame {
    /// Classify a reply by its kind. Continuing replies are stamped with
    /// `continue: true` so the client keeps listening.
    #[must_use]
    pub fn classify(mut reply: Reply) -> Self {
        if reply.kind.is_continuing() {
            reply.set("continue", Value::Bool(true));
            Self::Continuing(reply)
        } else {
            Self::Terminal(reply)
        }
    }

    /// The underlying reply.
    #[must_use]
    pub fn reply(&self) -> &Reply {
        match self {
            Self::Continuing(reply) | Self::Terminal(reply) => reply,
        }
    }

    /// Unwrap into the underlying reply.
    #[must_use]
    pub fn into_reply(self) -> Reply {
        match self {
            Self::Continuing(reply) | Self::Terminal(reply) => reply,
        }
    }

    /// Whether this frame ends its request.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Decode one inbound line into a [`Frame`].
///
/// # Return value
///
/// - `Ok(Some(frame))`: the line is a JSON object with a string `type`.
/// - `Ok(None)`: the line is empty or whitespace.
///
/// # Errors
///
/// - [`AppError::Protocol`]`("malformed json: …")`: not valid JSON.
/// - [`AppError::Protocol`]: valid JSON that is not a reply object.
pub fn decode_line(line: &str) -> Result<Option<Frame>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)
        .map_err(|e| AppError::Protocol(format!("malformed json: {e}")))?;

    Reply::from_value(value).map(|reply| Some(Frame::classify(reply)))
}
