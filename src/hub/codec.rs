// JSON hub protocol codec.
//
// Every record on the wire is a JSON object followed by the ASCII record
// separator (0x1E). One WebSocket text frame can carry several records, and
// a record can in principle straddle frames, so decoding goes through a
// `FrameBuffer` that only yields complete records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Record separator terminating every JSON record.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name and version sent in the handshake request.
pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed hub record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hub record of type {kind} is missing `{field}`")]
    MissingField { kind: u8, field: &'static str },
}

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// A decoded hub protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side. A missing `invocation_id` means no
    /// completion is expected.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    StreamItem {
        invocation_id: String,
        item: Value,
    },
    /// Result of an invocation: `Ok(result)` or `Err(error message)`.
    Completion {
        invocation_id: String,
        outcome: Result<Value, String>,
    },
    CancelInvocation {
        invocation_id: String,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Any message type this client does not act on (stream invocations,
    /// acks, sequence messages).
    Other(u8),
}

const TYPE_INVOCATION: u8 = 1;
const TYPE_STREAM_ITEM: u8 = 2;
const TYPE_COMPLETION: u8 = 3;
const TYPE_STREAM_INVOCATION: u8 = 4;
const TYPE_CANCEL_INVOCATION: u8 = 5;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// Flat wire shape shared by every message type.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl From<&HubMessage> for RawMessage {
    fn from(msg: &HubMessage) -> Self {
        match msg {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => RawMessage {
                kind: TYPE_INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..Default::default()
            },
            HubMessage::StreamItem {
                invocation_id,
                item,
            } => RawMessage {
                kind: TYPE_STREAM_ITEM,
                invocation_id: Some(invocation_id.clone()),
                item: Some(item.clone()),
                ..Default::default()
            },
            HubMessage::Completion {
                invocation_id,
                outcome,
            } => {
                let (result, error) = match outcome {
                    Ok(value) => (Some(value.clone()), None),
                    Err(e) => (None, Some(e.clone())),
                };
                RawMessage {
                    kind: TYPE_COMPLETION,
                    invocation_id: Some(invocation_id.clone()),
                    result,
                    error,
                    ..Default::default()
                }
            }
            HubMessage::CancelInvocation { invocation_id } => RawMessage {
                kind: TYPE_CANCEL_INVOCATION,
                invocation_id: Some(invocation_id.clone()),
                ..Default::default()
            },
            HubMessage::Ping => RawMessage {
                kind: TYPE_PING,
                ..Default::default()
            },
            HubMessage::Close {
                error,
                allow_reconnect,
            } => RawMessage {
                kind: TYPE_CLOSE,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
                ..Default::default()
            },
            HubMessage::Other(kind) => RawMessage {
                kind: *kind,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<RawMessage> for HubMessage {
    type Error = CodecError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let kind = raw.kind;
        let require_id = |id: Option<String>| {
            id.ok_or(CodecError::MissingField {
                kind,
                field: "invocationId",
            })
        };

        let msg = match kind {
            TYPE_INVOCATION => HubMessage::Invocation {
                invocation_id: raw.invocation_id,
                target: raw.target.ok_or(CodecError::MissingField {
                    kind,
                    field: "target",
                })?,
                arguments: raw.arguments.unwrap_or_default(),
            },
            TYPE_STREAM_ITEM => HubMessage::StreamItem {
                invocation_id: require_id(raw.invocation_id)?,
                item: raw.item.unwrap_or(Value::Null),
            },
            TYPE_COMPLETION => HubMessage::Completion {
                invocation_id: require_id(raw.invocation_id)?,
                outcome: match raw.error {
                    Some(e) => Err(e),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                },
            },
            TYPE_CANCEL_INVOCATION => HubMessage::CancelInvocation {
                invocation_id: require_id(raw.invocation_id)?,
            },
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            TYPE_STREAM_INVOCATION => HubMessage::Other(kind),
            other => HubMessage::Other(other),
        };
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// The handshake request record (terminated).
pub fn handshake_request() -> String {
    let mut record = serde_json::json!({
        "protocol": PROTOCOL_NAME,
        "version": PROTOCOL_VERSION,
    })
    .to_string();
    record.push(RECORD_SEPARATOR);
    record
}

/// Parse a handshake response record body. `Ok(Some(err))` means the server
/// rejected the handshake.
pub fn parse_handshake_response(record: &str) -> Result<Option<String>, CodecError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    Ok(response.error)
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

/// Encode a message as a terminated record.
pub fn encode(msg: &HubMessage) -> Result<String, CodecError> {
    let mut record = serde_json::to_string(&RawMessage::from(msg))?;
    record.push(RECORD_SEPARATOR);
    Ok(record)
}

/// Decode a single record body (without the separator).
pub fn decode(record: &str) -> Result<HubMessage, CodecError> {
    let raw: RawMessage = serde_json::from_str(record)?;
    HubMessage::try_from(raw)
}

/// Accumulates text frames and yields complete records.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text frame.
    pub fn push(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Take the next complete record body, if one is buffered.
    pub fn next_record(&mut self) -> Option<String> {
        let end = self.pending.find(RECORD_SEPARATOR)?;
        let record = self.pending[..end].to_string();
        self.pending
            .replace_range(..end + RECORD_SEPARATOR.len_utf8(), "");
        Some(record)
    }

    /// Drain every complete record, decoding each one. Empty records are
    /// skipped.
    pub fn drain_messages(&mut self) -> Vec<Result<HubMessage, CodecError>> {
        let mut out = Vec::new();
        while let Some(record) = self.next_record() {
            if record.trim().is_empty() {
                continue;
            }
            out.push(decode(&record));
        }
        out
    }

    /// Bytes of an incomplete trailing record.
    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
