// Chat resources as served by the storefront backend, plus the hub method
// and event names the desk uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type SessionId = String;
pub type MessageId = String;

// ---------------------------------------------------------------------------
// Hub method names
// ---------------------------------------------------------------------------

pub const JOIN_ADMIN_GROUP: &str = "JoinAdminGroup";
pub const JOIN_SESSION: &str = "JoinSession";
pub const LEAVE_SESSION: &str = "LeaveSession";
pub const SEND_MESSAGE: &str = "SendMessage";

pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const NEW_SESSION: &str = "NewSession";
pub const SESSION_ESCALATED: &str = "SessionEscalated";

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderType {
    User,
    Guest,
    #[serde(rename = "AI")]
    Ai,
    Admin,
    System,
    #[serde(other)]
    Other,
}

impl SenderType {
    pub fn label(self) -> &'static str {
        match self {
            SenderType::User => "User",
            SenderType::Guest => "Guest",
            SenderType::Ai => "AI",
            SenderType::Admin => "Agent",
            SenderType::System => "System",
            SenderType::Other => "?",
        }
    }

    /// Whether the message came from the customer side of the conversation.
    pub fn is_customer(self) -> bool {
        matches!(self, SenderType::User | SenderType::Guest)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_type: SenderType,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Name to display for the sender.
    pub fn sender_display(&self) -> &str {
        self.sender_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.sender_type.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The AI assistant is answering.
    #[serde(rename = "AI")]
    Ai,
    /// A human agent owns the session.
    Human,
    /// The AI handed the session off and it awaits a human agent.
    Escalated,
    Closed,
    #[serde(other)]
    Other,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Ai => "AI",
            SessionStatus::Human => "Human",
            SessionStatus::Escalated => "Escalated",
            SessionStatus::Closed => "Closed",
            SessionStatus::Other => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub last_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

impl ChatSession {
    pub fn title(&self) -> String {
        match (&self.display_name, &self.user_id) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(user)) if !user.is_empty() => format!("User {user}"),
            _ => format!("Guest {}", short_id(&self.id)),
        }
    }
}

/// First eight characters of an identifier.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

// ---------------------------------------------------------------------------
// Server pushes
// ---------------------------------------------------------------------------

/// A server invocation the desk understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPush {
    MessageReceived(ChatMessage),
    SessionCreated(ChatSession),
    SessionEscalated(SessionId),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PushError {
    #[error("unknown hub event `{0}`")]
    UnknownTarget(String),
    #[error("hub event `{target}` has malformed arguments: {message}")]
    BadArguments { target: String, message: String },
}

impl ServerPush {
    /// Interpret a server invocation.
    pub fn from_invocation(target: &str, arguments: &[Value]) -> Result<Self, PushError> {
        let bad = |message: String| PushError::BadArguments {
            target: target.to_string(),
            message,
        };
        let first = || {
            arguments
                .first()
                .cloned()
                .ok_or_else(|| bad("missing argument".into()))
        };

        match target {
            RECEIVE_MESSAGE => serde_json::from_value(first()?)
                .map(ServerPush::MessageReceived)
                .map_err(|e| bad(e.to_string())),
            NEW_SESSION => serde_json::from_value(first()?)
                .map(ServerPush::SessionCreated)
                .map_err(|e| bad(e.to_string())),
            SESSION_ESCALATED => {
                // Either the bare id or an object carrying `sessionId`.
                let value = first()?;
                let id = match &value {
                    Value::String(id) => Some(id.clone()),
                    Value::Object(map) => map
                        .get("sessionId")
                        .or_else(|| map.get("id"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                };
                id.filter(|id| !id.is_empty())
                    .map(ServerPush::SessionEscalated)
                    .ok_or_else(|| bad(format!("expected a session id, got {value}")))
            }
            other => Err(PushError::UnknownTarget(other.to_string())),
        }
    }
}
