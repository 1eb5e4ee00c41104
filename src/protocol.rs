// Messages exchanged between the app loop, its background tasks, and the TUI.

use std::time::Duration;

use crate::chat::{ChatMessage, ChatSession, Notification, SessionId};

/// Hub connection state as shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    Disconnected,
}

/// App loop -> TUI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    ConnectionStatus(ConnectionStatus),
    Sessions(Vec<ChatSession>),
    /// A session was opened; its message list starts empty.
    SessionOpened(SessionId),
    SessionClosed,
    /// Replace the visible message list.
    MessagesLoaded(Vec<ChatMessage>),
    MessageAppended(ChatMessage),
    Notification(Notification),
    Error(String),
}

/// TUI -> app loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    SelectSession(SessionId),
    CloseView,
    SendMessage(String),
    RefreshSessions,
    TakeOver(SessionId),
    CloseSession(SessionId),
    Reconnect,
    Quit,
}

/// Results of REST calls spawned by the app loop.
#[derive(Debug)]
pub enum ApiEvent {
    Sessions(Vec<ChatSession>),
    History {
        session_id: SessionId,
        generation: u64,
        messages: Vec<ChatMessage>,
    },
    /// An agent action (take over / close) succeeded; the list is stale.
    ActionCompleted { action: &'static str, session_id: SessionId },
    Failed { context: String, message: String },
}
