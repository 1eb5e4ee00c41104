// Notifications for activity outside the open session.

use std::collections::{HashSet, VecDeque};

use super::model::{short_id, ChatMessage, ChatSession, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NewMessage,
    NewSession,
    Escalation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub session_id: SessionId,
    pub title: String,
    pub body: String,
}

/// Longest message excerpt shown in a notification body.
const PREVIEW_CHARS: usize = 80;

impl Notification {
    pub fn new_message(msg: &ChatMessage, session: Option<&ChatSession>) -> Self {
        let who = session
            .map(ChatSession::title)
            .unwrap_or_else(|| format!("session {}", short_id(&msg.session_id)));
        Notification {
            kind: NotificationKind::NewMessage,
            session_id: msg.session_id.clone(),
            title: format!("New message from {who}"),
            body: preview(&msg.content),
        }
    }

    pub fn new_session(session: &ChatSession) -> Self {
        Notification {
            kind: NotificationKind::NewSession,
            session_id: session.id.clone(),
            title: "New chat session".to_string(),
            body: session.title(),
        }
    }

    pub fn escalation(session_id: &str, session: Option<&ChatSession>) -> Self {
        let who = session
            .map(ChatSession::title)
            .unwrap_or_else(|| format!("session {}", short_id(session_id)));
        Notification {
            kind: NotificationKind::Escalation,
            session_id: session_id.to_string(),
            title: "Session needs a human agent".to_string(),
            body: who,
        }
    }
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}

/// Remembers which notifications were already delivered so each key fires
/// once. Capacity-bounded: the oldest keys are forgotten first.
#[derive(Debug)]
pub struct NotificationGate {
    capacity: usize,
    order: VecDeque<(NotificationKind, String)>,
    seen: HashSet<(NotificationKind, String)>,
}

impl NotificationGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Returns `true` the first time `(kind, key)` is offered.
    pub fn first_time(&mut self, kind: NotificationKind, key: &str) -> bool {
        let entry = (kind, key.to_string());
        if self.seen.contains(&entry) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(entry.clone());
        self.order.push_back(entry);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}
