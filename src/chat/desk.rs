// The agent desk state machine.
//
// `ChatDesk` owns everything the dashboard knows about chat: the session
// list, the open conversation, and which messages/notifications were already
// seen. It performs no I/O. Every transition returns the `DeskAction`s the
// app must execute (hub invocations, REST fetches, notifications).

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use super::model::{ChatMessage, ChatSession, MessageId, SessionId, SessionStatus};
use super::notify::{Notification, NotificationGate, NotificationKind};

#[derive(Debug, Clone, PartialEq)]
pub enum DeskAction {
    JoinAdminGroup,
    JoinSession(SessionId),
    LeaveSession(SessionId),
    FetchSessions,
    /// Load a session's history. The result is only applied if `generation`
    /// is still current when it arrives.
    FetchHistory {
        session_id: SessionId,
        generation: u64,
    },
    Send {
        session_id: SessionId,
        content: String,
    },
    Notify(Notification),
}

#[derive(Debug, Error, PartialEq)]
pub enum DeskError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no session is open")]
    NoOpenSession,
}

#[derive(Debug)]
pub struct ChatDesk {
    sessions: Vec<ChatSession>,
    open: Option<SessionId>,
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
    generation: u64,
    connected: bool,
    gate: NotificationGate,
}

impl ChatDesk {
    pub fn new(notification_capacity: usize) -> Self {
        Self {
            sessions: Vec::new(),
            open: None,
            messages: Vec::new(),
            seen: HashSet::new(),
            generation: 0,
            connected: false,
            gate: NotificationGate::new(notification_capacity),
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn open_session(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // -- connection lifecycle ------------------------------------------------

    /// A connection (first or re-established) completed its handshake.
    /// Group membership does not survive a new connection, so both groups
    /// are joined again and the data is refetched.
    pub fn on_connected(&mut self) -> Vec<DeskAction> {
        self.connected = true;
        let mut actions = vec![DeskAction::JoinAdminGroup];
        if let Some(open) = self.open.clone() {
            actions.push(DeskAction::JoinSession(open));
        }
        actions.push(DeskAction::FetchSessions);
        if let Some(open) = self.open.clone() {
            self.generation += 1;
            actions.push(DeskAction::FetchHistory {
                session_id: open,
                generation: self.generation,
            });
        }
        info!(open = ?self.open, "desk connected, rejoining groups");
        actions
    }

    pub fn on_disconnected(&mut self) {
        self.connected = false;
    }

    // -- navigation -----------------------------------------------------------

    pub fn select_session(&mut self, id: &str) -> Vec<DeskAction> {
        if self.open.as_deref() == Some(id) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(prev) = self.open.take() {
            if self.connected {
                actions.push(DeskAction::LeaveSession(prev));
            }
        }

        self.messages.clear();
        self.seen.clear();
        self.generation += 1;
        self.open = Some(id.to_string());
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.unread_count = 0;
        }

        if self.connected {
            actions.push(DeskAction::JoinSession(id.to_string()));
        }
        actions.push(DeskAction::FetchHistory {
            session_id: id.to_string(),
            generation: self.generation,
        });
        debug!(session_id = id, generation = self.generation, "session selected");
        actions
    }

    pub fn close_view(&mut self) -> Vec<DeskAction> {
        let Some(prev) = self.open.take() else {
            return Vec::new();
        };
        self.messages.clear();
        self.seen.clear();
        self.generation += 1;
        if self.connected {
            vec![DeskAction::LeaveSession(prev)]
        } else {
            Vec::new()
        }
    }

    // -- data ----------------------------------------------------------------

    /// Apply a history response. Returns `false` when it was stale and
    /// ignored.
    pub fn history_loaded(
        &mut self,
        session_id: &str,
        generation: u64,
        history: Vec<ChatMessage>,
    ) -> bool {
        if self.open.as_deref() != Some(session_id) || generation != self.generation {
            debug!(
                session_id,
                generation,
                current = self.generation,
                "discarding stale history"
            );
            return false;
        }

        let mut seen = HashSet::with_capacity(history.len() + self.messages.len());
        let mut merged = Vec::with_capacity(history.len() + self.messages.len());
        for msg in history {
            if msg.session_id == session_id && seen.insert(msg.id.clone()) {
                merged.push(msg);
            }
        }
        // Pushes that arrived while the request was in flight.
        for msg in self.messages.drain(..) {
            if seen.insert(msg.id.clone()) {
                merged.push(msg);
            }
        }
        self.messages = merged;
        self.seen = seen;
        true
    }

    pub fn message_received(&mut self, msg: ChatMessage) -> Vec<DeskAction> {
        if self.open.as_deref() == Some(msg.session_id.as_str()) {
            if self.seen.insert(msg.id.clone()) {
                self.touch_session(&msg);
                self.messages.push(msg);
            } else {
                debug!(message_id = %msg.id, "duplicate message ignored");
            }
            return Vec::new();
        }

        let key = format!("{}/{}", msg.session_id, msg.id);
        if !self.gate.first_time(NotificationKind::NewMessage, &key) {
            return Vec::new();
        }
        self.touch_session(&msg);
        let notification = Notification::new_message(&msg, self.session(&msg.session_id));
        vec![DeskAction::Notify(notification), DeskAction::FetchSessions]
    }

    pub fn session_created(&mut self, session: ChatSession) -> Vec<DeskAction> {
        self.sessions.retain(|s| s.id != session.id);
        let notify = self.gate.first_time(NotificationKind::NewSession, &session.id);
        let notification = notify.then(|| Notification::new_session(&session));
        self.sessions.insert(0, session);
        notification.map(DeskAction::Notify).into_iter().collect()
    }

    pub fn session_escalated(&mut self, session_id: &str) -> Vec<DeskAction> {
        let transitioned = match self.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) if session.status == SessionStatus::Escalated => false,
            Some(session) => {
                session.status = SessionStatus::Escalated;
                true
            }
            // Unknown locally: fire once, the refresh will fill it in.
            None => self.gate.first_time(NotificationKind::Escalation, session_id),
        };
        if !transitioned {
            return Vec::new();
        }
        let notification = Notification::escalation(session_id, self.session(session_id));
        vec![DeskAction::Notify(notification), DeskAction::FetchSessions]
    }

    pub fn sessions_loaded(&mut self, mut sessions: Vec<ChatSession>) {
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(open) = &self.open {
            if let Some(session) = sessions.iter_mut().find(|s| &s.id == open) {
                session.unread_count = 0;
            }
        }
        self.sessions = sessions;
    }

    pub fn compose(&self, content: &str) -> Result<DeskAction, DeskError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DeskError::EmptyMessage);
        }
        let session_id = self.open.clone().ok_or(DeskError::NoOpenSession)?;
        Ok(DeskAction::Send {
            session_id,
            content: content.to_string(),
        })
    }

    fn touch_session(&mut self, msg: &ChatMessage) {
        let is_open = self.open.as_deref() == Some(msg.session_id.as_str());
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == msg.session_id) {
            session.last_message = Some(msg.content.clone());
            if msg.created_at > session.updated_at {
                session.updated_at = msg.created_at;
            }
            if !is_open && msg.sender_type.is_customer() {
                session.unread_count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::SenderType;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(session: &str, id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            session_id: session.into(),
            sender_type: SenderType::Guest,
            sender_name: None,
            content: format!("body of {id}"),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        }
    }

    fn session(id: &str, status: SessionStatus, minutes: i64) -> ChatSession {
        ChatSession {
            id: id.into(),
            user_id: None,
            display_name: Some(format!("Customer {id}")),
            status,
            last_message: None,
            updated_at: Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
                + Duration::minutes(minutes),
            unread_count: 0,
        }
    }

    fn ids(desk: &ChatDesk) -> Vec<&str> {
        desk.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn connected_desk() -> ChatDesk {
        let mut desk = ChatDesk::new(64);
        desk.on_connected();
        desk
    }

    fn notifications(actions: &[DeskAction]) -> Vec<&Notification> {
        actions
            .iter()
            .filter_map(|a| match a {
                DeskAction::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_connect_joins_admin_group_and_fetches_sessions() {
        let mut desk = ChatDesk::new(64);
        assert!(!desk.is_connected());
        let actions = desk.on_connected();
        assert!(desk.is_connected());
        assert_eq!(
            actions,
            vec![DeskAction::JoinAdminGroup, DeskAction::FetchSessions]
        );
    }

    #[test]
    fn reconnect_rejoins_open_session_and_refetches_history() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        desk.message_received(msg("s-1", "m-1"));
        desk.on_disconnected();
        assert!(!desk.is_connected());

        let actions = desk.on_connected();
        let generation = desk.generation();
        assert_eq!(
            actions,
            vec![
                DeskAction::JoinAdminGroup,
                DeskAction::JoinSession("s-1".into()),
                DeskAction::FetchSessions,
                DeskAction::FetchHistory {
                    session_id: "s-1".into(),
                    generation,
                },
            ]
        );
        // The visible list is kept across the reconnect.
        assert_eq!(ids(&desk), vec!["m-1"]);
    }

    #[test]
    fn duplicate_pushes_are_shown_once_in_first_received_order() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        for id in ["m-1", "m-2", "m-1", "m-3", "m-2", "m-2", "m-4", "m-3"] {
            assert!(desk.message_received(msg("s-1", id)).is_empty());
        }
        assert_eq!(ids(&desk), vec!["m-1", "m-2", "m-3", "m-4"]);
    }

    #[test]
    fn selecting_same_session_is_a_no_op() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        desk.message_received(msg("s-1", "m-1"));
        let generation = desk.generation();
        assert!(desk.select_session("s-1").is_empty());
        assert_eq!(desk.generation(), generation);
        assert_eq!(ids(&desk), vec!["m-1"]);
    }

    #[test]
    fn switching_sessions_leaves_clears_and_joins() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        desk.message_received(msg("s-1", "m-1"));

        let actions = desk.select_session("s-2");
        // Cleared before anything of the new session arrives.
        assert!(desk.messages().is_empty());
        assert_eq!(desk.open_session(), Some("s-2"));
        assert_eq!(
            actions,
            vec![
                DeskAction::LeaveSession("s-1".into()),
                DeskAction::JoinSession("s-2".into()),
                DeskAction::FetchHistory {
                    session_id: "s-2".into(),
                    generation: desk.generation(),
                },
            ]
        );

        // The seen set was reset too: an id reused by the new session shows.
        desk.message_received(msg("s-2", "m-1"));
        assert_eq!(ids(&desk), vec!["m-1"]);
    }

    #[test]
    fn selecting_while_offline_only_fetches_history() {
        let mut desk = ChatDesk::new(64);
        let actions = desk.select_session("s-1");
        assert_eq!(
            actions,
            vec![DeskAction::FetchHistory {
                session_id: "s-1".into(),
                generation: 1,
            }]
        );
    }

    #[test]
    fn stale_history_is_discarded() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        let old_generation = desk.generation();
        desk.select_session("s-2");

        // Response for a session that is no longer open.
        assert!(!desk.history_loaded("s-1", old_generation, vec![msg("s-1", "m-1")]));
        assert!(desk.messages().is_empty());

        // Response for the open session but from an older request.
        desk.select_session("s-1");
        assert!(!desk.history_loaded("s-1", old_generation, vec![msg("s-1", "m-1")]));
        assert!(desk.messages().is_empty());

        assert!(desk.history_loaded("s-1", desk.generation(), vec![msg("s-1", "m-1")]));
        assert_eq!(ids(&desk), vec!["m-1"]);
    }

    #[test]
    fn history_merges_with_pushes_received_in_flight() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        let generation = desk.generation();
        desk.message_received(msg("s-1", "m-3"));
        desk.message_received(msg("s-1", "m-4"));

        let history = vec![
            msg("s-1", "m-1"),
            msg("s-1", "m-2"),
            msg("s-1", "m-2"),
            msg("s-1", "m-3"),
            msg("s-9", "m-x"),
        ];
        assert!(desk.history_loaded("s-1", generation, history));
        assert_eq!(ids(&desk), vec!["m-1", "m-2", "m-3", "m-4"]);

        // Echo of something already in history stays deduplicated.
        desk.message_received(msg("s-1", "m-2"));
        assert_eq!(ids(&desk).len(), 4);
    }

    #[test]
    fn message_for_other_session_notifies_once_and_refreshes() {
        let mut desk = connected_desk();
        desk.sessions_loaded(vec![
            session("s-1", SessionStatus::Human, 0),
            session("s-2", SessionStatus::Ai, 1),
        ]);
        desk.select_session("s-1");
        desk.message_received(msg("s-1", "m-1"));

        let actions = desk.message_received(msg("s-2", "m-9"));
        assert_eq!(ids(&desk), vec!["m-1"]);
        let notes = notifications(&actions);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::NewMessage);
        assert_eq!(notes[0].session_id, "s-2");
        assert_eq!(
            actions
                .iter()
                .filter(|a| **a == DeskAction::FetchSessions)
                .count(),
            1
        );
        assert_eq!(desk.session("s-2").unwrap().unread_count, 1);
        assert_eq!(
            desk.session("s-2").unwrap().last_message.as_deref(),
            Some("body of m-9")
        );

        // Redelivery does nothing.
        assert!(desk.message_received(msg("s-2", "m-9")).is_empty());
        assert_eq!(ids(&desk), vec!["m-1"]);
    }

    #[test]
    fn messages_without_open_session_never_become_visible() {
        let mut desk = connected_desk();
        let actions = desk.message_received(msg("s-1", "m-1"));
        assert_eq!(notifications(&actions).len(), 1);
        assert!(desk.messages().is_empty());
    }

    #[test]
    fn close_view_leaves_group_and_drops_pending_history() {
        let mut desk = connected_desk();
        desk.select_session("s-1");
        let generation = desk.generation();
        desk.message_received(msg("s-1", "m-1"));

        assert_eq!(
            desk.close_view(),
            vec![DeskAction::LeaveSession("s-1".into())]
        );
        assert_eq!(desk.open_session(), None);
        assert!(desk.messages().is_empty());
        assert!(!desk.history_loaded("s-1", generation, vec![msg("s-1", "m-1")]));
        assert!(desk.close_view().is_empty());
    }

    #[test]
    fn new_session_is_upserted_at_top_and_notified_once() {
        let mut desk = connected_desk();
        desk.sessions_loaded(vec![
            session("s-1", SessionStatus::Ai, 0),
            session("s-2", SessionStatus::Ai, 5),
        ]);

        let actions = desk.session_created(session("s-3", SessionStatus::Ai, 10));
        assert_eq!(notifications(&actions).len(), 1);
        assert_eq!(desk.sessions()[0].id, "s-3");
        assert_eq!(desk.sessions().len(), 3);

        let actions = desk.session_created(session("s-3", SessionStatus::Ai, 11));
        assert!(actions.is_empty());
        assert_eq!(desk.sessions().len(), 3);
        assert_eq!(desk.sessions()[0].id, "s-3");
    }

    #[test]
    fn escalation_notifies_only_on_transition() {
        let mut desk = connected_desk();
        desk.sessions_loaded(vec![
            session("s-1", SessionStatus::Ai, 0),
            session("s-2", SessionStatus::Escalated, 1),
        ]);

        let actions = desk.session_escalated("s-1");
        assert_eq!(notifications(&actions).len(), 1);
        assert!(actions.contains(&DeskAction::FetchSessions));
        assert_eq!(desk.session("s-1").unwrap().status, SessionStatus::Escalated);

        assert!(desk.session_escalated("s-1").is_empty());
        assert!(desk.session_escalated("s-2").is_empty());

        // Unknown sessions fire once.
        assert_eq!(notifications(&desk.session_escalated("s-7")).len(), 1);
        assert!(desk.session_escalated("s-7").is_empty());
    }

    #[test]
    fn sessions_are_sorted_newest_first() {
        let mut desk = ChatDesk::new(64);
        desk.sessions_loaded(vec![
            session("old", SessionStatus::Ai, 0),
            session("new", SessionStatus::Ai, 30),
            session("mid", SessionStatus::Human, 10),
        ]);
        let order: Vec<_> = desk.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
    }

    #[test]
    fn compose_validates_content_and_open_session() {
        let mut desk = connected_desk();
        assert_eq!(desk.compose("hello"), Err(DeskError::NoOpenSession));
        desk.select_session("s-1");
        assert_eq!(desk.compose("   \n"), Err(DeskError::EmptyMessage));
        assert_eq!(
            desk.compose("  on its way  "),
            Ok(DeskAction::Send {
                session_id: "s-1".into(),
                content: "on its way".into(),
            })
        );
        // No optimistic append.
        assert!(desk.messages().is_empty());
    }

    // -- randomized sequences --------------------------------------------------

    use proptest::prelude::*;

    const SESSIONS: [&str; 3] = ["s-a", "s-b", "s-c"];

    #[derive(Debug, Clone)]
    enum Step {
        Push { session: usize, id: u8 },
        Select(usize),
        History { entries: Vec<(usize, u8)>, stale: bool },
        CloseView,
        Reconnect,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => (0..3usize, 0..8u8).prop_map(|(session, id)| Step::Push { session, id }),
            2 => (0..3usize).prop_map(Step::Select),
            2 => (prop::collection::vec((0..3usize, 0..8u8), 0..6), any::<bool>())
                .prop_map(|(entries, stale)| Step::History { entries, stale }),
            1 => Just(Step::CloseView),
            1 => Just(Step::Reconnect),
        ]
    }

    fn message_id(session: usize, id: u8) -> String {
        format!("{}:{id}", SESSIONS[session])
    }

    fn pushed(session: usize, id: u8) -> ChatMessage {
        msg(SESSIONS[session], &message_id(session, id))
    }

    proptest! {
        /// The visible list is always the first-occurrence order of the open
        /// session's messages since it was selected, merged with fresh
        /// history, and other sessions only ever notify once per message.
        #[test]
        fn visible_list_matches_first_received_order(
            steps in prop::collection::vec(step(), 0..60)
        ) {
            let mut desk = connected_desk();
            let mut open: Option<usize> = None;
            let mut expected: Vec<String> = Vec::new();
            let mut notified: HashSet<String> = HashSet::new();

            for next in steps {
                match next {
                    Step::Push { session, id } => {
                        let key = message_id(session, id);
                        let actions = desk.message_received(pushed(session, id));
                        if open == Some(session) {
                            prop_assert!(actions.is_empty());
                            if !expected.contains(&key) {
                                expected.push(key);
                            }
                        } else {
                            let first = notified.insert(key);
                            prop_assert_eq!(notifications(&actions).len(), usize::from(first));
                            prop_assert_eq!(
                                actions.contains(&DeskAction::FetchSessions),
                                first
                            );
                        }
                    }
                    Step::Select(session) => {
                        desk.select_session(SESSIONS[session]);
                        if open != Some(session) {
                            expected.clear();
                        }
                        open = Some(session);
                    }
                    Step::History { entries, stale } => {
                        let target = open.unwrap_or(0);
                        let generation = if stale {
                            desk.generation().wrapping_sub(1)
                        } else {
                            desk.generation()
                        };
                        let history = entries.iter().map(|&(s, id)| pushed(s, id)).collect();
                        let applied = desk.history_loaded(SESSIONS[target], generation, history);
                        prop_assert_eq!(applied, open.is_some() && !stale);
                        if applied {
                            let mut merged: Vec<String> = Vec::new();
                            for &(s, id) in &entries {
                                let key = message_id(s, id);
                                if s == target && !merged.contains(&key) {
                                    merged.push(key);
                                }
                            }
                            for key in expected.drain(..) {
                                if !merged.contains(&key) {
                                    merged.push(key);
                                }
                            }
                            expected = merged;
                        }
                    }
                    Step::CloseView => {
                        desk.close_view();
                        open = None;
                        expected.clear();
                    }
                    Step::Reconnect => {
                        desk.on_disconnected();
                        desk.on_connected();
                    }
                }

                let shown = ids(&desk);
                let want: Vec<&str> = expected.iter().map(String::as_str).collect();
                prop_assert_eq!(&shown, &want);
                let open_id = open.map(|s| SESSIONS[s]);
                for message in desk.messages() {
                    prop_assert_eq!(Some(message.session_id.as_str()), open_id);
                }
            }
        }
    }
}
