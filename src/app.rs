// Application orchestrator: owns the desk state and routes events between the
// hub supervisor, REST tasks, and the TUI.
//
// The loop never waits on the network. Hub invocations are queued in order
// and their completions awaited in spawned tasks; REST calls run in spawned
// tasks that report back over the `ApiEvent` channel.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::ChatBackend;
use crate::chat::model::{
    PushError, JOIN_ADMIN_GROUP, JOIN_SESSION, LEAVE_SESSION, SEND_MESSAGE,
};
use crate::chat::{ChatDesk, DeskAction, ServerPush};
use crate::config::Config;
use crate::hub::{HubClient, HubEvent};
use crate::protocol::{ApiEvent, ConnectionStatus, UiUpdate, UserCommand};

/// Agent actions on a session that go through the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    TakeOver,
    Close,
}

impl SessionAction {
    pub fn label(self) -> &'static str {
        match self {
            SessionAction::TakeOver => "take over",
            SessionAction::Close => "close",
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub desk: ChatDesk,
    pub hub: HubClient,
    pub backend: Arc<dyn ChatBackend>,
    /// Handed to spawned tasks so they can report back to the loop.
    pub api_tx: mpsc::Sender<ApiEvent>,
    pub connection_status: ConnectionStatus,
}

impl AppState {
    pub fn new(
        config: Config,
        hub: HubClient,
        backend: Arc<dyn ChatBackend>,
        api_tx: mpsc::Sender<ApiEvent>,
    ) -> Self {
        let desk = ChatDesk::new(config.notifications.history_capacity);
        Self {
            config,
            desk,
            hub,
            backend,
            api_tx,
            connection_status: ConnectionStatus::Connecting,
        }
    }

    fn invocation(&self, target: &'static str, arguments: Vec<Value>) -> Invocation {
        Invocation {
            hub: self.hub.clone(),
            api_tx: self.api_tx.clone(),
            target,
            arguments,
        }
    }

    fn fetch_sessions(&self) {
        let backend = Arc::clone(&self.backend);
        let api_tx = self.api_tx.clone();
        tokio::spawn(async move {
            let event = match backend.list_sessions().await {
                Ok(sessions) => ApiEvent::Sessions(sessions),
                Err(e) => ApiEvent::Failed {
                    context: "Loading sessions".into(),
                    message: e.to_string(),
                },
            };
            let _ = api_tx.send(event).await;
        });
    }

    fn fetch_history(&self, session_id: String, generation: u64) {
        let backend = Arc::clone(&self.backend);
        let api_tx = self.api_tx.clone();
        tokio::spawn(async move {
            let event = match backend.load_messages(&session_id).await {
                Ok(messages) => ApiEvent::History {
                    session_id,
                    generation,
                    messages,
                },
                Err(e) => ApiEvent::Failed {
                    context: format!("Loading history for {session_id}"),
                    message: e.to_string(),
                },
            };
            let _ = api_tx.send(event).await;
        });
    }

    fn session_action(&self, action: SessionAction, session_id: String) {
        let backend = Arc::clone(&self.backend);
        let api_tx = self.api_tx.clone();
        tokio::spawn(async move {
            let result = match action {
                SessionAction::TakeOver => backend.take_over(&session_id).await,
                SessionAction::Close => backend.close_session(&session_id).await,
            };
            let event = match result {
                Ok(()) => ApiEvent::ActionCompleted {
                    action: action.label(),
                    session_id,
                },
                Err(e) => ApiEvent::Failed {
                    context: format!("Failed to {} {session_id}", action.label()),
                    message: e.to_string(),
                },
            };
            let _ = api_tx.send(event).await;
        });
    }
}

/// A hub call waiting to be queued.
struct Invocation {
    hub: HubClient,
    api_tx: mpsc::Sender<ApiEvent>,
    target: &'static str,
    arguments: Vec<Value>,
}

impl Invocation {
    /// Queue the call (in order) and await its completion in the background.
    async fn dispatch(self) {
        let pending = match self.hub.submit(self.target, self.arguments).await {
            Ok(pending) => pending,
            Err(e) => {
                report_failure(&self.api_tx, self.target, e.to_string()).await;
                return;
            }
        };
        let api_tx = self.api_tx;
        tokio::spawn(async move {
            let target = pending.target().to_string();
            if let Err(e) = pending.outcome().await {
                report_failure(&api_tx, &target, e.to_string()).await;
            }
        });
    }
}

async fn report_failure(api_tx: &mpsc::Sender<ApiEvent>, target: &str, message: String) {
    warn!(target, "hub invocation failed: {message}");
    let _ = api_tx
        .send(ApiEvent::Failed {
            context: format!("Hub call {target}"),
            message,
        })
        .await;
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the application loop until the user quits or the hub channel closes.
pub async fn run(
    mut hub_rx: mpsc::Receiver<HubEvent>,
    mut api_rx: mpsc::Receiver<ApiEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // The state holds a sender, so this only closes if that is replaced.
    let mut api_open = true;

    loop {
        tokio::select! {
            // --- Hub events ---
            event = hub_rx.recv() => {
                match event {
                    Some(event) => handle_hub_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("Hub event channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Results of background REST / hub tasks ---
            event = api_rx.recv(), if api_open => {
                match event {
                    Some(event) => handle_api_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("API event channel closed");
                        api_open = false;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut state, cmd, &ui_tx).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.hub.stop().await;
    info!("Application event loop exiting");
    Ok(())
}

async fn set_status(state: &mut AppState, status: ConnectionStatus, ui_tx: &mpsc::Sender<UiUpdate>) {
    state.connection_status = status.clone();
    let _ = ui_tx.send(UiUpdate::ConnectionStatus(status)).await;
}

async fn send_sessions(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx
        .send(UiUpdate::Sessions(state.desk.sessions().to_vec()))
        .await;
}

async fn handle_hub_event(state: &mut AppState, event: HubEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    match event {
        HubEvent::Connected | HubEvent::Reconnected => {
            info!("Hub connection established, joining groups");
            set_status(state, ConnectionStatus::Connected, ui_tx).await;
            let actions = state.desk.on_connected();
            execute(state, actions, ui_tx).await;
        }
        HubEvent::Reconnecting {
            attempt,
            delay,
            reason,
        } => {
            info!(attempt, ?delay, "Hub reconnecting: {reason}");
            state.desk.on_disconnected();
            set_status(state, ConnectionStatus::Reconnecting { attempt, delay }, ui_tx).await;
        }
        HubEvent::Disconnected { reason } => {
            state.desk.on_disconnected();
            set_status(state, ConnectionStatus::Disconnected, ui_tx).await;
            if let Some(reason) = reason {
                warn!("Hub disconnected: {reason}");
                let _ = ui_tx
                    .send(UiUpdate::Error(format!("Disconnected from hub: {reason}")))
                    .await;
            }
        }
        HubEvent::Invocation { target, arguments } => {
            match ServerPush::from_invocation(&target, &arguments) {
                Ok(push) => handle_push(state, push, ui_tx).await,
                Err(PushError::UnknownTarget(target)) => {
                    debug!(target, "ignoring unknown hub event");
                }
                Err(e) => warn!("{e}"),
            }
        }
    }
}

async fn handle_push(state: &mut AppState, push: ServerPush, ui_tx: &mpsc::Sender<UiUpdate>) {
    match push {
        ServerPush::MessageReceived(msg) => {
            let before = state.desk.messages().len();
            let actions = state.desk.message_received(msg);
            if state.desk.messages().len() > before {
                if let Some(appended) = state.desk.messages().last() {
                    let _ = ui_tx.send(UiUpdate::MessageAppended(appended.clone())).await;
                }
                send_sessions(state, ui_tx).await;
            }
            if !actions.is_empty() {
                send_sessions(state, ui_tx).await;
            }
            execute(state, actions, ui_tx).await;
        }
        ServerPush::SessionCreated(session) => {
            info!(session_id = %session.id, "New chat session");
            let actions = state.desk.session_created(session);
            send_sessions(state, ui_tx).await;
            execute(state, actions, ui_tx).await;
        }
        ServerPush::SessionEscalated(session_id) => {
            info!(session_id, "Session escalated");
            let actions = state.desk.session_escalated(&session_id);
            if !actions.is_empty() {
                send_sessions(state, ui_tx).await;
            }
            execute(state, actions, ui_tx).await;
        }
    }
}

async fn handle_api_event(state: &mut AppState, event: ApiEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    match event {
        ApiEvent::Sessions(sessions) => {
            debug!(count = sessions.len(), "Sessions loaded");
            state.desk.sessions_loaded(sessions);
            send_sessions(state, ui_tx).await;
        }
        ApiEvent::History {
            session_id,
            generation,
            messages,
        } => {
            if state.desk.history_loaded(&session_id, generation, messages) {
                let _ = ui_tx
                    .send(UiUpdate::MessagesLoaded(state.desk.messages().to_vec()))
                    .await;
            }
        }
        ApiEvent::ActionCompleted { action, session_id } => {
            info!(session_id, "{action} completed");
            state.fetch_sessions();
        }
        ApiEvent::Failed { context, message } => {
            warn!("{context}: {message}");
            let _ = ui_tx.send(UiUpdate::Error(format!("{context}: {message}"))).await;
        }
    }
}

async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::SelectSession(session_id) => {
            let actions = state.desk.select_session(&session_id);
            if actions.is_empty() {
                return;
            }
            let _ = ui_tx.send(UiUpdate::SessionOpened(session_id)).await;
            send_sessions(state, ui_tx).await;
            execute(state, actions, ui_tx).await;
        }
        UserCommand::CloseView => {
            if state.desk.open_session().is_none() {
                return;
            }
            let actions = state.desk.close_view();
            let _ = ui_tx.send(UiUpdate::SessionClosed).await;
            execute(state, actions, ui_tx).await;
        }
        UserCommand::SendMessage(text) => match state.desk.compose(&text) {
            Ok(action) => execute(state, vec![action], ui_tx).await,
            Err(e) => {
                let _ = ui_tx.send(UiUpdate::Error(format!("Cannot send: {e}"))).await;
            }
        },
        UserCommand::RefreshSessions => state.fetch_sessions(),
        UserCommand::TakeOver(session_id) => state.session_action(SessionAction::TakeOver, session_id),
        UserCommand::CloseSession(session_id) => state.session_action(SessionAction::Close, session_id),
        UserCommand::Reconnect => {
            if state.connection_status == ConnectionStatus::Connected {
                debug!("Reconnect requested while connected, ignoring");
                return;
            }
            info!("Manual reconnect requested");
            if state.hub.reconnect().await.is_ok() {
                set_status(state, ConnectionStatus::Connecting, ui_tx).await;
            }
        }
        UserCommand::Quit => {
            // Handled in the main loop.
        }
    }
}

/// Carry out the side effects the desk asked for.
async fn execute(state: &AppState, actions: Vec<DeskAction>, ui_tx: &mpsc::Sender<UiUpdate>) {
    for action in actions {
        match action {
            DeskAction::JoinAdminGroup => {
                state.invocation(JOIN_ADMIN_GROUP, vec![]).dispatch().await;
            }
            DeskAction::JoinSession(id) => {
                state.invocation(JOIN_SESSION, vec![json!(id)]).dispatch().await;
            }
            DeskAction::LeaveSession(id) => {
                state.invocation(LEAVE_SESSION, vec![json!(id)]).dispatch().await;
            }
            DeskAction::Send {
                session_id,
                content,
            } => {
                state
                    .invocation(SEND_MESSAGE, vec![json!(session_id), json!(content)])
                    .dispatch()
                    .await;
            }
            DeskAction::FetchSessions => state.fetch_sessions(),
            DeskAction::FetchHistory {
                session_id,
                generation,
            } => state.fetch_history(session_id, generation),
            DeskAction::Notify(notification) => {
                let _ = ui_tx.send(UiUpdate::Notification(notification)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
