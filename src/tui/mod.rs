// TUI dashboard: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors what the app loop reports. The app
// pushes `UiUpdate` messages over an mpsc channel; the TUI applies them to
// `ViewState` and re-renders at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::io::Write;
use std::time::{Duration, Instant};

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;
use tracing::debug;

use crate::chat::{ChatMessage, ChatSession, SessionId};
use crate::protocol::{ConnectionStatus, UiUpdate, UserCommand};

use layout::build_layout;

/// How long a toast stays in the help bar.
const TOAST_TTL: Duration = Duration::from_secs(6);

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub text: String,
    pub is_error: bool,
    pub shown_at: Instant,
}

impl Toast {
    pub fn is_fresh(&self) -> bool {
        self.shown_at.elapsed() < TOAST_TTL
    }
}

/// TUI-local state mirroring the desk for rendering.
pub struct ViewState {
    pub connection_status: ConnectionStatus,
    pub agent_name: String,
    pub sessions: Vec<ChatSession>,
    /// Highlighted row in the session list.
    pub session_cursor: usize,
    pub open_session: Option<SessionId>,
    pub messages: Vec<ChatMessage>,
    /// Lines scrolled up from the newest message. 0 follows the tail.
    pub message_scroll: usize,
    pub compose_mode: bool,
    pub compose_text: String,
    pub toast: Option<Toast>,
    pub bell_enabled: bool,
    /// Set when a notification arrived and the bell has not rung yet.
    pub pending_bell: bool,
    pub confirm_quit: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            connection_status: ConnectionStatus::default(),
            agent_name: String::new(),
            sessions: Vec::new(),
            session_cursor: 0,
            open_session: None,
            messages: Vec::new(),
            message_scroll: 0,
            compose_mode: false,
            compose_text: String::new(),
            toast: None,
            bell_enabled: false,
            pending_bell: false,
            confirm_quit: false,
        }
    }
}

impl ViewState {
    pub fn new(agent_name: impl Into<String>, bell_enabled: bool) -> Self {
        ViewState {
            agent_name: agent_name.into(),
            bell_enabled,
            ..Default::default()
        }
    }

    pub fn highlighted_session(&self) -> Option<&ChatSession> {
        self.sessions.get(self.session_cursor)
    }

    pub fn open_session_info(&self) -> Option<&ChatSession> {
        let open = self.open_session.as_deref()?;
        self.sessions.iter().find(|s| s.id == open)
    }

    fn show_toast(&mut self, text: String, is_error: bool) {
        self.toast = Some(Toast {
            text,
            is_error,
            shown_at: Instant::now(),
        });
    }
}

/// Apply an update from the app loop.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::ConnectionStatus(status) => {
            state.connection_status = status;
        }
        UiUpdate::Sessions(sessions) => {
            // Keep the cursor on the same session when the list reorders.
            let highlighted = state.highlighted_session().map(|s| s.id.clone());
            state.sessions = sessions;
            state.session_cursor = highlighted
                .and_then(|id| state.sessions.iter().position(|s| s.id == id))
                .unwrap_or(state.session_cursor)
                .min(state.sessions.len().saturating_sub(1));
        }
        UiUpdate::SessionOpened(id) => {
            state.open_session = Some(id);
            state.messages.clear();
            state.message_scroll = 0;
        }
        UiUpdate::SessionClosed => {
            state.open_session = None;
            state.messages.clear();
            state.message_scroll = 0;
            state.compose_mode = false;
        }
        UiUpdate::MessagesLoaded(messages) => {
            state.messages = messages;
        }
        UiUpdate::MessageAppended(msg) => {
            if state.open_session.as_deref() == Some(msg.session_id.as_str()) {
                state.messages.push(msg);
            }
        }
        UiUpdate::Notification(notification) => {
            state.show_toast(
                format!("{}: {}", notification.title, notification.body),
                false,
            );
            if state.bell_enabled {
                state.pending_bell = true;
            }
        }
        UiUpdate::Error(message) => {
            state.show_toast(message, true);
        }
    }
}

/// Render the full dashboard.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());
    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::session_list::render(frame, layout.sessions, state);
    widgets::conversation::render(frame, layout.conversation, state);
    widgets::composer::render(frame, layout.composer, state);
    widgets::help_bar::render(frame, layout.help_bar, state);

    if state.confirm_quit {
        widgets::quit_confirm::render(frame, frame.area());
    }
}

fn ring_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

/// Run the TUI until the user quits or the app loop goes away.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    mut view_state: ViewState,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    // Restore the terminal before the default panic output.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        ratatui::restore();
        original_hook(panic_info);
    }));

    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(update) => {
                        apply_ui_update(&mut view_state, update);
                        if view_state.pending_bell {
                            view_state.pending_bell = false;
                            ring_bell();
                        }
                    }
                    None => break,
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("terminal input error: {e}");
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                    None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    ratatui::restore();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
