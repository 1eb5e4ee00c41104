// Keyboard input handling.
//
// Translates crossterm key events into `UserCommand`s for the app loop, or
// into local `ViewState` changes (cursor movement, composing, scrolling).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::ViewState;
use crate::protocol::UserCommand;

/// Lines moved by PageUp/PageDown in the conversation.
const PAGE: usize = 10;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app loop, `None` when it was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // Some terminals report releases too.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    if view_state.confirm_quit {
        return handle_confirm_quit(key_event, view_state);
    }

    if view_state.compose_mode {
        return handle_compose(key_event, view_state);
    }

    match key_event.code {
        KeyCode::Down | KeyCode::Char('j') => {
            let last = view_state.sessions.len().saturating_sub(1);
            view_state.session_cursor = (view_state.session_cursor + 1).min(last);
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            view_state.session_cursor = view_state.session_cursor.saturating_sub(1);
            None
        }
        KeyCode::PageUp => {
            view_state.message_scroll = view_state.message_scroll.saturating_add(PAGE);
            None
        }
        KeyCode::PageDown => {
            view_state.message_scroll = view_state.message_scroll.saturating_sub(PAGE);
            None
        }
        KeyCode::Enter => view_state
            .highlighted_session()
            .map(|s| UserCommand::SelectSession(s.id.clone())),
        KeyCode::Char('i') => {
            if view_state.open_session.is_some() {
                view_state.compose_mode = true;
            }
            None
        }
        KeyCode::Char('r') => Some(UserCommand::RefreshSessions),
        KeyCode::Char('R') => Some(UserCommand::Reconnect),
        KeyCode::Char('t') => action_target(view_state).map(UserCommand::TakeOver),
        KeyCode::Char('x') => action_target(view_state).map(UserCommand::CloseSession),
        KeyCode::Esc => view_state
            .open_session
            .is_some()
            .then_some(UserCommand::CloseView),
        KeyCode::Char('q') => {
            view_state.confirm_quit = true;
            None
        }
        _ => None,
    }
}

/// Session that `t`/`x` act on: the open one, else the highlighted row.
fn action_target(view_state: &ViewState) -> Option<String> {
    view_state
        .open_session
        .clone()
        .or_else(|| view_state.highlighted_session().map(|s| s.id.clone()))
}

fn handle_confirm_quit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('q') => Some(UserCommand::Quit),
        KeyCode::Char('n') | KeyCode::Esc => {
            view_state.confirm_quit = false;
            None
        }
        _ => None,
    }
}

fn handle_compose(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Esc => {
            view_state.compose_mode = false;
            None
        }
        KeyCode::Enter => {
            if view_state.compose_text.trim().is_empty() {
                return None;
            }
            Some(UserCommand::SendMessage(std::mem::take(
                &mut view_state.compose_text,
            )))
        }
        KeyCode::Backspace => {
            view_state.compose_text.pop();
            None
        }
        KeyCode::Char(c) => {
            view_state.compose_text.push(c);
            None
        }
        _ => None,
    }
}
