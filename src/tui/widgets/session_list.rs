// Session list widget: every known chat session, newest first.
//
// Each row: "{marker} {title} [{status}] ({unread})" followed by a dimmed
// preview of the last message. The highlighted row follows the cursor; the
// open session is marked with `▶`.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::chat::{ChatSession, SessionStatus};
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Sessions ({})", state.sessions.len()));

    if state.sessions.is_empty() {
        let paragraph = Paragraph::new("  No sessions yet.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = state
        .sessions
        .iter()
        .map(|session| {
            let open = state.open_session.as_deref() == Some(session.id.as_str());
            session_item(session, open)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    let mut list_state = ListState::default().with_selected(Some(state.session_cursor));
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn session_item(session: &ChatSession, open: bool) -> ListItem<'static> {
    let marker = if open { "▶ " } else { "  " };
    let mut header = vec![
        Span::raw(marker),
        Span::styled(session.title(), Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("[{}]", session.status.label()),
            Style::default().fg(status_color(session.status)),
        ),
    ];
    if session.unread_count > 0 {
        header.push(Span::styled(
            format!(" ({})", session.unread_count),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    let preview = session.last_message.clone().unwrap_or_default();
    ListItem::new(vec![
        Line::from(header),
        Line::from(Span::styled(
            format!("    {}", preview.lines().next().unwrap_or("")),
            Style::default().fg(Color::DarkGray),
        )),
    ])
}

pub fn status_color(status: SessionStatus) -> Color {
    match status {
        SessionStatus::Escalated => Color::Red,
        SessionStatus::Human => Color::Green,
        SessionStatus::Ai => Color::Blue,
        SessionStatus::Closed | SessionStatus::Other => Color::DarkGray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::tests::{screen_text, session};

    #[test]
    fn escalated_sessions_stand_out() {
        assert_eq!(status_color(SessionStatus::Escalated), Color::Red);
        assert_ne!(status_color(SessionStatus::Ai), Color::Red);
    }

    #[test]
    fn rows_show_marker_status_and_unread() {
        let mut state = ViewState::default();
        let mut waiting = session("s-2", "Carol");
        waiting.status = SessionStatus::Escalated;
        waiting.unread_count = 3;
        state.sessions = vec![session("s-1", "Bob"), waiting];
        state.open_session = Some("s-1".into());

        let text = screen_text(&state, 100, 20);
        assert!(text.contains("▶ Bob [Human]"), "{text}");
        assert!(text.contains("Carol [Escalated] (3)"), "{text}");
        assert!(text.contains("Sessions (2)"), "{text}");
    }

    #[test]
    fn empty_list_placeholder() {
        let text = screen_text(&ViewState::default(), 100, 20);
        assert!(text.contains("No sessions yet."), "{text}");
    }
}
