// Conversation widget: messages of the open session, oldest at the top.
//
// Each: "HH:MM {sender}: {content}", colored by sender side. Follows the
// newest message unless scrolled up with PageUp.

use chrono::Local;
use ratatui::layout::{Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};
use ratatui::Frame;

use crate::chat::{ChatMessage, SenderType};
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let title = match state.open_session_info() {
        Some(session) => format!("{} ({} messages)", session.title(), state.messages.len()),
        None if state.open_session.is_some() => format!("Conversation ({})", state.messages.len()),
        None => "Conversation".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if state.open_session.is_none() {
        let paragraph = Paragraph::new("  Select a session and press Enter.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let lines: Vec<Line> = state.messages.iter().flat_map(message_lines).collect();
    let total = lines.len();
    let visible = (area.height as usize).saturating_sub(2);

    // Offset from the top so the tail stays in view, minus the user's scroll.
    let max_offset = total.saturating_sub(visible);
    let offset = max_offset.saturating_sub(state.message_scroll);

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, area);

    if total > visible {
        let mut scrollbar_state = ScrollbarState::new(max_offset).position(offset);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

/// One line per line of message content; the header goes on the first.
pub fn message_lines(msg: &ChatMessage) -> Vec<Line<'static>> {
    let time = msg.created_at.with_timezone(&Local).format("%H:%M").to_string();
    let style = Style::default().fg(sender_color(msg.sender_type));
    let mut content = msg.content.lines();

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{time} "), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}: ", msg.sender_display()),
            style.add_modifier(Modifier::BOLD),
        ),
        Span::raw(content.next().unwrap_or("").to_string()),
    ])];
    lines.extend(content.map(|rest| Line::from(format!("      {rest}"))));
    lines
}

pub fn sender_color(sender: SenderType) -> Color {
    match sender {
        SenderType::User | SenderType::Guest => Color::Cyan,
        SenderType::Ai => Color::Blue,
        SenderType::Admin => Color::Green,
        SenderType::System | SenderType::Other => Color::DarkGray,
    }
}
