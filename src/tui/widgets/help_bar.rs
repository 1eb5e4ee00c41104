// Help bar: key hints, or the latest notification/error while it is fresh.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::tui::ViewState;

const HINTS: &[(&str, &str)] = &[
    ("j/k", "move"),
    ("Enter", "open"),
    ("i", "reply"),
    ("t", "take over"),
    ("x", "close"),
    ("r", "refresh"),
    ("R", "reconnect"),
    ("Esc", "back"),
    ("q", "quit"),
];

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = match state.toast.as_ref().filter(|t| t.is_fresh()) {
        Some(toast) => {
            let color = if toast.is_error { Color::Red } else { Color::Yellow };
            Line::from(Span::styled(
                format!(" {}", toast.text),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        }
        None => hint_line(),
    };
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::Black)),
        area,
    );
}

fn hint_line() -> Line<'static> {
    let mut spans = Vec::with_capacity(HINTS.len() * 2);
    for (key, label) in HINTS {
        spans.push(Span::styled(
            format!(" {key}"),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(format!(" {label} "), Style::default().fg(Color::Gray)));
    }
    Line::from(spans)
}
