// Status bar widget: hub connection, agent, open session.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::chat::model::short_id;
use crate::protocol::ConnectionStatus;
use crate::tui::ViewState;

/// Layout: [connection indicator] [agent] | [open session]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let (dot, color) = connection_indicator(&state.connection_status);
    let mut spans = vec![
        Span::styled(format!(" {dot} "), Style::default().fg(color)),
        Span::styled(
            connection_label(&state.connection_status),
            Style::default().fg(color),
        ),
        Span::styled(" | ", Style::default().fg(Color::Gray)),
        Span::styled(
            state.agent_name.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ];

    if let Some(open) = &state.open_session {
        let title = state
            .open_session_info()
            .map(|s| format!("{} [{}]", s.title(), s.status.label()))
            .unwrap_or_else(|| short_id(open).to_string());
        spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
        spans.push(Span::styled(title, Style::default().fg(Color::Cyan)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

pub fn connection_indicator(status: &ConnectionStatus) -> (&'static str, Color) {
    match status {
        ConnectionStatus::Connected => ("●", Color::Green),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting { .. } => ("●", Color::Yellow),
        ConnectionStatus::Disconnected => ("●", Color::Red),
    }
}

pub fn connection_label(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connected => "Connected".to_string(),
        ConnectionStatus::Connecting => "Connecting…".to_string(),
        ConnectionStatus::Reconnecting { attempt, delay } => {
            format!("Reconnecting (attempt {attempt}, in {}s)", delay.as_secs())
        }
        ConnectionStatus::Disconnected => "Disconnected (R to retry)".to_string(),
    }
}
