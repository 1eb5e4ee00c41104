// Composer widget: the reply being typed for the open session.

use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let (title, border) = if state.compose_mode {
        (" Reply (Enter send, Esc done) ", Style::default().fg(Color::Cyan))
    } else {
        (" Reply (i to type) ", Style::default().fg(Color::DarkGray))
    };

    let text = if state.open_session.is_none() {
        Paragraph::new("No session open").style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(visible_tail(&state.compose_text, area.width.saturating_sub(3)))
    };
    frame.render_widget(
        text.block(Block::default().borders(Borders::ALL).border_style(border).title(title)),
        area,
    );

    if state.compose_mode && area.height > 2 {
        let shown = visible_tail(&state.compose_text, area.width.saturating_sub(3));
        let x = area.x + 1 + shown.chars().count() as u16;
        frame.set_cursor_position(Position::new(x, area.y + 1));
    }
}

/// The end of `text` that fits in `width` columns.
fn visible_tail(text: &str, width: u16) -> String {
    let count = text.chars().count();
    let skip = count.saturating_sub(width as usize);
    text.chars().skip(skip).collect()
}
