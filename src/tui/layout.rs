// Screen layout for the agent desk.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                                |
// +------------------+-------------------------------+
// | Sessions (32%)   | Conversation (68%)            |
// |                  |                               |
// |                  +-------------------------------+
// |                  | Composer (3 rows)             |
// +------------------+-------------------------------+
// | Help Bar / toast (1 row)                          |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Resolved screen areas for each dashboard zone.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Connection state, agent name, open session.
    pub status_bar: Rect,
    pub sessions: Rect,
    pub conversation: Rect,
    pub composer: Rect,
    /// Key hints, replaced by the latest notification or error while it is
    /// fresh.
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(6),    // sessions + conversation
            Constraint::Length(1), // help bar
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
        .split(vertical[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(horizontal[1]);

    AppLayout {
        status_bar: vertical[0],
        sessions: horizontal[0],
        conversation: right[0],
        composer: right[1],
        help_bar: vertical[2],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
