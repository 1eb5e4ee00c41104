// TUI widget modules for each dashboard panel.

pub mod composer;
pub mod conversation;
pub mod help_bar;
pub mod quit_confirm;
pub mod session_list;
pub mod status_bar;
