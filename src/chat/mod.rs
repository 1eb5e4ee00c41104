// Chat domain: resources, the desk state machine, and notifications.

pub mod desk;
pub mod model;
pub mod notify;

pub use desk::{ChatDesk, DeskAction, DeskError};
pub use model::{ChatMessage, ChatSession, SenderType, ServerPush, SessionId, SessionStatus};
pub use notify::{Notification, NotificationKind};
