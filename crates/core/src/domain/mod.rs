pub mod intent;
pub mod session;
pub mod turn;

pub use intent::{
    Intent, ParsedTurn, PendingAction, PendingKind, DEFAULT_FETCH_DMS_COUNT,
    DEFAULT_FETCH_MENTIONS_COUNT, DEFAULT_FETCH_MESSAGES_COUNT,
};
pub use session::{Session, SessionId, SessionStatus};
pub use turn::{Role, Turn};
