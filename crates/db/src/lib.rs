pub mod connection;
pub mod memory;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use memory::InMemoryConversationStore;
pub use store::{ConversationStore, SqlConversationStore, StoreError};
