use std::collections::HashMap;

use tokio::sync::RwLock;

use hark_core::domain::{Role, Session, SessionId, SessionStatus, Turn};

use crate::store::{ConversationStore, StoreError};

/// In-memory store for tests and the text repl against `:memory:`-free runs.
/// Mirrors the SQL store's contract: append-only logs, one active session
/// per workspace.
#[derive(Default)]
pub struct InMemoryConversationStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Session>,
    turns: HashMap<String, Vec<Turn>>,
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_turn(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id.0)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.0.clone()))?;
        session.touch();
        state.turns.entry(session_id.0.clone()).or_default().push(Turn::new(role, content));
        Ok(())
    }

    async fn get_history(&self, session_id: &SessionId) -> Result<Vec<Turn>, StoreError> {
        let state = self.state.read().await;
        Ok(state.turns.get(&session_id.0).cloned().unwrap_or_default())
    }

    async fn get_or_create_active_session(
        &self,
        workspace_id: &str,
    ) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .sessions
            .values()
            .find(|session| session.workspace_id == workspace_id && session.is_active())
        {
            return Ok(existing.clone());
        }

        let session = Session::new(workspace_id);
        state.sessions.insert(session.id.0.clone(), session.clone());
        Ok(session)
    }

    async fn complete_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id.0)
            .filter(|session| session.is_active())
            .ok_or_else(|| StoreError::SessionNotFound(session_id.0.clone()))?;
        session
            .transition(SessionStatus::Completed)
            .map_err(|error| StoreError::Decode(error.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hark_core::domain::Role;

    use super::InMemoryConversationStore;
    use crate::store::ConversationStore;

    #[tokio::test]
    async fn mirrors_sql_store_contract() {
        let store = InMemoryConversationStore::default();
        let session = store.get_or_create_active_session("W-1").await.expect("create");
        let again = store.get_or_create_active_session("W-1").await.expect("reuse");
        assert_eq!(session.id, again.id);

        store.append_turn(&session.id, Role::User, "hello").await.expect("append");
        store.append_turn(&session.id, Role::Assistant, "hi there").await.expect("append");

        let history = store.get_history(&session.id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].content, "hi there");

        store.complete_session(&session.id).await.expect("complete");
        let fresh = store.get_or_create_active_session("W-1").await.expect("fresh");
        assert_ne!(session.id, fresh.id);
    }
}
