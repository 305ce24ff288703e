use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;

use hark_core::domain::{Role, Session, SessionId, SessionStatus, Turn};

use crate::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Durable conversation state: an append-only ordered turn log per session
/// plus session lifecycle. Ordering of turns is assigned here (rowid), not
/// by the caller, so reads always reproduce insertion order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_turn(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    async fn get_history(&self, session_id: &SessionId) -> Result<Vec<Turn>, StoreError>;

    async fn get_or_create_active_session(
        &self,
        workspace_id: &str,
    ) -> Result<Session, StoreError>;

    async fn complete_session(&self, session_id: &SessionId) -> Result<(), StoreError>;
}

pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_active_session(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT id, workspace_id, status, created_at, last_active_at \
             FROM sessions WHERE workspace_id = ?1 AND status = 'active'",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_session_row).transpose()
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn append_turn(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO turns (session_id, role, content, created_at) \
             SELECT id, ?2, ?3, ?4 FROM sessions WHERE id = ?1",
        )
        .bind(&session_id.0)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.0.clone()));
        }

        sqlx::query("UPDATE sessions SET last_active_at = ?2 WHERE id = ?1")
            .bind(&session_id.0)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_history(&self, session_id: &SessionId) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM turns \
             WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Turn {
                    role: Role::parse(&row.get::<String, _>("role"))
                        .map_err(|error| StoreError::Decode(error.to_string()))?,
                    content: row.get("content"),
                    created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }

    async fn get_or_create_active_session(
        &self,
        workspace_id: &str,
    ) -> Result<Session, StoreError> {
        if let Some(existing) = self.find_active_session(workspace_id).await? {
            return Ok(existing);
        }

        let session = Session::new(workspace_id);
        let inserted = sqlx::query(
            "INSERT INTO sessions (id, workspace_id, status, created_at, last_active_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.id.0)
        .bind(&session.workspace_id)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_active_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(session),
            // Unique active-session index tripped: another caller created one
            // between our select and insert. Reuse theirs.
            Err(insert_error) => match self.find_active_session(workspace_id).await? {
                Some(existing) => Ok(existing),
                None => Err(StoreError::Database(insert_error)),
            },
        }
    }

    async fn complete_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'completed', last_active_at = ?2 \
             WHERE id = ?1 AND status = 'active'",
        )
        .bind(&session_id.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.0.clone()));
        }
        Ok(())
    }
}

fn parse_session_row(row: sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
    Ok(Session {
        id: SessionId(row.get("id")),
        workspace_id: row.get("workspace_id"),
        status: SessionStatus::parse(&row.get::<String, _>("status"))
            .map_err(|error| StoreError::Decode(error.to_string()))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        last_active_at: parse_timestamp(&row.get::<String, _>("last_active_at"))?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| StoreError::Decode(format!("bad timestamp `{value}`: {error}")))
}
