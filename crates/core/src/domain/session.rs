use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown session status `{other}`"
            ))),
        }
    }
}

/// One continuous conversation tied to exactly one workspace connection.
/// At most one `Active` session exists per workspace at any time; creation
/// goes through the store, which reuses an existing active session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workspace_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            workspace_id: workspace_id.into(),
            status: SessionStatus::Active,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Completed and expired are terminal; only an active session may move.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), DomainError> {
        match (self.status, to) {
            (SessionStatus::Active, SessionStatus::Completed)
            | (SessionStatus::Active, SessionStatus::Expired) => {
                self.status = to;
                Ok(())
            }
            (from, to) => Err(DomainError::InvalidSessionTransition { from, to }),
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}
