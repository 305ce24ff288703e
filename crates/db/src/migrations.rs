use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "sessions",
        "turns",
        "idx_sessions_one_active_per_workspace",
        "idx_sessions_workspace_id",
        "idx_turns_session_id",
    ];

    #[tokio::test]
    async fn migrations_create_managed_schema_objects() {
        let pool = connect("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
        )
        .fetch_all(&pool)
        .await
        .expect("list schema");

        let names: Vec<String> =
            rows.iter().map(|row| row.get::<String, _>("name")).collect();
        for object in MANAGED_SCHEMA_OBJECTS {
            assert!(names.iter().any(|name| name == object), "missing schema object {object}");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
