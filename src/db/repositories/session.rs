//! Session repository
//!
//! Login sessions for users, keyed by the opaque cookie token.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions of a user except `keep`
    async fn delete_by_user_except(&self, user_id: i64, keep: &str) -> Result<u64>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_SESSION: &str =
    "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SESSION: &str =
    "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_session_sqlite(pool, session).await,
            Backend::Mysql(pool) => create_session_mysql(pool, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_session_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_session_by_id_mysql(pool, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql).bind(id).execute(pool).await?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql).bind(id).execute(pool).await?;
            }
        }
        Ok(())
    }

    async fn delete_by_user_except(&self, user_id: i64, keep: &str) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE user_id = ? AND id <> ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(keep)
                .execute(pool)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(keep)
                .execute(pool)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(INSERT_SESSION)
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(INSERT_SESSION)
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "u".into(),
                "u@example.com".into(),
                "h".into(),
                UserRole::Client,
            ))
            .await
            .unwrap();
        (SqlxSessionRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let (repo, user_id) = setup().await;
        let session = repo.create(&Session::new(user_id, Duration::days(14))).await.unwrap();

        let stored = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.user_id, user_id);
        assert!(!stored.is_expired());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (repo, user_id) = setup().await;
        let live = repo.create(&Session::new(user_id, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(user_id, Duration::days(-1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user_except() {
        let (repo, user_id) = setup().await;
        let keep = repo.create(&Session::new(user_id, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(user_id, Duration::days(1))).await.unwrap();
        repo.create(&Session::new(user_id, Duration::days(1))).await.unwrap();

        assert_eq!(repo.delete_by_user_except(user_id, &keep.id).await.unwrap(), 2);
        assert!(repo.get_by_id(&keep.id).await.unwrap().is_some());
    }
}
