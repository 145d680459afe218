//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Case-insensitive email lookup
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field of `user`
    async fn update(&self, user: &User) -> Result<User>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn touch_last_login(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, avatar, \
     birth_date, telegram_id, github_id, created_at, updated_at, last_login";

const INSERT_USER: &str = r#"
    INSERT INTO users (username, email, password_hash, role, is_active, avatar, birth_date,
                       telegram_id, github_id, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_USER: &str = r#"
    UPDATE users
    SET username = ?, email = ?, role = ?, is_active = ?, avatar = ?, birth_date = ?,
        telegram_id = ?, github_id = ?, updated_at = ?
    WHERE id = ?
"#;

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, id).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, id).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, username).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, username).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER(?)",
            USER_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_user_sqlite(pool, &sql, email.trim()).await,
            Backend::Mysql(pool) => fetch_user_mysql(pool, &sql, email.trim()).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await,
        }
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update password")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update password")?;
            }
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        let sql = "UPDATE users SET last_login = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql).bind(Utc::now()).bind(id).execute(pool).await?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql).bind(Utc::now()).bind(id).execute(pool).await?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql).fetch_one(pool).await?.get("count"),
            Backend::Mysql(pool) => sqlx::query(sql).fetch_one(pool).await?.get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(&user.telegram_id)
        .bind(&user.github_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn fetch_user_sqlite<'q, T>(pool: &SqlitePool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(UPDATE_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(&user.telegram_id)
        .bind(&user.github_id)
        .bind(now)
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    Ok(User {
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().unwrap_or_default(),
        is_active: row.get("is_active"),
        avatar: row.get("avatar"),
        birth_date: row.get("birth_date"),
        telegram_id: row.get("telegram_id"),
        github_id: row.get("github_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login: row.get("last_login"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(&user.telegram_id)
        .bind(&user.github_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn fetch_user_mysql<'q, T>(pool: &MySqlPool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(UPDATE_USER)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(&user.telegram_id)
        .bind(&user.github_id)
        .bind(now)
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    Ok(User {
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse::<UserRole>().unwrap_or_default(),
        is_active: row.get("is_active"),
        avatar: row.get("avatar"),
        birth_date: row.get("birth_date"),
        telegram_id: row.get("telegram_id"),
        github_id: row.get("github_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login: row.get("last_login"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn new_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "hash".to_string(),
            UserRole::Client,
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("ivan", "Ivan@Example.com")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "ivan");
        assert_eq!(by_id.role, UserRole::Client);
        assert!(by_id.is_active);

        let by_email = repo.get_by_email("ivan@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));

        let by_username = repo.get_by_username("ivan").await.unwrap();
        assert!(by_username.is_some());
        assert!(repo.get_by_username("petr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("a", "same@example.com")).await.unwrap();
        assert!(repo.create(&new_user("b", "same@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_profile_fields() {
        let repo = setup_test_repo().await;
        let mut user = repo.create(&new_user("a", "a@example.com")).await.unwrap();

        user.telegram_id = Some("@barber".to_string());
        user.birth_date = chrono::NaiveDate::from_ymd_opt(1990, 5, 17);
        user.role = UserRole::Staff;
        repo.update(&user).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.telegram_id.as_deref(), Some("@barber"));
        assert_eq!(stored.birth_date, user.birth_date);
        assert_eq!(stored.role, UserRole::Staff);
    }

    #[tokio::test]
    async fn test_update_password_and_login_time() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("a", "a@example.com")).await.unwrap();

        repo.update_password(user.id, "new-hash").await.unwrap();
        repo.touch_last_login(user.id).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
        assert!(stored.last_login.is_some());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
