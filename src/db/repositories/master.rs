//! Master repository
//!
//! Masters, their offered services (`master_services`) and the aggregated
//! rating over published reviews.

use crate::db::repositories::service::placeholders;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Master, MasterInput, MasterWithRating};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait MasterRepository: Send + Sync {
    /// Create a master together with its service links
    async fn create(&self, input: &MasterInput) -> Result<Master>;

    /// Update a master and replace its service links
    async fn update(&self, id: i64, input: &MasterInput) -> Result<Master>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Master>>;

    /// Active masters ordered by last name
    async fn list_active(&self) -> Result<Vec<Master>>;

    async fn count_active(&self) -> Result<i64>;

    /// Atomically bump `view_count`, returning the new value
    async fn increment_view(&self, id: i64) -> Result<Option<i64>>;

    /// Bulk (de)activation, returning the number of rows changed
    async fn set_active(&self, ids: &[i64], is_active: bool) -> Result<u64>;

    /// All masters with average published rating and review count
    async fn list_with_rating(&self) -> Result<Vec<MasterWithRating>>;

    /// Whether the master offers every one of `service_ids`
    async fn offers_services(&self, master_id: i64, service_ids: &[i64]) -> Result<bool>;
}

pub struct SqlxMasterRepository {
    pool: DynDatabasePool,
}

impl SqlxMasterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MasterRepository> {
        Arc::new(Self::new(pool))
    }
}

const MASTER_COLUMNS: &str = "m.id, m.first_name, m.last_name, m.middle_name, m.phone, m.address, \
     m.photo, m.experience, m.is_active, m.view_count, m.created_at";

const INSERT_MASTER: &str = r#"
    INSERT INTO masters (first_name, last_name, middle_name, phone, address, photo, experience,
                         is_active, view_count, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
"#;

const UPDATE_MASTER: &str = r#"
    UPDATE masters
    SET first_name = ?, last_name = ?, middle_name = ?, phone = ?, address = ?, photo = ?,
        experience = ?, is_active = ?
    WHERE id = ?
"#;

const INSERT_MASTER_SERVICE: &str =
    "INSERT INTO master_services (master_id, service_id) VALUES (?, ?)";
const DELETE_MASTER_SERVICES: &str = "DELETE FROM master_services WHERE master_id = ?";

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl MasterRepository for SqlxMasterRepository {
    async fn create(&self, input: &MasterInput) -> Result<Master> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_master_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_master_mysql(pool, input).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Master {} vanished after insert", id))
    }

    async fn update(&self, id: i64, input: &MasterInput) -> Result<Master> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_master_sqlite(pool, id, input).await?,
            Backend::Mysql(pool) => update_master_mysql(pool, id, input).await?,
        }
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Master not found: {}", id))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM masters WHERE id = ?";
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

    async fn get_by_id(&self, id: i64) -> Result<Option<Master>> {
        let sql = format!("SELECT {} FROM masters m WHERE m.id = ?", MASTER_COLUMNS);
        let row = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get master")?
                .as_ref()
                .map(row_to_master_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get master")?
                .as_ref()
                .map(row_to_master_mysql),
        };
        Ok(row)
    }

    async fn list_active(&self) -> Result<Vec<Master>> {
        let sql = format!(
            "SELECT {} FROM masters m WHERE m.is_active = ? ORDER BY m.last_name, m.first_name, m.id",
            MASTER_COLUMNS
        );
        let masters = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(true)
                .fetch_all(pool)
                .await
                .context("Failed to list masters")?
                .iter()
                .map(row_to_master_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(true)
                .fetch_all(pool)
                .await
                .context("Failed to list masters")?
                .iter()
                .map(row_to_master_mysql)
                .collect(),
        };
        Ok(masters)
    }

    async fn count_active(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM masters WHERE is_active = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(true).fetch_one(pool).await?.get("count"),
            Backend::Mysql(pool) => sqlx::query(sql).bind(true).fetch_one(pool).await?.get("count"),
        };
        Ok(count)
    }

    async fn increment_view(&self, id: i64) -> Result<Option<i64>> {
        let update = "UPDATE masters SET view_count = view_count + 1 WHERE id = ?";
        let select = "SELECT view_count FROM masters WHERE id = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(update)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment master views")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get("view_count"))
            }
            Backend::Mysql(pool) => {
                sqlx::query(update)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment master views")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get("view_count"))
            }
        };
        Ok(count)
    }

    async fn set_active(&self, ids: &[i64], is_active: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE masters SET is_active = ? WHERE id IN ({})",
            placeholders(ids.len())
        );
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql).bind(is_active);
                for id in ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await?.rows_affected()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql).bind(is_active);
                for id in ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(affected)
    }

    async fn list_with_rating(&self) -> Result<Vec<MasterWithRating>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_with_rating_sqlite(pool).await,
            Backend::Mysql(pool) => list_with_rating_mysql(pool).await,
        }
    }

    async fn offers_services(&self, master_id: i64, service_ids: &[i64]) -> Result<bool> {
        let wanted = dedup(service_ids);
        if wanted.is_empty() {
            return Ok(true);
        }
        let sql = format!(
            "SELECT COUNT(*) AS count FROM master_services WHERE master_id = ? AND service_id IN ({})",
            placeholders(wanted.len())
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql).bind(master_id);
                for id in &wanted {
                    query = query.bind(*id);
                }
                query.fetch_one(pool).await?.get("count")
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql).bind(master_id);
                for id in &wanted {
                    query = query.bind(*id);
                }
                query.fetch_one(pool).await?.get("count")
            }
        };
        Ok(count == wanted.len() as i64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_master_sqlite(pool: &SqlitePool, input: &MasterInput) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_MASTER)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.middle_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.photo)
        .bind(input.experience)
        .bind(input.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to create master")?
        .last_insert_rowid();

    for service_id in dedup(&input.service_ids) {
        sqlx::query(INSERT_MASTER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link master service")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_master_sqlite(pool: &SqlitePool, id: i64, input: &MasterInput) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(UPDATE_MASTER)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.middle_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.photo)
        .bind(input.experience)
        .bind(input.is_active)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update master")?;

    sqlx::query(DELETE_MASTER_SERVICES)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for service_id in dedup(&input.service_ids) {
        sqlx::query(INSERT_MASTER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link master service")?;
    }

    tx.commit().await?;
    Ok(())
}

async fn list_with_rating_sqlite(pool: &SqlitePool) -> Result<Vec<MasterWithRating>> {
    let sql = format!(
        r#"
        SELECT {}, AVG(r.rating) AS avg_rating, COUNT(r.id) AS review_count
        FROM masters m
        LEFT JOIN reviews r ON r.master_id = m.id AND r.is_published = 1
        GROUP BY m.id
        ORDER BY m.last_name, m.first_name, m.id
        "#,
        MASTER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list master ratings")?;

    Ok(rows
        .iter()
        .map(|row| {
            let avg: Option<f64> = row.get("avg_rating");
            MasterWithRating::new(
                row_to_master_sqlite(row),
                avg.unwrap_or(0.0),
                row.get("review_count"),
            )
        })
        .collect())
}

fn row_to_master_sqlite(row: &sqlx::sqlite::SqliteRow) -> Master {
    Master {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        middle_name: row.get("middle_name"),
        phone: row.get("phone"),
        address: row.get("address"),
        photo: row.get("photo"),
        experience: row.get("experience"),
        is_active: row.get("is_active"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_master_mysql(pool: &MySqlPool, input: &MasterInput) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_MASTER)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.middle_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.photo)
        .bind(input.experience)
        .bind(input.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to create master")?
        .last_insert_id() as i64;

    for service_id in dedup(&input.service_ids) {
        sqlx::query(INSERT_MASTER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link master service")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_master_mysql(pool: &MySqlPool, id: i64, input: &MasterInput) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(UPDATE_MASTER)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.middle_name)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.photo)
        .bind(input.experience)
        .bind(input.is_active)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update master")?;

    sqlx::query(DELETE_MASTER_SERVICES)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for service_id in dedup(&input.service_ids) {
        sqlx::query(INSERT_MASTER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link master service")?;
    }

    tx.commit().await?;
    Ok(())
}

async fn list_with_rating_mysql(pool: &MySqlPool) -> Result<Vec<MasterWithRating>> {
    let sql = format!(
        r#"
        SELECT {}, CAST(AVG(r.rating) AS DOUBLE) AS avg_rating, COUNT(r.id) AS review_count
        FROM masters m
        LEFT JOIN reviews r ON r.master_id = m.id AND r.is_published = TRUE
        GROUP BY m.id
        ORDER BY m.last_name, m.first_name, m.id
        "#,
        MASTER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list master ratings")?;

    Ok(rows
        .iter()
        .map(|row| {
            let avg: Option<f64> = row.get("avg_rating");
            MasterWithRating::new(
                row_to_master_mysql(row),
                avg.unwrap_or(0.0),
                row.get("review_count"),
            )
        })
        .collect())
}

fn row_to_master_mysql(row: &sqlx::mysql::MySqlRow) -> Master {
    Master {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        middle_name: row.get("middle_name"),
        phone: row.get("phone"),
        address: row.get("address"),
        photo: row.get("photo"),
        experience: row.get("experience"),
        is_active: row.get("is_active"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
    }
}
