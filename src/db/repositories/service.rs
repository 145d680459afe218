//! Service catalog repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{price_from_cents, price_to_cents, ListParams, PagedResult, Service, ServiceInput};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create(&self, input: &ServiceInput) -> Result<Service>;

    async fn update(&self, id: i64, input: &ServiceInput) -> Result<Service>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Service>>;

    /// All services ordered by name
    async fn list_all(&self) -> Result<Vec<Service>>;

    /// Popular services, cheapest first
    async fn list_popular(&self, params: &ListParams) -> Result<PagedResult<Service>>;

    /// Services with the given ids; unknown ids are skipped
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Service>>;

    /// Services offered by a master
    async fn list_by_master(&self, master_id: i64) -> Result<Vec<Service>>;

    /// Services attached to an order
    async fn list_by_order(&self, order_id: i64) -> Result<Vec<Service>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxServiceRepository {
    pool: DynDatabasePool,
}

impl SqlxServiceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ServiceRepository> {
        Arc::new(Self::new(pool))
    }
}

const SERVICE_COLUMNS: &str =
    "s.id, s.name, s.description, s.price_cents, s.duration_minutes, s.is_popular, s.image, s.created_at";

const INSERT_SERVICE: &str = r#"
    INSERT INTO services (name, description, price_cents, duration_minutes, is_popular, image, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SERVICE: &str = r#"
    UPDATE services
    SET name = ?, description = ?, price_cents = ?, duration_minutes = ?, is_popular = ?, image = ?
    WHERE id = ?
"#;

/// `?, ?, ?` for an IN clause
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn cents(input: &ServiceInput) -> Result<i64> {
    price_to_cents(input.price).ok_or_else(|| anyhow!("Price out of range: {}", input.price))
}

#[async_trait]
impl ServiceRepository for SqlxServiceRepository {
    async fn create(&self, input: &ServiceInput) -> Result<Service> {
        let price_cents = cents(input)?;
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_SERVICE)
                .bind(&input.name)
                .bind(&input.description)
                .bind(price_cents)
                .bind(input.duration_minutes)
                .bind(input.is_popular)
                .bind(&input.image)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create service")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_SERVICE)
                .bind(&input.name)
                .bind(&input.description)
                .bind(price_cents)
                .bind(input.duration_minutes)
                .bind(input.is_popular)
                .bind(&input.image)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create service")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Service {} vanished after insert", id))
    }

    async fn update(&self, id: i64, input: &ServiceInput) -> Result<Service> {
        let price_cents = cents(input)?;
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(UPDATE_SERVICE)
                    .bind(&input.name)
                    .bind(&input.description)
                    .bind(price_cents)
                    .bind(input.duration_minutes)
                    .bind(input.is_popular)
                    .bind(&input.image)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update service")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(UPDATE_SERVICE)
                    .bind(&input.name)
                    .bind(&input.description)
                    .bind(price_cents)
                    .bind(input.duration_minutes)
                    .bind(input.is_popular)
                    .bind(&input.image)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update service")?;
            }
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Service not found: {}", id))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM services WHERE id = ?";
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

    async fn get_by_id(&self, id: i64) -> Result<Option<Service>> {
        let sql = format!("SELECT {} FROM services s WHERE s.id = ?", SERVICE_COLUMNS);
        let services = match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_services_sqlite(pool, &sql, &[id]).await?,
            Backend::Mysql(pool) => fetch_services_mysql(pool, &sql, &[id]).await?,
        };
        Ok(services.into_iter().next())
    }

    async fn list_all(&self) -> Result<Vec<Service>> {
        let sql = format!("SELECT {} FROM services s ORDER BY s.name, s.id", SERVICE_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_services_sqlite(pool, &sql, &[]).await,
            Backend::Mysql(pool) => fetch_services_mysql(pool, &sql, &[]).await,
        }
    }

    async fn list_popular(&self, params: &ListParams) -> Result<PagedResult<Service>> {
        let count_sql = "SELECT COUNT(*) AS count FROM services WHERE is_popular = ?";
        let sql = format!(
            "SELECT {} FROM services s WHERE s.is_popular = ? ORDER BY s.price_cents, s.id LIMIT ? OFFSET ?",
            SERVICE_COLUMNS
        );

        let (items, total) = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let total: i64 = sqlx::query(count_sql)
                    .bind(true)
                    .fetch_one(pool)
                    .await?
                    .get("count");
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list popular services")?;
                (rows.iter().map(row_to_service_sqlite).collect(), total)
            }
            Backend::Mysql(pool) => {
                let total: i64 = sqlx::query(count_sql)
                    .bind(true)
                    .fetch_one(pool)
                    .await?
                    .get("count");
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list popular services")?;
                (rows.iter().map(row_to_service_mysql).collect(), total)
            }
        };

        Ok(PagedResult::new(items, total, params))
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Service>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM services s WHERE s.id IN ({}) ORDER BY s.name, s.id",
            SERVICE_COLUMNS,
            placeholders(ids.len())
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_services_sqlite(pool, &sql, ids).await,
            Backend::Mysql(pool) => fetch_services_mysql(pool, &sql, ids).await,
        }
    }

    async fn list_by_master(&self, master_id: i64) -> Result<Vec<Service>> {
        let sql = format!(
            "SELECT {} FROM services s INNER JOIN master_services ms ON ms.service_id = s.id \
             WHERE ms.master_id = ? ORDER BY s.name, s.id",
            SERVICE_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_services_sqlite(pool, &sql, &[master_id]).await,
            Backend::Mysql(pool) => fetch_services_mysql(pool, &sql, &[master_id]).await,
        }
    }

    async fn list_by_order(&self, order_id: i64) -> Result<Vec<Service>> {
        let sql = format!(
            "SELECT {} FROM services s INNER JOIN order_services os ON os.service_id = s.id \
             WHERE os.order_id = ? ORDER BY s.name, s.id",
            SERVICE_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_services_sqlite(pool, &sql, &[order_id]).await,
            Backend::Mysql(pool) => fetch_services_mysql(pool, &sql, &[order_id]).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM services";
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

async fn fetch_services_sqlite(pool: &SqlitePool, sql: &str, binds: &[i64]) -> Result<Vec<Service>> {
    let mut query = sqlx::query(sql);
    for id in binds {
        query = query.bind(*id);
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch services")?;
    Ok(rows.iter().map(row_to_service_sqlite).collect())
}

pub(crate) fn row_to_service_sqlite(row: &sqlx::sqlite::SqliteRow) -> Service {
    Service {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price: price_from_cents(row.get("price_cents")),
        duration_minutes: row.get("duration_minutes"),
        is_popular: row.get("is_popular"),
        image: row.get("image"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn fetch_services_mysql(pool: &MySqlPool, sql: &str, binds: &[i64]) -> Result<Vec<Service>> {
    let mut query = sqlx::query(sql);
    for id in binds {
        query = query.bind(*id);
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch services")?;
    Ok(rows.iter().map(row_to_service_mysql).collect())
}

pub(crate) fn row_to_service_mysql(row: &sqlx::mysql::MySqlRow) -> Service {
    Service {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price: price_from_cents(row.get("price_cents")),
        duration_minutes: row.get("duration_minutes"),
        is_popular: row.get("is_popular"),
        image: row.get("image"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use rust_decimal::Decimal;

    async fn setup_test_repo() -> SqlxServiceRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxServiceRepository::new(pool)
    }

    fn input(name: &str, price: i64, popular: bool) -> ServiceInput {
        ServiceInput {
            name: name.to_string(),
            description: format!("{} description", name),
            price: Decimal::new(price, 0),
            duration_minutes: 30,
            is_popular: popular,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let mut service_input = input("Стрижка", 1500, true);
        service_input.price = Decimal::new(150050, 2);
        let created = repo.create(&service_input).await.unwrap();

        let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Стрижка");
        assert_eq!(stored.price, Decimal::new(150050, 2));
        assert!(stored.is_popular);
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup_test_repo().await;
        let created = repo.create(&input("Бритьё", 800, false)).await.unwrap();

        let updated = repo.update(created.id, &input("Бритьё опасной бритвой", 900, true)).await.unwrap();
        assert_eq!(updated.name, "Бритьё опасной бритвой");
        assert_eq!(updated.price, Decimal::new(900, 0));

        repo.delete(created.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_popular_sorted_by_price_and_paged() {
        let repo = setup_test_repo().await;
        repo.create(&input("A", 3000, true)).await.unwrap();
        repo.create(&input("B", 1000, true)).await.unwrap();
        repo.create(&input("C", 2000, true)).await.unwrap();
        repo.create(&input("D", 500, true)).await.unwrap();
        repo.create(&input("E", 100, false)).await.unwrap();

        let first = repo.list_popular(&ListParams::new(1, 3)).await.unwrap();
        assert_eq!(first.total, 4);
        let names: Vec<_> = first.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["D", "B", "C"]);

        let second = repo.list_popular(&ListParams::new(2, 3)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "A");
    }

    #[tokio::test]
    async fn test_get_many_skips_unknown() {
        let repo = setup_test_repo().await;
        let a = repo.create(&input("A", 100, false)).await.unwrap();
        let b = repo.create(&input("B", 200, false)).await.unwrap();

        let found = repo.get_many(&[a.id, b.id, 404]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.get_many(&[]).await.unwrap().is_empty());
    }
}
