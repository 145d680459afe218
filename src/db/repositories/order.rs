//! Order repository

use crate::db::repositories::service::placeholders;
use crate::db::repositories::{ServiceRepository, SqlxServiceRepository};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{
    CreateOrderInput, ListParams, Order, OrderDetail, OrderSearch, OrderStatus, PagedResult,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order and its services in one transaction
    async fn create(&self, input: &CreateOrderInput) -> Result<Order>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Order with master name and services
    async fn get_detail(&self, id: i64) -> Result<Option<OrderDetail>>;

    /// Newest first, filtered by `search` when it has an active query
    async fn search(&self, search: &OrderSearch, params: &ListParams) -> Result<PagedResult<OrderDetail>>;

    /// Set the status of every listed order, returning how many changed
    async fn set_status(&self, ids: &[i64], status: OrderStatus) -> Result<u64>;
}

pub struct SqlxOrderRepository {
    pool: DynDatabasePool,
    services: SqlxServiceRepository,
}

impl SqlxOrderRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            services: SqlxServiceRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }

    async fn attach_services(&self, rows: Vec<(Order, Option<String>)>) -> Result<Vec<OrderDetail>> {
        let mut details = Vec::with_capacity(rows.len());
        for (order, master_name) in rows {
            let services = self.services.list_by_order(order.id).await?;
            details.push(OrderDetail {
                status_label: order.status.label(),
                order,
                master_name,
                services,
            });
        }
        Ok(details)
    }
}

const ORDER_COLUMNS: &str = "o.id, o.client_name, o.phone, o.comment, o.status, o.master_id, \
     o.appointment_date, o.date_created, o.date_updated, \
     m.first_name AS master_first_name, m.last_name AS master_last_name";

const ORDER_FROM: &str = "FROM orders o LEFT JOIN masters m ON m.id = o.master_id";

const INSERT_ORDER: &str = r#"
    INSERT INTO orders (client_name, phone, comment, status, master_id, appointment_date,
                        date_created, date_updated)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_ORDER_SERVICE: &str = "INSERT INTO order_services (order_id, service_id) VALUES (?, ?)";

/// Escape character for LIKE patterns, quoted the same way on SQLite and MySQL
const LIKE_ESCAPE: char = '!';

/// Substring pattern matching `query` literally
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// WHERE clause, LIKE pattern and number of pattern binds
fn search_clause(search: &OrderSearch) -> Option<(String, String, usize)> {
    let query = search.active_query()?;
    let mut columns: Vec<&str> = search.fields.iter().map(|f| f.column()).collect();
    columns.sort_unstable();
    columns.dedup();
    let clause = columns
        .iter()
        .map(|c| format!("o.{} LIKE ? ESCAPE '{}'", c, LIKE_ESCAPE))
        .collect::<Vec<_>>()
        .join(" OR ");
    Some((format!("WHERE ({})", clause), contains_pattern(query), columns.len()))
}

fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, input: &CreateOrderInput) -> Result<Order> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_order_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_order_mysql(pool, input).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Order {} vanished after insert", id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        Ok(self.fetch_row(id).await?.map(|(order, _)| order))
    }

    async fn get_detail(&self, id: i64) -> Result<Option<OrderDetail>> {
        match self.fetch_row(id).await? {
            Some(row) => Ok(self.attach_services(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn search(&self, search: &OrderSearch, params: &ListParams) -> Result<PagedResult<OrderDetail>> {
        let (where_sql, pattern, binds) =
            search_clause(search).unwrap_or_else(|| (String::new(), String::new(), 0));

        let count_sql = format!("SELECT COUNT(*) AS count FROM orders o {}", where_sql);
        let list_sql = format!(
            "SELECT {} {} {} ORDER BY o.date_created DESC, o.id DESC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, ORDER_FROM, where_sql
        );

        let (rows, total) = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut count_query = sqlx::query(&count_sql);
                let mut list_query = sqlx::query(&list_sql);
                for _ in 0..binds {
                    count_query = count_query.bind(pattern.as_str());
                    list_query = list_query.bind(pattern.as_str());
                }
                let total: i64 = count_query.fetch_one(pool).await?.get("count");
                let rows = list_query
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to search orders")?;
                (rows.iter().map(row_to_order_sqlite).collect::<Vec<_>>(), total)
            }
            Backend::Mysql(pool) => {
                let mut count_query = sqlx::query(&count_sql);
                let mut list_query = sqlx::query(&list_sql);
                for _ in 0..binds {
                    count_query = count_query.bind(pattern.as_str());
                    list_query = list_query.bind(pattern.as_str());
                }
                let total: i64 = count_query.fetch_one(pool).await?.get("count");
                let rows = list_query
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to search orders")?;
                (rows.iter().map(row_to_order_mysql).collect::<Vec<_>>(), total)
            }
        };

        let items = self.attach_services(rows).await?;
        Ok(PagedResult::new(items, total, params))
    }

    async fn set_status(&self, ids: &[i64], status: OrderStatus) -> Result<u64> {
        let ids = distinct_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE orders SET status = ?, date_updated = ? WHERE id IN ({})",
            placeholders(ids.len())
        );
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql).bind(status.as_str()).bind(now);
                for id in &ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await?.rows_affected()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql).bind(status.as_str()).bind(now);
                for id in &ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

impl SqlxOrderRepository {
    async fn fetch_row(&self, id: i64) -> Result<Option<(Order, Option<String>)>> {
        let sql = format!("SELECT {} {} WHERE o.id = ?", ORDER_COLUMNS, ORDER_FROM);
        let row = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get order")?
                .as_ref()
                .map(row_to_order_sqlite),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get order")?
                .as_ref()
                .map(row_to_order_mysql),
        };
        Ok(row)
    }
}

fn master_name(first: Option<String>, last: Option<String>) -> Option<String> {
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
        _ => None,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_order_sqlite(pool: &SqlitePool, input: &CreateOrderInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_ORDER)
        .bind(&input.client_name)
        .bind(&input.phone)
        .bind(&input.comment)
        .bind(OrderStatus::default().as_str())
        .bind(input.master_id)
        .bind(input.appointment_date)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?
        .last_insert_rowid();

    for service_id in distinct_ids(&input.service_ids) {
        sqlx::query(INSERT_ORDER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach order service")?;
    }

    tx.commit().await?;
    Ok(id)
}

fn row_to_order_sqlite(row: &sqlx::sqlite::SqliteRow) -> (Order, Option<String>) {
    let status: String = row.get("status");
    let order = Order {
        id: row.get("id"),
        client_name: row.get("client_name"),
        phone: row.get("phone"),
        comment: row.get("comment"),
        status: status.parse().unwrap_or_default(),
        master_id: row.get("master_id"),
        appointment_date: row.get("appointment_date"),
        date_created: row.get("date_created"),
        date_updated: row.get("date_updated"),
    };
    let name = master_name(row.get("master_first_name"), row.get("master_last_name"));
    (order, name)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_order_mysql(pool: &MySqlPool, input: &CreateOrderInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_ORDER)
        .bind(&input.client_name)
        .bind(&input.phone)
        .bind(&input.comment)
        .bind(OrderStatus::default().as_str())
        .bind(input.master_id)
        .bind(input.appointment_date)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?
        .last_insert_id() as i64;

    for service_id in distinct_ids(&input.service_ids) {
        sqlx::query(INSERT_ORDER_SERVICE)
            .bind(id)
            .bind(service_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach order service")?;
    }

    tx.commit().await?;
    Ok(id)
}

fn row_to_order_mysql(row: &sqlx::mysql::MySqlRow) -> (Order, Option<String>) {
    let status: String = row.get("status");
    let order = Order {
        id: row.get("id"),
        client_name: row.get("client_name"),
        phone: row.get("phone"),
        comment: row.get("comment"),
        status: status.parse().unwrap_or_default(),
        master_id: row.get("master_id"),
        appointment_date: row.get("appointment_date"),
        date_created: row.get("date_created"),
        date_updated: row.get("date_updated"),
    };
    let name = master_name(row.get("master_first_name"), row.get("master_last_name"));
    (order, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{MasterRepository, SqlxMasterRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{MasterInput, OrderSearchField, ServiceInput};
    use rust_decimal::Decimal;

    struct Fixture {
        repo: SqlxOrderRepository,
        master_id: i64,
        service_ids: Vec<i64>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let services = SqlxServiceRepository::new(pool.clone());
        let mut service_ids = Vec::new();
        for (name, price) in [("Стрижка", 1500), ("Бритьё", 900)] {
            let service = services
                .create(&ServiceInput {
                    name: name.to_string(),
                    description: String::new(),
                    price: Decimal::new(price, 0),
                    duration_minutes: 30,
                    is_popular: false,
                    image: None,
                })
                .await
                .unwrap();
            service_ids.push(service.id);
        }

        let master = SqlxMasterRepository::new(pool.clone())
            .create(&MasterInput {
                first_name: "Иван".into(),
                last_name: "Петров".into(),
                middle_name: None,
                phone: "+7".into(),
                address: None,
                photo: None,
                experience: 3,
                is_active: true,
                service_ids: service_ids.clone(),
            })
            .await
            .unwrap();

        Fixture {
            repo: SqlxOrderRepository::new(pool),
            master_id: master.id,
            service_ids,
        }
    }

    fn order(f: &Fixture, name: &str, phone: &str, comment: Option<&str>) -> CreateOrderInput {
        CreateOrderInput {
            client_name: name.to_string(),
            phone: phone.to_string(),
            comment: comment.map(str::to_string),
            master_id: f.master_id,
            service_ids: f.service_ids.clone(),
            appointment_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_detail() {
        let f = setup().await;
        let created = f.repo.create(&order(&f, "Олег", "89001112233", None)).await.unwrap();
        assert_eq!(created.status, OrderStatus::NotApproved);

        let detail = f.repo.get_detail(created.id).await.unwrap().unwrap();
        assert_eq!(detail.master_name.as_deref(), Some("Иван Петров"));
        assert_eq!(detail.services.len(), 2);
        assert_eq!(detail.status_label, "Не подтвержден");
        assert!(f.repo.get_detail(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_by_fields() {
        let f = setup().await;
        f.repo.create(&order(&f, "Олег", "89001112233", Some("позже"))).await.unwrap();
        f.repo.create(&order(&f, "Пётр", "89004445566", None)).await.unwrap();

        let by_phone = OrderSearch {
            query: Some("445".into()),
            fields: vec![OrderSearchField::Phone],
        };
        let found = f.repo.search(&by_phone, &ListParams::new(1, 20)).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].order.client_name, "Пётр");

        let by_name_or_comment = OrderSearch {
            query: Some("позже".into()),
            fields: vec![OrderSearchField::Name, OrderSearchField::Comment],
        };
        let found = f.repo.search(&by_name_or_comment, &ListParams::new(1, 20)).await.unwrap();
        assert_eq!(found.total, 1);

        let no_fields = OrderSearch {
            query: Some("445".into()),
            fields: vec![],
        };
        let all = f.repo.search(&no_fields, &ListParams::new(1, 20)).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].order.client_name, "Пётр");
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let f = setup().await;
        f.repo.create(&order(&f, "Олег", "89001112233", Some("позже"))).await.unwrap();
        f.repo.create(&order(&f, "Пётр", "89004445566", None)).await.unwrap();

        let search = |query: &str, field| OrderSearch {
            query: Some(query.into()),
            fields: vec![field],
        };
        let params = ListParams::new(1, 20);
        for (query, field) in [
            ("_", OrderSearchField::Comment),
            ("%", OrderSearchField::Name),
            ("!", OrderSearchField::Name),
        ] {
            let found = f.repo.search(&search(query, field), &params).await.unwrap();
            assert_eq!(found.total, 0, "{:?} matched", query);
        }

        f.repo
            .create(&order(&f, "Анна", "89007778899", Some("скидка 50%_!")))
            .await
            .unwrap();
        for query in ["50%", "%_", "_!"] {
            let found = f
                .repo
                .search(&search(query, OrderSearchField::Comment), &params)
                .await
                .unwrap();
            assert_eq!(found.total, 1, "{:?} missed", query);
            assert_eq!(found.items[0].order.client_name, "Анна");
        }
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("445"), "%445%");
        assert_eq!(contains_pattern("5%_!"), "%5!%!_!!%");
    }

    #[tokio::test]
    async fn test_set_status_bulk() {
        let f = setup().await;
        let a = f.repo.create(&order(&f, "A", "1", None)).await.unwrap();
        let b = f.repo.create(&order(&f, "B", "2", None)).await.unwrap();

        let changed = f
            .repo
            .set_status(&[a.id, b.id, a.id], OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let stored = f.repo.get_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(f.repo.set_status(&[], OrderStatus::Spam).await.unwrap(), 0);
    }
}
