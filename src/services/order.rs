//! Booking orders
//!
//! Clients book a master for one or more services. The master must be
//! active and offer every chosen service, and the desired time must not be
//! in the past. Staff are notified of each new order.

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{MasterRepository, OrderRepository};
use crate::models::{
    CreateOrderInput, ListParams, OrderDetail, OrderSearch, OrderStatus, PagedResult,
};
use crate::services::form::{non_blank, FieldErrors};
use crate::services::notifier::OrderNotifier;

const NAME_MAX_CHARS: usize = 100;
const PHONE_MAX_CHARS: usize = 20;
const PHONE_MIN_DIGITS: usize = 5;

/// Accepted `datetime-local` style inputs
const APPOINTMENT_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Booking form as submitted. `service_ids` may repeat in the body, so the
/// form is assembled from raw pairs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderForm {
    pub client_name: String,
    pub phone: String,
    pub comment: String,
    pub master_id: String,
    pub service_ids: Vec<String>,
    pub appointment_date: String,
}

impl OrderForm {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut form = OrderForm::default();
        for (key, value) in pairs {
            match key.as_str() {
                "client_name" => form.client_name = value.clone(),
                "phone" => form.phone = value.clone(),
                "comment" => form.comment = value.clone(),
                "master_id" | "master" => form.master_id = value.clone(),
                "service_ids" | "services" => form.service_ids.push(value.clone()),
                "appointment_date" => form.appointment_date = value.clone(),
                _ => {}
            }
        }
        form
    }

    /// Whether a service id is selected, for re-rendering checkboxes
    pub fn has_service(&self, id: i64) -> bool {
        self.service_ids.iter().any(|s| s.trim() == id.to_string())
    }

    /// Field checks that need no database access
    pub fn validate(&self, now: DateTime<Utc>) -> Result<CreateOrderInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let client_name = self.client_name.trim();
        if client_name.is_empty() {
            errors.add("client_name", "Пожалуйста, укажите ваше имя");
        } else if client_name.chars().count() > NAME_MAX_CHARS {
            errors.add("client_name", "Имя не должно превышать 100 символов");
        }

        let phone = self.phone.trim();
        if phone.is_empty() {
            errors.add("phone", "Пожалуйста, укажите номер телефона");
        } else if !valid_phone(phone) {
            errors.add("phone", "Введите корректный номер телефона");
        }

        let master_id = match self.master_id.trim().parse::<i64>() {
            Ok(id) if id > 0 => id,
            _ => {
                errors.add("master_id", "Выберите мастера");
                0
            }
        };

        let mut service_ids = Vec::with_capacity(self.service_ids.len());
        for raw in &self.service_ids {
            match raw.trim().parse::<i64>() {
                Ok(id) if id > 0 => service_ids.push(id),
                _ => {
                    errors.add("service_ids", "Некорректная услуга");
                    break;
                }
            }
        }
        service_ids.sort_unstable();
        service_ids.dedup();
        if service_ids.is_empty() && !errors.has("service_ids") {
            errors.add("service_ids", "Выберите хотя бы одну услугу");
        }

        let appointment_date = match non_blank(Some(&self.appointment_date)) {
            None => None,
            Some(raw) => match parse_appointment(&raw) {
                Some(date) if date < now => {
                    errors.add("appointment_date", "Дата записи не может быть в прошлом");
                    None
                }
                Some(date) => Some(date),
                None => {
                    errors.add("appointment_date", "Введите корректную дату и время");
                    None
                }
            },
        };

        errors.into_result(CreateOrderInput {
            client_name: client_name.to_string(),
            phone: phone.to_string(),
            comment: non_blank(Some(&self.comment)),
            master_id,
            service_ids,
            appointment_date,
        })
    }
}

fn valid_phone(phone: &str) -> bool {
    phone.chars().count() <= PHONE_MAX_CHARS
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        && phone.chars().filter(char::is_ascii_digit).count() >= PHONE_MIN_DIGITS
}

/// Parse the appointment field; times are taken as UTC
pub fn parse_appointment(raw: &str) -> Option<DateTime<Utc>> {
    APPOINTMENT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
        .map(|naive| naive.and_utc())
}

pub struct OrderService {
    order_repo: Arc<dyn OrderRepository>,
    master_repo: Arc<dyn MasterRepository>,
    notifier: Arc<dyn OrderNotifier>,
}

impl OrderService {
    pub fn new(
        order_repo: Arc<dyn OrderRepository>,
        master_repo: Arc<dyn MasterRepository>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            order_repo,
            master_repo,
            notifier,
        }
    }

    /// Validate and store a booking, then notify staff
    pub async fn create(&self, form: &OrderForm) -> Result<OrderDetail, OrderError> {
        let input = form.validate(Utc::now()).map_err(OrderError::Validation)?;

        let master = self
            .master_repo
            .get_by_id(input.master_id)
            .await
            .context("Failed to load master")?;
        match master {
            Some(master) if master.is_active => {}
            _ => {
                return Err(OrderError::Validation(FieldErrors::single(
                    "master_id",
                    "Выбранный мастер недоступен",
                )))
            }
        }

        if !self
            .master_repo
            .offers_services(input.master_id, &input.service_ids)
            .await
            .context("Failed to check master services")?
        {
            return Err(OrderError::Validation(FieldErrors::single(
                "service_ids",
                "Выбранный мастер не оказывает некоторые из выбранных услуг",
            )));
        }

        let order = self
            .order_repo
            .create(&input)
            .await
            .context("Failed to create order")?;
        let detail = self
            .order_repo
            .get_detail(order.id)
            .await?
            .ok_or_else(|| anyhow!("Order {} vanished after insert", order.id))?;

        tracing::info!(
            order_id = order.id,
            master_id = input.master_id,
            services = input.service_ids.len(),
            "Order created"
        );
        self.notifier.order_created(&detail).await;

        Ok(detail)
    }

    pub async fn get_detail(&self, id: i64) -> Result<OrderDetail, OrderError> {
        self.order_repo
            .get_detail(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn search(&self, search: &OrderSearch, params: &ListParams) -> Result<PagedResult<OrderDetail>, OrderError> {
        Ok(self.order_repo.search(search, params).await?)
    }

    /// Move orders to `status`; any transition is allowed
    pub async fn set_status(&self, ids: &[i64], status: OrderStatus) -> Result<u64, OrderError> {
        let updated = self.order_repo.set_status(ids, status).await?;
        tracing::info!(updated, status = %status, "Order status changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ServiceRepository, SqlxMasterRepository, SqlxOrderRepository, SqlxServiceRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{MasterInput, OrderSearchField, ServiceInput};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        orders: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl OrderNotifier for RecordingNotifier {
        async fn order_created(&self, order: &OrderDetail) {
            self.orders.lock().unwrap().push(order.order.id);
        }
    }

    struct Fixture {
        orders: OrderService,
        notifier: Arc<RecordingNotifier>,
        master_id: i64,
        offered: i64,
        not_offered: i64,
    }

    async fn add_service(pool: &DynDatabasePool, name: &str) -> i64 {
        SqlxServiceRepository::new(pool.clone())
            .create(&ServiceInput {
                name: name.to_string(),
                description: "Описание".to_string(),
                price: Decimal::new(1500, 0),
                duration_minutes: 60,
                is_popular: false,
                image: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let offered = add_service(&pool, "Стрижка").await;
        let not_offered = add_service(&pool, "Окрашивание").await;
        let masters = SqlxMasterRepository::boxed(pool.clone());
        let master = masters
            .create(&MasterInput {
                first_name: "Алексей".to_string(),
                last_name: "Смирнов".to_string(),
                middle_name: None,
                phone: "+79990000000".to_string(),
                address: None,
                photo: None,
                experience: 5,
                is_active: true,
                service_ids: vec![offered],
            })
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let orders = OrderService::new(SqlxOrderRepository::boxed(pool.clone()), masters, notifier.clone());
        Fixture {
            orders,
            notifier,
            master_id: master.id,
            offered,
            not_offered,
        }
    }

    fn form(master_id: i64, service_ids: &[i64]) -> OrderForm {
        OrderForm {
            client_name: "Иван".to_string(),
            phone: "+7 (999) 123-45-67".to_string(),
            comment: "  ".to_string(),
            master_id: master_id.to_string(),
            service_ids: service_ids.iter().map(i64::to_string).collect(),
            appointment_date: String::new(),
        }
    }

    #[test]
    fn test_from_pairs_collects_repeated_services() {
        let pairs: Vec<(String, String)> = [
            ("client_name", "Иван"),
            ("services", "1"),
            ("services", "3"),
            ("master", "2"),
            ("csrf", "x"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let form = OrderForm::from_pairs(&pairs);
        assert_eq!(form.service_ids, vec!["1", "3"]);
        assert_eq!(form.master_id, "2");
        assert!(form.has_service(3));
        assert!(!form.has_service(2));
    }

    #[test]
    fn test_validate_fields() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();

        let errors = OrderForm::default().validate(now).unwrap_err();
        for field in ["client_name", "phone", "master_id", "service_ids"] {
            assert!(errors.has(field), "missing error for {}", field);
        }

        let mut bad = form(1, &[1]);
        bad.phone = "call me".to_string();
        bad.appointment_date = "2029-12-31T10:00".to_string();
        let errors = bad.validate(now).unwrap_err();
        assert!(errors.has("phone"));
        assert_eq!(errors.get("appointment_date"), ["Дата записи не может быть в прошлом"]);

        let mut good = form(1, &[2, 1, 2]);
        good.appointment_date = "2030-01-02T10:30".to_string();
        let input = good.validate(now).unwrap();
        assert_eq!(input.service_ids, vec![1, 2]);
        assert_eq!(input.comment, None);
        assert_eq!(input.appointment_date, Some(Utc.with_ymd_and_hms(2030, 1, 2, 10, 30, 0).unwrap()));
    }

    #[test]
    fn test_parse_appointment() {
        assert!(parse_appointment("2030-05-01T09:00").is_some());
        assert!(parse_appointment("2030-05-01 09:00").is_some());
        assert!(parse_appointment("01.05.2030").is_none());
    }

    #[tokio::test]
    async fn test_create_notifies_once() {
        let fx = setup().await;
        let detail = fx.orders.create(&form(fx.master_id, &[fx.offered])).await.unwrap();

        assert_eq!(detail.order.status, OrderStatus::NotApproved);
        assert_eq!(detail.master_name.as_deref(), Some("Алексей Смирнов"));
        assert_eq!(detail.services.len(), 1);
        assert_eq!(*fx.notifier.orders.lock().unwrap(), vec![detail.order.id]);
    }

    #[tokio::test]
    async fn test_create_rejects_unoffered_service_and_unknown_master() {
        let fx = setup().await;

        match fx.orders.create(&form(fx.master_id, &[fx.offered, fx.not_offered])).await {
            Err(OrderError::Validation(errors)) => assert!(errors.has("service_ids")),
            other => panic!("expected validation error, got {:?}", other.map(|d| d.order.id)),
        }
        match fx.orders.create(&form(999, &[fx.offered])).await {
            Err(OrderError::Validation(errors)) => assert!(errors.has("master_id")),
            other => panic!("expected validation error, got {:?}", other.map(|d| d.order.id)),
        }
        assert!(fx.notifier.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_future_appointment_and_status_changes() {
        let fx = setup().await;
        let mut submitted = form(fx.master_id, &[fx.offered]);
        submitted.appointment_date = (Utc::now() + Duration::days(3)).format("%Y-%m-%dT%H:%M").to_string();
        let detail = fx.orders.create(&submitted).await.unwrap();
        assert!(detail.order.appointment_date.is_some());

        assert_eq!(fx.orders.set_status(&[detail.order.id], OrderStatus::Completed).await.unwrap(), 1);
        assert_eq!(fx.orders.get_detail(detail.order.id).await.unwrap().order.status, OrderStatus::Completed);
        // Back to the initial status is allowed too
        fx.orders.set_status(&[detail.order.id], OrderStatus::NotApproved).await.unwrap();

        let found = fx
            .orders
            .search(
                &OrderSearch {
                    query: Some("Иван".to_string()),
                    fields: vec![OrderSearchField::Name],
                },
                &ListParams::new(1, 20),
            )
            .await
            .unwrap();
        assert_eq!(found.total, 1);

        assert!(matches!(fx.orders.get_detail(404).await, Err(OrderError::NotFound(404))));
    }
}
