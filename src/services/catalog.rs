//! Service catalog
//!
//! Staff maintain the list of services through a form that comes in two
//! flavours: `easy` (name, description, price) and `normal` (adds duration
//! and the popularity flag). The landing page catalog is cached and dropped
//! whenever a service or master changes.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, CacheLayer, MemoryCache};
use crate::db::repositories::{MasterRepository, ServiceRepository};
use crate::models::{parse_price, ListParams, Master, PagedResult, Service, ServiceInput};
use crate::services::form::{checkbox, FieldErrors};

const NAME_MAX_CHARS: usize = 200;
const DEFAULT_DURATION_MINUTES: i64 = 20;
const FORBIDDEN_DESCRIPTION_WORD: &str = "плохое";

/// Error types for catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Which service form is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceFormMode {
    Easy,
    Normal,
}

impl ServiceFormMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceFormMode::Easy => "easy",
            ServiceFormMode::Normal => "normal",
        }
    }
}

impl FromStr for ServiceFormMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "normal" => Ok(Self::Normal),
            _ => Err(format!("Unknown form mode: {}", s)),
        }
    }
}

/// Service form as submitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub duration_minutes: Option<String>,
    #[serde(default)]
    pub is_popular: Option<String>,
}

impl ServiceForm {
    /// Pre-filled form for editing an existing service
    pub fn from_service(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            description: service.description.clone(),
            price: service.price.to_string(),
            duration_minutes: Some(service.duration_minutes.to_string()),
            is_popular: service.is_popular.then(|| "on".to_string()),
        }
    }

    /// Validate the fields the given mode shows
    pub fn validate(&self, mode: ServiceFormMode) -> Result<ServiceInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "Пожалуйста, укажите название услуги");
        } else if name.chars().count() > NAME_MAX_CHARS {
            errors.add("name", "Название услуги не должно превышать 200 символов");
        }

        let description = self.description.trim();
        if description.is_empty() {
            errors.add("description", "Необходимо добавить описание услуги");
        } else if description.to_lowercase().contains(FORBIDDEN_DESCRIPTION_WORD) {
            errors.add("description", "В описании не должно быть слова 'плохое'");
        }

        let price = if self.price.trim().is_empty() {
            errors.add("price", "Пожалуйста, укажите стоимость услуги");
            None
        } else {
            match parse_price(&self.price) {
                Ok(price) => Some(price),
                Err(e) => {
                    errors.add("price", e.to_string());
                    None
                }
            }
        };

        let (duration_minutes, is_popular) = match mode {
            ServiceFormMode::Easy => (DEFAULT_DURATION_MINUTES, false),
            ServiceFormMode::Normal => {
                let duration = match self.duration_minutes.as_deref().map(str::trim) {
                    None | Some("") => DEFAULT_DURATION_MINUTES,
                    Some(raw) => match raw.parse::<i64>() {
                        Ok(minutes) if minutes >= 0 => minutes,
                        _ => {
                            errors.add("duration_minutes", "Укажите длительность в минутах (целое неотрицательное число)");
                            DEFAULT_DURATION_MINUTES
                        }
                    },
                };
                (duration, checkbox(self.is_popular.as_deref()))
            }
        };

        match price {
            Some(price) if errors.is_empty() => Ok(ServiceInput {
                name: name.to_string(),
                description: description.to_string(),
                price,
                duration_minutes,
                is_popular,
                image: None,
            }),
            _ => Err(errors),
        }
    }
}

/// Everything the landing page lists, cached as one entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandingCatalog {
    pub masters: Vec<Master>,
    pub services: Vec<Service>,
    pub popular_services: Vec<Service>,
}

/// Service catalog operations
pub struct CatalogService {
    service_repo: Arc<dyn ServiceRepository>,
    master_repo: Arc<dyn MasterRepository>,
    cache: Arc<MemoryCache>,
    cache_ttl: Duration,
}

impl CatalogService {
    pub fn new(
        service_repo: Arc<dyn ServiceRepository>,
        master_repo: Arc<dyn MasterRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            service_repo,
            master_repo,
            cache,
            cache_ttl,
        }
    }

    /// Active masters, all services and popular services for the landing page
    pub async fn landing(&self) -> Result<LandingCatalog, CatalogError> {
        let cached: anyhow::Result<Option<LandingCatalog>> = self.cache.get(keys::LANDING_CATALOG).await;
        match cached {
            Ok(Some(catalog)) => return Ok(catalog),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read landing catalog from cache"),
        }

        let masters = self.master_repo.list_active().await?;
        let services = self.service_repo.list_all().await?;
        let popular_services = services.iter().filter(|s| s.is_popular).cloned().collect();
        let catalog = LandingCatalog {
            masters,
            services,
            popular_services,
        };

        if let Err(e) = self.cache.set(keys::LANDING_CATALOG, &catalog, self.cache_ttl).await {
            tracing::warn!(error = %e, "Failed to cache landing catalog");
        }
        Ok(catalog)
    }

    pub async fn get_service(&self, id: i64) -> Result<Service, CatalogError> {
        self.service_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("service {}", id)))
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, CatalogError> {
        Ok(self.service_repo.list_all().await?)
    }

    pub async fn count_services(&self) -> Result<i64, CatalogError> {
        Ok(self.service_repo.count().await?)
    }

    /// Popular services, cheapest first
    pub async fn popular_services(&self, params: &ListParams) -> Result<PagedResult<Service>, CatalogError> {
        Ok(self.service_repo.list_popular(params).await?)
    }

    pub async fn create_service(&self, form: &ServiceForm, mode: ServiceFormMode) -> Result<Service, CatalogError> {
        let input = form.validate(mode).map_err(CatalogError::Validation)?;
        let service = self
            .service_repo
            .create(&input)
            .await
            .context("Failed to create service")?;

        tracing::info!(service_id = service.id, name = %service.name, "Service created");
        self.invalidate().await;
        Ok(service)
    }

    /// Update a service from the full form, keeping its image
    pub async fn update_service(&self, id: i64, form: &ServiceForm) -> Result<Service, CatalogError> {
        let existing = self.get_service(id).await?;
        let mut input = form
            .validate(ServiceFormMode::Normal)
            .map_err(CatalogError::Validation)?;
        input.image = existing.image;

        let service = self
            .service_repo
            .update(id, &input)
            .await
            .context("Failed to update service")?;

        tracing::info!(service_id = id, "Service updated");
        self.invalidate().await;
        Ok(service)
    }

    /// Drop cached catalog data after a service or master write
    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::CATALOG_PATTERN).await {
            tracing::warn!(error = %e, "Failed to invalidate catalog cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxMasterRepository, SqlxServiceRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use rust_decimal::Decimal;

    fn form(name: &str, description: &str, price: &str) -> ServiceForm {
        ServiceForm {
            name: name.to_string(),
            description: description.to_string(),
            price: price.to_string(),
            duration_minutes: None,
            is_popular: None,
        }
    }

    async fn setup() -> (CatalogService, DynDatabasePool) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let service = CatalogService::new(
            SqlxServiceRepository::boxed(pool.clone()),
            SqlxMasterRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
        );
        (service, pool)
    }

    #[test]
    fn test_form_mode_parsing() {
        assert_eq!("easy".parse::<ServiceFormMode>(), Ok(ServiceFormMode::Easy));
        assert_eq!("normal".parse::<ServiceFormMode>(), Ok(ServiceFormMode::Normal));
        assert!("hard".parse::<ServiceFormMode>().is_err());
    }

    #[test]
    fn test_validate_required_fields() {
        let errors = form("  ", "", "").validate(ServiceFormMode::Easy).unwrap_err();
        assert!(errors.has("name"));
        assert!(errors.has("description"));
        assert!(errors.has("price"));
    }

    #[test]
    fn test_validate_rejects_forbidden_word_and_long_name() {
        let errors = form(&"а".repeat(201), "Очень ПЛОХОЕ обслуживание", "100")
            .validate(ServiceFormMode::Easy)
            .unwrap_err();
        assert_eq!(errors.get("name"), ["Название услуги не должно превышать 200 символов"]);
        assert_eq!(errors.get("description"), ["В описании не должно быть слова 'плохое'"]);
    }

    #[test]
    fn test_validate_price() {
        let errors = form("Стрижка", "Классика", "12.345").validate(ServiceFormMode::Easy).unwrap_err();
        assert!(errors.has("price"));

        let input = form("Стрижка", "Классика", "1500,50").validate(ServiceFormMode::Easy).unwrap();
        assert_eq!(input.price, Decimal::new(150050, 2));
    }

    #[test]
    fn test_modes_differ_in_extra_fields() {
        let mut submitted = form("Стрижка", "Классика", "1500");
        submitted.duration_minutes = Some("45".to_string());
        submitted.is_popular = Some("on".to_string());

        let easy = submitted.validate(ServiceFormMode::Easy).unwrap();
        assert_eq!(easy.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert!(!easy.is_popular);

        let normal = submitted.validate(ServiceFormMode::Normal).unwrap();
        assert_eq!(normal.duration_minutes, 45);
        assert!(normal.is_popular);

        submitted.duration_minutes = Some("-5".to_string());
        assert!(submitted.validate(ServiceFormMode::Normal).unwrap_err().has("duration_minutes"));
    }

    #[tokio::test]
    async fn test_create_update_and_landing_cache() {
        let (catalog, _pool) = setup().await;

        let landing = catalog.landing().await.unwrap();
        assert!(landing.services.is_empty());

        let mut submitted = form("Стрижка", "Классика", "1500");
        submitted.is_popular = Some("on".to_string());
        let created = catalog.create_service(&submitted, ServiceFormMode::Normal).await.unwrap();

        // Creating a service drops the cached landing catalog
        let landing = catalog.landing().await.unwrap();
        assert_eq!(landing.services.len(), 1);
        assert_eq!(landing.popular_services.len(), 1);

        submitted.name = "Стрижка машинкой".to_string();
        submitted.is_popular = None;
        let updated = catalog.update_service(created.id, &submitted).await.unwrap();
        assert_eq!(updated.name, "Стрижка машинкой");
        assert!(!updated.is_popular);

        let landing = catalog.landing().await.unwrap();
        assert!(landing.popular_services.is_empty());
    }

    #[tokio::test]
    async fn test_missing_service() {
        let (catalog, _pool) = setup().await;
        assert!(matches!(catalog.get_service(404).await, Err(CatalogError::NotFound(_))));
        assert!(matches!(
            catalog.update_service(404, &form("a", "b", "1")).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            catalog.create_service(&form("", "b", "1"), ServiceFormMode::Easy).await,
            Err(CatalogError::Validation(_))
        ));
    }
}
