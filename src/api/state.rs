//! Shared application state
//!
//! Repositories and services are wired once at startup and shared by every
//! handler through axum's `State`.

use anyhow::Result;
use std::sync::Arc;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    CommentRepositoryImpl, SqlxCategoryRepository, SqlxMasterRepository, SqlxOrderRepository,
    SqlxPostRepository, SqlxReviewRepository, SqlxServiceRepository, SqlxSessionRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    BlogService, CatalogService, CommentService, ContentModerator, LoginRateLimiter, MarkdownRenderer,
    MasterService, MediaStore, MistralModerator, OrderNotifier, OrderService, ReviewService,
    TelegramNotifier, UserService, VisitorStore,
};
use crate::theme::ThemeEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub theme: Arc<ThemeEngine>,
    pub visitors: VisitorStore,
    pub media: MediaStore,
    pub user_service: Arc<UserService>,
    pub catalog_service: Arc<CatalogService>,
    pub master_service: Arc<MasterService>,
    pub order_service: Arc<OrderService>,
    pub review_service: Arc<ReviewService>,
    pub blog_service: Arc<BlogService>,
    pub comment_service: Arc<CommentService>,
}

impl AppState {
    /// Wire the application with the Mistral moderator and Telegram notifier
    pub fn new(config: Config, pool: DynDatabasePool) -> Result<Self> {
        let moderator = Arc::new(MistralModerator::new(config.moderation.clone())?);
        let notifier = Arc::new(TelegramNotifier::new(
            config.telegram.clone(),
            config.server.base_url.clone(),
        )?);
        Self::with_integrations(config, pool, moderator, notifier)
    }

    /// Wire the application around the given outbound integrations
    pub fn with_integrations(
        config: Config,
        pool: DynDatabasePool,
        moderator: Arc<dyn ContentModerator>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Result<Self> {
        let cache = create_cache(&config.cache);
        let visitors = VisitorStore::new(cache.clone(), &config.session);
        let media = MediaStore::new(config.upload.clone());
        let theme = Arc::new(ThemeEngine::new(&config.templates)?);

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let service_repo = SqlxServiceRepository::boxed(pool.clone());
        let master_repo = SqlxMasterRepository::boxed(pool.clone());
        let review_repo = SqlxReviewRepository::boxed(pool.clone());
        let comment_repo = CommentRepositoryImpl::boxed(pool.clone());

        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            Arc::new(LoginRateLimiter::new(&config.login_limit)),
            media.clone(),
            config.session.cookie_age_days,
        ));
        let catalog_service = Arc::new(CatalogService::new(
            service_repo.clone(),
            master_repo.clone(),
            cache,
        ));
        let master_service = Arc::new(MasterService::new(
            master_repo.clone(),
            service_repo,
            review_repo.clone(),
            visitors.clone(),
            catalog_service.clone(),
        ));
        let order_service = Arc::new(OrderService::new(
            SqlxOrderRepository::boxed(pool.clone()),
            master_repo.clone(),
            notifier,
        ));
        let review_service = Arc::new(ReviewService::new(
            review_repo,
            master_repo,
            moderator.clone(),
            media.clone(),
        ));
        let blog_service = Arc::new(BlogService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            comment_repo.clone(),
            user_repo,
            MarkdownRenderer::new(),
            visitors.clone(),
        ));
        let comment_service = Arc::new(CommentService::new(comment_repo, moderator));

        Ok(Self {
            pool,
            config: Arc::new(config),
            theme,
            visitors,
            media,
            user_service,
            catalog_service,
            master_service,
            order_service,
            review_service,
            blog_service,
            comment_service,
        })
    }
}
