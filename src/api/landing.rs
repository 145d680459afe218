//! Landing, about and thank-you pages

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::Datelike;
use tera::Context as TeraContext;

use super::middleware::AppState;
use super::page::{Page, PageError};

/// Published reviews shown on the landing page
const LANDING_REVIEWS: i64 = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/barbershop/about-us/", get(about))
        .route("/barbershop/thanks/", get(thanks))
        .route("/barbershop/thanks/{source}/", get(thanks_with_source))
}

/// GET / - Landing page
async fn landing(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    let catalog = state.catalog_service.landing().await?;
    let reviews = state.review_service.latest(LANDING_REVIEWS).await?;

    let mut context = TeraContext::new();
    context.insert("title", &format!("Главная - {}", state.config.site.name));
    context.insert("years_on_market", &state.config.site.landing_years_on_market);
    context.insert("masters", &catalog.masters);
    context.insert("services", &catalog.services);
    context.insert("popular_services", &catalog.popular_services);
    context.insert("reviews", &reviews);
    page.render(&state, "landing.html", context).await
}

/// GET /barbershop/about-us/
async fn about(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    let site = &state.config.site;
    let current_year = chrono::Utc::now().year();

    let mut context = TeraContext::new();
    context.insert("title", &format!("О нас - {}", site.name));
    context.insert("company_name", &site.name);
    context.insert("start_year", &site.start_year);
    context.insert("current_year", &current_year);
    context.insert("years_on_market", &(current_year - site.start_year));
    context.insert("contact_email", &site.contact_email);
    page.render(&state, "about.html", context).await
}

/// Message for the thank-you page depending on where the visitor came from
pub fn thanks_message(source: Option<&str>) -> String {
    match source {
        Some("order") => "Ваш заказ успешно создан и принят в обработку.".to_string(),
        Some("review") => "Ваш отзыв успешно отправлен и будет опубликован после модерации.".to_string(),
        Some(other) => format!(
            "Благодарим вас за ваше действие, инициированное со страницы: {}.",
            other
        ),
        None => "Благодарим вас за посещение!".to_string(),
    }
}

async fn render_thanks(state: &AppState, page: &Page, source: Option<&str>) -> Result<Response, PageError> {
    let masters_count = state.master_service.active_count().await?;

    let mut context = TeraContext::new();
    context.insert("title", "Спасибо!");
    context.insert("masters_count", &masters_count);
    context.insert("additional_message", "Спасибо, что выбрали наш первоклассный сервис!");
    context.insert("source_message", &thanks_message(source));
    page.render(state, "thanks.html", context).await
}

/// GET /barbershop/thanks/
async fn thanks(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    render_thanks(&state, &page, None).await
}

/// GET /barbershop/thanks/{source}/
async fn thanks_with_source(
    State(state): State<AppState>,
    page: Page,
    Path(source): Path<String>,
) -> Result<Response, PageError> {
    render_thanks(&state, &page, Some(&source)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thanks_message() {
        assert_eq!(thanks_message(Some("order")), "Ваш заказ успешно создан и принят в обработку.");
        assert!(thanks_message(Some("review")).contains("после модерации"));
        assert_eq!(
            thanks_message(Some("blog")),
            "Благодарим вас за ваше действие, инициированное со страницы: blog."
        );
        assert_eq!(thanks_message(None), "Благодарим вас за посещение!");
    }
}
