//! Review submission form

use axum::{
    extract::{Multipart, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::common::read_multipart;
use super::middleware::AppState;
use super::page::{Page, PageError};
use crate::services::{FieldErrors, FlashLevel, ReviewError, ReviewForm};

pub fn router() -> Router<AppState> {
    Router::new().route("/barbershop/review/create/", get(review_form).post(review_create))
}

#[derive(Debug, Deserialize)]
struct ReviewFormQuery {
    master_id: Option<String>,
}

async fn render_review_form(
    state: &AppState,
    page: &Page,
    form: &ReviewForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let masters = state.master_service.list_active().await?;

    let mut context = TeraContext::new();
    context.insert("title", "Оставить отзыв");
    context.insert("button_text", "Отправить");
    context.insert("masters", &masters);
    context.insert("selected_master", &form.master_id.trim().parse::<i64>().ok());
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, "barbershop/review_form.html", context).await
}

/// GET /barbershop/review/create/ - `?master_id=` preselects the master
async fn review_form(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<ReviewFormQuery>,
) -> Result<Response, PageError> {
    let mut form = ReviewForm::default();
    if let Some(master_id) = query.master_id.filter(|id| id.trim().parse::<i64>().is_ok()) {
        form.set_field("master_id", master_id);
    }
    render_review_form(&state, &page, &form, &FieldErrors::new()).await
}

/// POST /barbershop/review/create/
async fn review_create(
    State(state): State<AppState>,
    page: Page,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let mut submitted = read_multipart(multipart).await?;
    let mut form = ReviewForm::default();
    for (name, value) in std::mem::take(&mut submitted.fields) {
        form.set_field(&name, value);
    }
    let photo = submitted.take_file("photo");

    match state.review_service.submit(&form, photo).await {
        Ok(_) => Ok(page
            .redirect_with(
                &state,
                "/barbershop/thanks/review/",
                FlashLevel::Success,
                "Ваш отзыв успешно добавлен! Он будет опубликован после проверки модератором.",
            )
            .await),
        Err(ReviewError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Ошибка формы: проверьте ввод данных.").await;
            render_review_form(&state, &page, &form, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}
