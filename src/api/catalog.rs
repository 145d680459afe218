//! Masters and services: public pages, staff service forms and the JSON
//! helpers used by the booking and review forms

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tera::Context as TeraContext;

use super::common::{is_ajax, PageQuery};
use super::middleware::{require_staff_page, AppState};
use super::page::{Page, PageError};
use crate::services::{CatalogError, FieldErrors, FlashLevel, ServiceForm, ServiceFormMode};

const SERVICES_LIST: &str = "/barbershop/services/";

pub fn router(state: AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/barbershop/services/", get(services_list))
        .route(
            "/barbershop/service_create/{form_mode}/",
            get(service_create_form).post(service_create),
        )
        .route(
            "/barbershop/service_update/{id}/",
            get(service_update_form).post(service_update),
        )
        .route_layer(from_fn_with_state(state, require_staff_page));

    Router::new()
        .route("/barbershop/masters/{id}/", get(master_detail))
        .route("/barbershop/services/popular/", get(popular_services))
        .route("/barbershop/service/{id}/", get(service_detail))
        .route(
            "/barbershop/masters_services/",
            get(masters_services_query).post(masters_services_json),
        )
        .route("/barbershop/api/master-info/", get(master_info))
        .merge(staff)
}

/// GET /barbershop/masters/{id}/
async fn master_detail(State(state): State<AppState>, page: Page, Path(id): Path<i64>) -> Result<Response, PageError> {
    let master_page = state.master_service.view_page(id, &page.visitor.id).await?;

    let mut context = TeraContext::new();
    context.insert("title", &format!("Мастер {}", master_page.profile.full_name));
    context.insert("master", &master_page.profile);
    context.insert("services", &master_page.profile.services);
    context.insert("reviews", &master_page.reviews);
    page.render(&state, "barbershop/master_detail.html", context).await
}

/// GET /barbershop/services/ - staff list of every service
async fn services_list(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    let services = state.catalog_service.list_services().await?;

    let mut context = TeraContext::new();
    context.insert("title", "Управление услугами");
    context.insert("services", &services);
    page.render(&state, "barbershop/services_list.html", context).await
}

/// GET /barbershop/services/popular/
async fn popular_services(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let params = query.params(state.config.pagination.popular_services_per_page);
    let popular = state.catalog_service.popular_services(&params).await?;
    let total_services = state.catalog_service.count_services().await?;

    let mut context = TeraContext::new();
    context.insert("title", "Популярные услуги");
    context.insert("page_title", "Наши самые популярные и выгодные услуги");
    context.insert("services", &popular.items);
    context.insert("pagination", &popular.info());
    context.insert("total_popular_services", &popular.total);
    context.insert("total_services_in_system", &total_services);
    page.render(&state, "barbershop/popular_services.html", context).await
}

/// GET /barbershop/service/{id}/
async fn service_detail(State(state): State<AppState>, page: Page, Path(id): Path<i64>) -> Result<Response, PageError> {
    let service = state.catalog_service.get_service(id).await?;

    let mut context = TeraContext::new();
    context.insert("title", &service.name);
    context.insert("service", &service);
    page.render(&state, "barbershop/service_detail.html", context).await
}

struct ServiceFormView<'a> {
    title: String,
    button_txt: &'static str,
    action: String,
    mode: ServiceFormMode,
    form: &'a ServiceForm,
    errors: &'a FieldErrors,
}

async fn render_service_form(state: &AppState, page: &Page, view: ServiceFormView<'_>) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("title", &view.title);
    context.insert("button_txt", view.button_txt);
    context.insert("action", &view.action);
    context.insert("form_mode", view.mode.as_str());
    context.insert("show_extra_fields", &(view.mode == ServiceFormMode::Normal));
    context.insert("form", view.form);
    context.insert("errors", view.errors);
    page.render(state, "barbershop/service_form.html", context).await
}

fn form_mode(raw: &str) -> Result<ServiceFormMode, PageError> {
    raw.parse().map_err(|_| PageError::NotFound)
}

fn create_view<'a>(mode: ServiceFormMode, form: &'a ServiceForm, errors: &'a FieldErrors) -> ServiceFormView<'a> {
    ServiceFormView {
        title: "Создание услуги".to_string(),
        button_txt: "Создать",
        action: format!("/barbershop/service_create/{}/", mode.as_str()),
        mode,
        form,
        errors,
    }
}

/// GET /barbershop/service_create/{form_mode}/
async fn service_create_form(
    State(state): State<AppState>,
    page: Page,
    Path(mode): Path<String>,
) -> Result<Response, PageError> {
    let mode = form_mode(&mode)?;
    let form = ServiceForm::default();
    let errors = FieldErrors::new();
    render_service_form(&state, &page, create_view(mode, &form, &errors)).await
}

/// POST /barbershop/service_create/{form_mode}/
async fn service_create(
    State(state): State<AppState>,
    page: Page,
    Path(mode): Path<String>,
    Form(form): Form<ServiceForm>,
) -> Result<Response, PageError> {
    let mode = form_mode(&mode)?;
    match state.catalog_service.create_service(&form, mode).await {
        Ok(service) => Ok(page
            .redirect_with(
                &state,
                SERVICES_LIST,
                FlashLevel::Success,
                format!("Услуга '{}' успешно создана!", service.name),
            )
            .await),
        Err(CatalogError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Ошибка формы: проверьте ввод данных.").await;
            render_service_form(&state, &page, create_view(mode, &form, &errors)).await
        }
        Err(e) => Err(e.into()),
    }
}

fn update_view<'a>(id: i64, name: &str, form: &'a ServiceForm, errors: &'a FieldErrors) -> ServiceFormView<'a> {
    ServiceFormView {
        title: format!("Редактирование услуги: {}", name),
        button_txt: "Обновить",
        action: format!("/barbershop/service_update/{}/", id),
        mode: ServiceFormMode::Normal,
        form,
        errors,
    }
}

/// GET /barbershop/service_update/{id}/
async fn service_update_form(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let service = state.catalog_service.get_service(id).await?;
    let form = ServiceForm::from_service(&service);
    let errors = FieldErrors::new();
    render_service_form(&state, &page, update_view(id, &service.name, &form, &errors)).await
}

/// POST /barbershop/service_update/{id}/
async fn service_update(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
    Form(form): Form<ServiceForm>,
) -> Result<Response, PageError> {
    let existing = state.catalog_service.get_service(id).await?;
    match state.catalog_service.update_service(id, &form).await {
        Ok(service) => Ok(page
            .redirect_with(
                &state,
                SERVICES_LIST,
                FlashLevel::Success,
                format!("Услуга '{}' успешно обновлена!", service.name),
            )
            .await),
        Err(CatalogError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Ошибка формы: проверьте ввод данных.").await;
            render_service_form(&state, &page, update_view(id, &existing.name, &form, &errors)).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Master id from a query value or a JSON body field; numbers and numeric
/// strings are accepted
fn parse_master_id(value: Option<&Value>) -> MasterIdParam {
    match value {
        None | Some(Value::Null) => MasterIdParam::Missing,
        Some(Value::String(s)) if s.trim().is_empty() => MasterIdParam::Missing,
        Some(Value::String(s)) => s.trim().parse().map_or(MasterIdParam::Invalid, MasterIdParam::Id),
        Some(Value::Number(n)) => n.as_i64().map_or(MasterIdParam::Invalid, MasterIdParam::Id),
        Some(_) => MasterIdParam::Invalid,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MasterIdParam {
    Missing,
    Invalid,
    Id(i64),
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn master_services_response(state: &AppState, master_id: MasterIdParam) -> Response {
    let id = match master_id {
        MasterIdParam::Missing => return json_error(StatusCode::BAD_REQUEST, "master_id is required"),
        MasterIdParam::Invalid => return json_error(StatusCode::NOT_FOUND, "Master not found"),
        MasterIdParam::Id(id) => id,
    };

    match state.master_service.services_of(id).await {
        Ok(services) => {
            let body: Vec<Value> = services
                .iter()
                .map(|s| json!({ "id": s.id, "name": s.name }))
                .collect();
            Json(body).into_response()
        }
        Err(CatalogError::NotFound(_)) => json_error(StatusCode::NOT_FOUND, "Master not found"),
        Err(e) => {
            tracing::error!("Failed to load master services: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /barbershop/masters_services/?master_id=
async fn masters_services_query(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let value = query.get("master_id").map(|s| Value::String(s.clone()));
    master_services_response(&state, parse_master_id(value.as_ref())).await
}

/// POST /barbershop/masters_services/ with `{"master_id": ...}`
async fn masters_services_json(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };
    master_services_response(&state, parse_master_id(payload.get("master_id"))).await
}

#[derive(Debug, Deserialize)]
struct MasterInfoQuery {
    master_id: Option<String>,
}

fn master_info_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// GET /barbershop/api/master-info/ - master card for the review form
async fn master_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MasterInfoQuery>,
) -> Response {
    if !is_ajax(&headers) {
        return master_info_error(StatusCode::BAD_REQUEST, "Недопустимый запрос");
    }

    let Some(raw_id) = query.master_id.filter(|s| !s.trim().is_empty()) else {
        return master_info_error(StatusCode::BAD_REQUEST, "Не указан ID мастера");
    };
    let Ok(id) = raw_id.trim().parse::<i64>() else {
        return master_info_error(StatusCode::NOT_FOUND, "Мастер не найден");
    };

    match state.master_service.profile(id).await {
        Ok(profile) => {
            let services: Vec<Value> = profile
                .services
                .iter()
                .map(|s| json!({ "id": s.id, "name": s.name, "price": s.price }))
                .collect();
            Json(json!({
                "success": true,
                "master": {
                    "id": profile.master.id,
                    "name": format!("{} {}", profile.master.first_name, profile.master.last_name),
                    "experience": profile.master.experience,
                    "photo": profile.master.photo.as_ref().map(|p| format!("/media/{}", p)),
                    "services": services,
                }
            }))
            .into_response()
        }
        Err(CatalogError::NotFound(_)) => master_info_error(StatusCode::NOT_FOUND, "Мастер не найден"),
        Err(e) => {
            tracing::error!("Failed to load master info: {}", e);
            master_info_error(StatusCode::INTERNAL_SERVER_ERROR, "Внутренняя ошибка сервера")
        }
    }
}
