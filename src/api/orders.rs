//! Booking form and the staff order pages

use axum::{
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Form, Router,
};
use tera::Context as TeraContext;

use super::common::{field, PageQuery};
use super::middleware::{require_staff_page, require_staff_record_page, AppState};
use super::page::{Page, PageError};
use crate::models::{OrderSearch, OrderSearchField};
use crate::services::{FieldErrors, FlashLevel, OrderError, OrderForm};

pub fn router(state: AppState) -> Router<AppState> {
    let list = Router::new()
        .route("/barbershop/orders/", get(orders_list))
        .route_layer(from_fn_with_state(state.clone(), require_staff_page));
    let detail = Router::new()
        .route("/barbershop/orders/{order_id}/", get(order_detail))
        .route_layer(from_fn_with_state(state, require_staff_record_page));

    Router::new()
        .route("/barbershop/order_create/", get(order_form).post(order_create))
        .merge(list)
        .merge(detail)
}

async fn render_order_form(
    state: &AppState,
    page: &Page,
    form: &OrderForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let masters = state.master_service.list_active().await?;
    let services = state.catalog_service.list_services().await?;
    let selected_services: Vec<i64> = form
        .service_ids
        .iter()
        .filter_map(|id| id.trim().parse().ok())
        .collect();

    let mut context = TeraContext::new();
    context.insert("title", "Создание заказа");
    context.insert("button_text", "Создать");
    context.insert("masters", &masters);
    context.insert("services", &services);
    context.insert("selected_services", &selected_services);
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, "barbershop/order_form.html", context).await
}

/// GET /barbershop/order_create/
async fn order_form(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    render_order_form(&state, &page, &OrderForm::default(), &FieldErrors::new()).await
}

/// POST /barbershop/order_create/
async fn order_create(
    State(state): State<AppState>,
    page: Page,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let form = OrderForm::from_pairs(&pairs);
    match state.order_service.create(&form).await {
        Ok(order) => Ok(page
            .redirect_with(
                &state,
                "/barbershop/thanks/order/",
                FlashLevel::Success,
                format!("Заказ для {} успешно создан!", order.order.client_name),
            )
            .await),
        Err(OrderError::Validation(errors)) => {
            page.flash(&state, FlashLevel::Error, "Ошибка формы: проверьте ввод данных.").await;
            render_order_form(&state, &page, &form, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

/// `?search=` plus any number of `search_in` checkboxes
fn order_search(pairs: &[(String, String)]) -> OrderSearch {
    let mut fields: Vec<OrderSearchField> = pairs
        .iter()
        .filter(|(key, _)| key == "search_in")
        .filter_map(|(_, value)| value.parse().ok())
        .collect();
    fields.dedup();

    OrderSearch {
        query: field(pairs, "search").map(str::to_string),
        fields,
    }
}

/// GET /barbershop/orders/ - staff order list with search
async fn orders_list(
    State(state): State<AppState>,
    page: Page,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let search = order_search(&pairs);
    let page_number = PageQuery::from_pairs(&pairs);
    let params = page_number.params(state.config.pagination.orders_per_page);
    let orders = state.order_service.search(&search, &params).await?;

    let search_in: Vec<&str> = search
        .fields
        .iter()
        .map(|f| match f {
            OrderSearchField::Phone => "phone",
            OrderSearchField::Name => "name",
            OrderSearchField::Comment => "comment",
        })
        .collect();

    let mut context = TeraContext::new();
    context.insert("title", "Заказы");
    context.insert("orders", &orders.items);
    context.insert("pagination", &orders.info());
    context.insert("search", search.query.as_deref().unwrap_or(""));
    context.insert("search_in", &search_in);
    page.render(&state, "barbershop/orders_list.html", context).await
}

/// GET /barbershop/orders/{order_id}/
async fn order_detail(
    State(state): State<AppState>,
    page: Page,
    Path(order_id): Path<i64>,
) -> Result<Response, PageError> {
    let order = state.order_service.get_detail(order_id).await?;

    let mut context = TeraContext::new();
    context.insert("title", &format!("Заказ №{}", order.order.id));
    context.insert("order", &order);
    page.render(&state, "barbershop/order_detail.html", context).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_order_search_collects_fields() {
        let search = order_search(&pairs(&[
            ("search", "Иван"),
            ("search_in", "name"),
            ("search_in", "phone"),
            ("search_in", "address"),
        ]));
        assert_eq!(search.query.as_deref(), Some("Иван"));
        assert_eq!(search.fields, vec![OrderSearchField::Name, OrderSearchField::Phone]);
        assert_eq!(search.active_query(), Some("Иван"));
    }

    #[test]
    fn test_order_search_without_fields_does_not_filter() {
        let search = order_search(&pairs(&[("search", "Иван")]));
        assert!(search.fields.is_empty());
        assert_eq!(search.active_query(), None);
    }
}
