//! Canteen configuration endpoints: dishes, menus, order windows, subsidy
//! rules, invoices and extras.
//!
//! Reads are open to any authenticated user, writes to staff. Extras are
//! budget bookings like operations, so any authenticated user may record them.

use super::{
    ApiState,
    auth::{AuthUser, StaffUser},
    error::{Id, Params, Payload},
};
use crate::{
    core::{
        dish::{self, DishFilter, DishInput},
        extra::{self, ExtraFilter, ExtraInput},
        invoice,
        menu::{self, MenuDetail, MenuDishInput, MenuDishUpdate, MenuDishView},
        order_window::{self, OrderWindowInput},
        subsidy::{self, SubsidyRuleInput},
    },
    entities::{
        dish as dish_entity, extra as extra_entity, invoice as invoice_entity,
        menu as menu_entity, menu_dish, order_window as order_window_entity, subsidy_rule,
    },
    errors::Result,
};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;

type Created<T> = (StatusCode, Json<T>);

/// Optional inclusive date range
#[derive(Debug, Default, Deserialize)]
pub struct DateRange {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

/// `GET /api/canteen/dishes`
pub async fn list_dishes(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(filter): Params<DishFilter>,
) -> Result<Json<Vec<dish_entity::Model>>> {
    dish::list_dishes(&state.db, &filter).await.map(Json)
}

/// `POST /api/canteen/dishes`
pub async fn create_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Payload(input): Payload<DishInput>,
) -> Result<Created<dish_entity::Model>> {
    let created = dish::create_dish(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/canteen/dishes/:id`
pub async fn get_dish(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<dish_entity::Model>> {
    dish::get_dish(&state.db, id).await.map(Json)
}

/// `PUT /api/canteen/dishes/:id`
pub async fn update_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(input): Payload<DishInput>,
) -> Result<Json<dish_entity::Model>> {
    dish::update_dish(&state.db, id, input).await.map(Json)
}

/// `DELETE /api/canteen/dishes/:id`
pub async fn delete_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    dish::delete_dish(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/canteen/menus`
pub async fn list_menus(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(range): Params<DateRange>,
) -> Result<Json<Vec<menu_entity::Model>>> {
    menu::menus_in_range(&state.db, range.date_from, range.date_to)
        .await
        .map(Json)
}

/// Body of `POST /api/canteen/menus`
#[derive(Debug, Deserialize)]
pub struct NewMenu {
    menu_date: NaiveDate,
}

/// `POST /api/canteen/menus`
pub async fn create_menu(
    State(state): State<ApiState>,
    StaffUser(staff): StaffUser,
    Payload(body): Payload<NewMenu>,
) -> Result<Created<MenuDetail>> {
    let detail = menu::create_menu(&state.db, body.menu_date, Some(staff.id)).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// `GET /api/canteen/menus/:id`
pub async fn get_menu(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<MenuDetail>> {
    menu::get_menu_detail(&state.db, id).await.map(Json)
}

/// `DELETE /api/canteen/menus/:id`
pub async fn delete_menu(
    State(state): State<ApiState>,
    StaffUser(staff): StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    menu::delete_menu(&state.db, id, Some(staff.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/canteen/menus/:id/publish`
pub async fn publish_menu(
    State(state): State<ApiState>,
    StaffUser(staff): StaffUser,
    Id(id): Id<i64>,
) -> Result<Json<MenuDetail>> {
    menu::publish_menu(&state.db, id, Some(staff.id))
        .await
        .map(Json)
}

/// `POST /api/canteen/menus/:id/dishes`
pub async fn add_menu_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(input): Payload<MenuDishInput>,
) -> Result<Json<menu_dish::Model>> {
    menu::add_dish_to_menu(&state.db, id, input).await.map(Json)
}

/// `DELETE /api/canteen/menus/:id/dishes/:menu_dish_id`
pub async fn remove_menu_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id((id, menu_dish_id)): Id<(i64, i64)>,
) -> Result<StatusCode> {
    menu::remove_dish_from_menu(&state.db, id, menu_dish_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query of `GET /api/canteen/menu-dishes`
#[derive(Debug, Default, Deserialize)]
pub struct MenuDishQuery {
    menu_id: Option<i64>,
}

/// `GET /api/canteen/menu-dishes`
pub async fn list_menu_dishes(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(query): Params<MenuDishQuery>,
) -> Result<Json<Vec<MenuDishView>>> {
    menu::list_menu_dishes(&state.db, query.menu_id)
        .await
        .map(Json)
}

/// `GET /api/canteen/menu-dishes/:id`
pub async fn get_menu_dish(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<MenuDishView>> {
    menu::get_menu_dish_view(&state.db, id).await.map(Json)
}

/// `PUT /api/canteen/menu-dishes/:id`
pub async fn update_menu_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(update): Payload<MenuDishUpdate>,
) -> Result<Json<menu_dish::Model>> {
    menu::update_menu_dish(&state.db, id, update).await.map(Json)
}

/// `DELETE /api/canteen/menu-dishes/:id`
pub async fn delete_menu_dish(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    menu::delete_menu_dish(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/canteen/order-windows`
pub async fn list_order_windows(
    State(state): State<ApiState>,
    _user: AuthUser,
) -> Result<Json<Vec<order_window_entity::Model>>> {
    order_window::list_order_windows(&state.db).await.map(Json)
}

/// `POST /api/canteen/order-windows`
pub async fn create_order_window(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Payload(input): Payload<OrderWindowInput>,
) -> Result<Created<order_window_entity::Model>> {
    let created = order_window::create_order_window(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/canteen/order-windows/:id`
pub async fn get_order_window(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<order_window_entity::Model>> {
    order_window::get_order_window(&state.db, id).await.map(Json)
}

/// `PUT /api/canteen/order-windows/:id`
pub async fn update_order_window(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(input): Payload<OrderWindowInput>,
) -> Result<Json<order_window_entity::Model>> {
    order_window::update_order_window(&state.db, id, input)
        .await
        .map(Json)
}

/// `DELETE /api/canteen/order-windows/:id`
pub async fn delete_order_window(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    order_window::delete_order_window(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/canteen/subsidy-rules`
pub async fn list_subsidy_rules(
    State(state): State<ApiState>,
    _user: AuthUser,
) -> Result<Json<Vec<subsidy_rule::Model>>> {
    subsidy::list_subsidy_rules(&state.db).await.map(Json)
}

/// `POST /api/canteen/subsidy-rules`
pub async fn create_subsidy_rule(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Payload(input): Payload<SubsidyRuleInput>,
) -> Result<Created<subsidy_rule::Model>> {
    let created = subsidy::create_subsidy_rule(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/canteen/subsidy-rules/:id`
pub async fn get_subsidy_rule(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<subsidy_rule::Model>> {
    subsidy::get_subsidy_rule(&state.db, id).await.map(Json)
}

/// `PUT /api/canteen/subsidy-rules/:id`
pub async fn update_subsidy_rule(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(input): Payload<SubsidyRuleInput>,
) -> Result<Json<subsidy_rule::Model>> {
    subsidy::update_subsidy_rule(&state.db, id, input)
        .await
        .map(Json)
}

/// `DELETE /api/canteen/subsidy-rules/:id`
pub async fn delete_subsidy_rule(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    subsidy::delete_subsidy_rule(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query of `GET /api/canteen/active-subsidy-rule`
#[derive(Debug, Default, Deserialize)]
pub struct OnDate {
    date: Option<NaiveDate>,
}

/// `GET /api/canteen/active-subsidy-rule`; today unless `date` is given
pub async fn active_subsidy_rule(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(query): Params<OnDate>,
) -> Result<Json<Option<subsidy_rule::Model>>> {
    let date = query.date.unwrap_or_else(|| state.clock.today());
    subsidy::active_rule(&state.db, date).await.map(Json)
}

/// `GET /api/canteen/invoices`
pub async fn list_invoices(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(range): Params<DateRange>,
) -> Result<Json<Vec<invoice_entity::Model>>> {
    invoice::list_invoices(&state.db, range.date_from, range.date_to)
        .await
        .map(Json)
}

/// `GET /api/canteen/invoices/:date`
pub async fn get_invoice(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(date): Id<NaiveDate>,
) -> Result<Json<invoice_entity::Model>> {
    invoice::get_invoice_by_date(&state.db, date)
        .await
        .map(Json)
}

/// `POST /api/canteen/invoices/:date`
pub async fn generate_invoice(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(date): Id<NaiveDate>,
) -> Result<Json<invoice_entity::Model>> {
    invoice::generate_invoice(&state.db, &state.settings.invoice_dir, date)
        .await
        .map(Json)
}

/// `GET /api/canteen/invoices/:date/document`
pub async fn invoice_document(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(date): Id<NaiveDate>,
) -> Result<impl IntoResponse> {
    let text = invoice::document_contents(&state.db, &state.settings.invoice_dir, date).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// `GET /api/canteen/extras`
pub async fn list_extras(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(filter): Params<ExtraFilter>,
) -> Result<Json<Vec<extra_entity::Model>>> {
    extra::list_extras(&state.db, &filter).await.map(Json)
}

/// `POST /api/canteen/extras`
pub async fn create_extra(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(input): Payload<ExtraInput>,
) -> Result<Created<extra_entity::Model>> {
    let created = extra::create_extra(&state.db, input, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/canteen/extras/:id`
pub async fn get_extra(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<extra_entity::Model>> {
    extra::get_extra(&state.db, id).await.map(Json)
}

/// `PUT /api/canteen/extras/:id`
pub async fn update_extra(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
    Payload(input): Payload<ExtraInput>,
) -> Result<Json<extra_entity::Model>> {
    extra::update_extra(&state.db, id, input, Some(user.id))
        .await
        .map(Json)
}

/// `DELETE /api/canteen/extras/:id`
pub async fn delete_extra(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    extra::delete_extra(&state.db, id, Some(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
