//! Order endpoints, for members and staff alike.
//!
//! Visibility and privilege checks live in the order service; handlers only
//! authenticate and pass the caller along.

use super::{
    ApiState,
    auth::AuthUser,
    error::{Id, Params, Payload},
};
use crate::{
    core::order::{self, OrderFilter, OrderInput, OrderView},
    entities::order_line,
    errors::Result,
};
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

/// `GET /api/canteen/orders`
pub async fn list(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Params(filter): Params<OrderFilter>,
) -> Result<Json<Vec<OrderView>>> {
    order::list_orders(&state.db, &state.settings, &user, &filter)
        .await
        .map(Json)
}

/// `POST /api/canteen/orders`
pub async fn submit(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(input): Payload<OrderInput>,
) -> Result<(StatusCode, Json<OrderView>)> {
    let view =
        order::submit_order(&state.db, &state.settings, state.clock.now(), &user, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/canteen/orders/:id`
pub async fn get(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<OrderView>> {
    order::get_order(&state.db, &state.settings, &user, id)
        .await
        .map(Json)
}

/// `DELETE /api/canteen/orders/:id`
pub async fn delete(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    order::delete_order(&state.db, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/canteen/orders/:id/validate`
pub async fn validate(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<OrderView>> {
    order::validate_order(
        &state.db,
        &state.settings,
        state.notifier.as_ref(),
        &user,
        id,
    )
    .await
    .map(Json)
}

/// `POST /api/canteen/orders/:id/cancel`
pub async fn cancel(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<OrderView>> {
    order::cancel_order(&state.db, &state.settings, &user, id)
        .await
        .map(Json)
}

/// `POST /api/canteen/orders/:id/deliver`
pub async fn deliver(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<OrderView>> {
    order::deliver_order(&state.db, &state.settings, &user, id)
        .await
        .map(Json)
}

/// Query of `GET /api/canteen/order-lines`
#[derive(Debug, Default, Deserialize)]
pub struct LineQuery {
    order_id: Option<i64>,
}

/// `GET /api/canteen/order-lines`
pub async fn list_lines(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Params(query): Params<LineQuery>,
) -> Result<Json<Vec<order_line::Model>>> {
    order::list_order_lines(&state.db, &user, query.order_id)
        .await
        .map(Json)
}

/// `GET /api/canteen/order-lines/:id`
pub async fn get_line(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<order_line::Model>> {
    order::get_order_line(&state.db, &user, id).await.map(Json)
}
