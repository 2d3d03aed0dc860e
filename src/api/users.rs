//! User management and health endpoints.

use super::{
    ApiState,
    auth::StaffUser,
    error::{Id, Payload},
};
use crate::{
    core::auth::{self, NewUser, PermissionInput, UserUpdate},
    entities::{User, user, user_permission},
    errors::Result,
};
use axum::{Json, extract::State, http::StatusCode};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{Value, json};

/// `GET /api/health`
pub async fn health(State(state): State<ApiState>) -> Result<Json<Value>> {
    let users = User::find().count(&state.db).await?;
    Ok(Json(json!({ "status": "ok", "users": users })))
}

/// `GET /api/users`
pub async fn list(
    State(state): State<ApiState>,
    _staff: StaffUser,
) -> Result<Json<Vec<user::Model>>> {
    auth::list_users(&state.db).await.map(Json)
}

/// `POST /api/users`
pub async fn create(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Payload(new_user): Payload<NewUser>,
) -> Result<(StatusCode, Json<user::Model>)> {
    let created = auth::create_user(&state.db, new_user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/users/:id`
pub async fn get(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<Json<user::Model>> {
    auth::get_user(&state.db, id).await.map(Json)
}

/// `PUT /api/users/:id`
pub async fn update(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(update): Payload<UserUpdate>,
) -> Result<Json<user::Model>> {
    auth::update_user(&state.db, id, update).await.map(Json)
}

/// `DELETE /api/users/:id`
pub async fn delete(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    auth::delete_user(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/users/:id/permissions`
pub async fn permissions(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<Json<Vec<user_permission::Model>>> {
    auth::get_user(&state.db, id).await?;
    auth::list_permissions(&state.db, id).await.map(Json)
}

/// `PUT /api/users/:id/permissions`
pub async fn set_permissions(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
    Payload(grants): Payload<Vec<PermissionInput>>,
) -> Result<Json<Vec<user_permission::Model>>> {
    auth::set_permissions(&state.db, id, grants).await.map(Json)
}
