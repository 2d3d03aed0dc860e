//! Bearer authentication: extractors and token endpoints.

use super::{ApiState, error::Payload};
use crate::{
    core::auth::{self, TokenPair},
    entities::{user, user_permission},
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Caller authenticated by an access token
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

/// Authenticated caller with the staff or superuser flag
#[derive(Debug, Clone)]
pub struct StaffUser(pub user::Model);

fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::unauthorized("Authentication credentials were not provided"))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::unauthorized("Expected a Bearer token"))
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self> {
        let token = bearer_token(parts)?;
        let user = auth::user_from_access_token(&state.db, &state.settings, token, Utc::now()).await?;
        Ok(Self(user))
    }
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for StaffUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !auth::is_admin(&user) {
            return Err(Error::forbidden("Staff access required"));
        }
        Ok(Self(user))
    }
}

/// Credentials for `POST /api/auth/token`
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    username: String,
    password: String,
}

/// Body of `POST /api/auth/token/refresh`
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    refresh: String,
}

/// The caller with their grants
#[derive(Debug, Serialize)]
pub struct Me {
    #[serde(flatten)]
    user: user::Model,
    privileged: bool,
    permissions: Vec<user_permission::Model>,
}

/// `POST /api/auth/token`
pub async fn issue_token(
    State(state): State<ApiState>,
    Payload(request): Payload<TokenRequest>,
) -> Result<Json<TokenPair>> {
    let user = auth::authenticate(&state.db, &request.username, &request.password).await?;
    auth::issue_tokens(&state.settings, user.id, Utc::now()).map(Json)
}

/// `POST /api/auth/token/refresh`
pub async fn refresh_token(
    State(state): State<ApiState>,
    Payload(request): Payload<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    auth::refresh_tokens(&state.db, &state.settings, &request.refresh, Utc::now())
        .await
        .map(Json)
}

/// `GET /api/me`
pub async fn me(State(state): State<ApiState>, AuthUser(user): AuthUser) -> Result<Json<Me>> {
    let privileged = auth::is_privileged(&state.db, &user).await?;
    let permissions = auth::list_permissions(&state.db, user.id).await?;
    Ok(Json(Me {
        user,
        privileged,
        permissions,
    }))
}
