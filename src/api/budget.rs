//! Budget endpoints: categories, forecasts, operations and imputations.
//!
//! Any authenticated user may read and write these resources; every write
//! is attributed to the caller in the audit log.

use super::{
    ApiState,
    auth::AuthUser,
    error::{Id, Params, Payload},
};
use crate::{
    core::{
        category::{self, CategoryInput, SubcategoryInput},
        forecast::{self, ForecastBalance, ForecastFilter, ForecastInput, ForecastView},
        imputation::{self, Allocation, ImputationFilter, ImputationInput},
        operation::{self, OperationFilter, OperationInput, OperationView},
    },
    entities::{category as category_entity, imputation as imputation_entity, subcategory},
    errors::Result,
};
use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

type Created<T> = (StatusCode, Json<T>);

/// `GET /api/categories`
pub async fn list_categories(
    State(state): State<ApiState>,
    _user: AuthUser,
) -> Result<Json<Vec<category_entity::Model>>> {
    category::list_categories(&state.db).await.map(Json)
}

/// `POST /api/categories`
pub async fn create_category(
    State(state): State<ApiState>,
    _user: AuthUser,
    Payload(input): Payload<CategoryInput>,
) -> Result<Created<category_entity::Model>> {
    let created = category::create_category(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/categories/:id`
pub async fn get_category(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<category_entity::Model>> {
    category::get_category(&state.db, id).await.map(Json)
}

/// `PUT /api/categories/:id`
pub async fn update_category(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
    Payload(input): Payload<CategoryInput>,
) -> Result<Json<category_entity::Model>> {
    category::update_category(&state.db, id, input).await.map(Json)
}

/// `DELETE /api/categories/:id`
pub async fn delete_category(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    category::delete_category(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query of `GET /api/subcategories`
#[derive(Debug, Default, Deserialize)]
pub struct SubcategoryQuery {
    category_id: Option<i64>,
}

/// `GET /api/subcategories`
pub async fn list_subcategories(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(query): Params<SubcategoryQuery>,
) -> Result<Json<Vec<subcategory::Model>>> {
    category::list_subcategories(&state.db, query.category_id)
        .await
        .map(Json)
}

/// `POST /api/subcategories`
pub async fn create_subcategory(
    State(state): State<ApiState>,
    _user: AuthUser,
    Payload(input): Payload<SubcategoryInput>,
) -> Result<Created<subcategory::Model>> {
    let created = category::create_subcategory(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/subcategories/:id`
pub async fn get_subcategory(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<subcategory::Model>> {
    category::get_subcategory(&state.db, id).await.map(Json)
}

/// `PUT /api/subcategories/:id`
pub async fn update_subcategory(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
    Payload(input): Payload<SubcategoryInput>,
) -> Result<Json<subcategory::Model>> {
    category::update_subcategory(&state.db, id, input)
        .await
        .map(Json)
}

/// `DELETE /api/subcategories/:id`
pub async fn delete_subcategory(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    category::delete_subcategory(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/forecasts`
pub async fn list_forecasts(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(filter): Params<ForecastFilter>,
) -> Result<Json<Vec<ForecastView>>> {
    forecast::list_forecasts(&state.db, &filter).await.map(Json)
}

/// `POST /api/forecasts`
pub async fn create_forecast(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(input): Payload<ForecastInput>,
) -> Result<Created<ForecastView>> {
    let created = forecast::create_forecast(&state.db, input, Some(user.id)).await?;
    let view = forecast::view(&state.db, created).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/forecasts/:id`
pub async fn get_forecast(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<ForecastView>> {
    let found = forecast::get_forecast(&state.db, id).await?;
    forecast::view(&state.db, found).await.map(Json)
}

/// `PUT /api/forecasts/:id`
pub async fn update_forecast(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
    Payload(input): Payload<ForecastInput>,
) -> Result<Json<ForecastView>> {
    let updated = forecast::update_forecast(&state.db, id, input, Some(user.id)).await?;
    forecast::view(&state.db, updated).await.map(Json)
}

/// `DELETE /api/forecasts/:id`
pub async fn delete_forecast(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    forecast::delete_forecast(&state.db, id, Some(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/forecasts/:id/balance`
pub async fn forecast_balance(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<ForecastBalance>> {
    forecast::forecast_balance(&state.db, id).await.map(Json)
}

/// `GET /api/operations`
pub async fn list_operations(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(filter): Params<OperationFilter>,
) -> Result<Json<Vec<OperationView>>> {
    operation::list_operation_views(&state.db, &filter)
        .await
        .map(Json)
}

/// `POST /api/operations`
pub async fn create_operation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(input): Payload<OperationInput>,
) -> Result<Created<OperationView>> {
    let created = operation::create_operation(&state.db, input, Some(user.id)).await?;
    let view = operation::view(&state.db, created).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/operations/:id`
pub async fn get_operation(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<OperationView>> {
    operation::get_operation_view(&state.db, id).await.map(Json)
}

/// `PUT /api/operations/:id`
pub async fn update_operation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
    Payload(input): Payload<OperationInput>,
) -> Result<Json<OperationView>> {
    let updated = operation::update_operation(&state.db, id, input, Some(user.id)).await?;
    operation::view(&state.db, updated).await.map(Json)
}

/// `DELETE /api/operations/:id`
pub async fn delete_operation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    operation::delete_operation(&state.db, id, Some(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/imputations`
pub async fn list_imputations(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(filter): Params<ImputationFilter>,
) -> Result<Json<Vec<imputation_entity::Model>>> {
    imputation::list_imputations(&state.db, &filter)
        .await
        .map(Json)
}

/// `POST /api/imputations`
pub async fn create_imputation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(input): Payload<ImputationInput>,
) -> Result<Created<imputation_entity::Model>> {
    let created = imputation::create_imputation(&state.db, input, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/imputations/:id`
pub async fn get_imputation(
    State(state): State<ApiState>,
    _user: AuthUser,
    Id(id): Id<i64>,
) -> Result<Json<imputation_entity::Model>> {
    imputation::get_imputation(&state.db, id).await.map(Json)
}

/// Body of `PUT /api/imputations/:id`
#[derive(Debug, Deserialize)]
pub struct ImputationAmount {
    amount: Decimal,
}

/// `PUT /api/imputations/:id`
pub async fn update_imputation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
    Payload(body): Payload<ImputationAmount>,
) -> Result<Json<imputation_entity::Model>> {
    imputation::update_imputation(&state.db, id, body.amount, Some(user.id))
        .await
        .map(Json)
}

/// `DELETE /api/imputations/:id`
pub async fn delete_imputation(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Id(id): Id<i64>,
) -> Result<StatusCode> {
    imputation::delete_imputation(&state.db, id, Some(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of `POST /api/multi-imputations`
#[derive(Debug, Deserialize)]
pub struct MultiImputation {
    operation_id: i64,
    allocations: Vec<Allocation>,
}

/// `POST /api/multi-imputations`
pub async fn multi_impute(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Payload(body): Payload<MultiImputation>,
) -> Result<Created<Vec<imputation_entity::Model>>> {
    let saved =
        imputation::multi_impute(&state.db, body.operation_id, body.allocations, Some(user.id))
            .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}
