//! Unauthenticated menu page and guest ordering.

use super::{
    ApiState,
    error::{Id, Payload},
};
use crate::{
    core::{
        menu::{self, MenuDetail},
        order::{self, PublicOrderInput, PublicOrderReceipt},
    },
    errors::Result,
};
use axum::{Json, extract::State, http::StatusCode};

/// `GET /api/public/menus/:token`
pub async fn menu(
    State(state): State<ApiState>,
    Id(token): Id<String>,
) -> Result<Json<MenuDetail>> {
    let found = menu::published_menu_for_token(&state.db, &token, state.clock.today()).await?;
    menu::menu_detail(&state.db, found).await.map(Json)
}

/// `POST /api/public/menus/:token/orders`
pub async fn place_order(
    State(state): State<ApiState>,
    Id(token): Id<String>,
    Payload(input): Payload<PublicOrderInput>,
) -> Result<(StatusCode, Json<PublicOrderReceipt>)> {
    let receipt = order::submit_public_order(
        &state.db,
        &state.settings,
        state.clock.now(),
        &token,
        input,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
