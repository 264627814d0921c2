use super::common::created_response;
use crate::{
    auth::ActorContext,
    entities::{cart, order},
    errors::{ErrorResponse, ServiceError},
    services::carts::CloseCartOutcome,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartOrdersResponse {
    pub cart_id: i32,
    pub orders: Vec<order::Model>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CloseCartResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: CloseCartOutcome,
}

#[utoipa::path(
    post,
    path = "/api/v1/carts",
    responses((status = 201, description = "Empty cart created", body = cart::Model)),
    tag = "carts"
)]
pub async fn create_cart(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.create_cart(Some(&actor)).await?;
    Ok(created_response(cart))
}

#[utoipa::path(
    get,
    path = "/api/v1/carts/{id}",
    params(("id" = i32, Path, description = "Cart id")),
    responses(
        (status = 200, description = "Cart", body = cart::Model),
        (status = 404, description = "Cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<i32>,
) -> Result<Json<cart::Model>, ServiceError> {
    Ok(Json(state.services.carts.get_cart(cart_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/carts/{id}/orders",
    params(("id" = i32, Path, description = "Cart id")),
    responses(
        (status = 200, description = "Orders linked to the cart", body = CartOrdersResponse),
        (status = 404, description = "Cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn list_cart_orders(
    State(state): State<AppState>,
    Path(cart_id): Path<i32>,
) -> Result<Json<CartOrdersResponse>, ServiceError> {
    let orders = state.services.carts.list_cart_orders(cart_id).await?;
    Ok(Json(CartOrdersResponse { cart_id, orders }))
}

#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/unavailable",
    params(("id" = i32, Path, description = "Cart id")),
    responses(
        (status = 200, description = "Cart closed and its orders purchased", body = CloseCartResponse),
        (status = 400, description = "Some orders are incomplete; see invalid_order_ids", body = ErrorResponse),
        (status = 404, description = "Cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn close_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<CloseCartResponse>, ServiceError> {
    let outcome = state
        .services
        .carts
        .close_cart(cart_id, Some(&actor))
        .await?;
    Ok(Json(CloseCartResponse {
        message: format!("Cart {} closed", cart_id),
        outcome,
    }))
}
