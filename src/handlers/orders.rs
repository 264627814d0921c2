use super::common::{created_response, JsonBody};
use crate::{
    auth::ActorContext,
    entities::order,
    errors::{ErrorResponse, ServiceError},
    services::{
        carts::{AddToCartOutcome, RemoveFromCartOutcome},
        orders::{
            ArchiveOutcome, CreateFullOrderRequest, DeleteOrderOutcome, FullOrder, OrderUpdate,
            OrderUpdateOutcome,
        },
    },
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
pub struct CreateFullOrderResponse {
    pub message: String,
    #[serde(rename = "orderId")]
    pub order_id: i32,
    pub order: FullOrder,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderCartResponse {
    pub cart_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderUpdateResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: OrderUpdateOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub message: String,
    pub order: order::Model,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchiveResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: ArchiveOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteOrderResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: DeleteOrderOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub order_id: i32,
    pub cart_id: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddToCartResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: AddToCartOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveFromCartResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: RemoveFromCartOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BarcodeRequest {
    pub barcode: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseMethodRequest {
    pub purchase_method: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/full",
    request_body = CreateFullOrderRequest,
    responses(
        (status = 201, description = "Order and detail created at position 1", body = CreateFullOrderResponse),
        (status = 400, description = "Creator rule violated or detail missing", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_full_order(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<CreateFullOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .create_full_order(request, Some(&actor))
        .await?;
    Ok(created_response(CreateFullOrderResponse {
        message: "Order created successfully".to_string(),
        order_id: order.order.id,
        order,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its detail, placement and activity history", body = FullOrder),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<FullOrder>, ServiceError> {
    Ok(Json(state.services.orders.get_order(order_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/cart",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Cart the order is linked to, if any", body = OrderCartResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order_cart_id(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderCartResponse>, ServiceError> {
    let cart_id = state.services.orders.get_order_cart_id(order_id).await?;
    Ok(Json(OrderCartResponse { cart_id }))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    request_body = OrderUpdate,
    responses(
        (status = 200, description = "Changed fields", body = OrderUpdateResponse),
        (status = 400, description = "Invalid field or illegal position step", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
    JsonBody(update): JsonBody<OrderUpdate>,
) -> Result<Json<OrderUpdateResponse>, ServiceError> {
    let outcome = state
        .services
        .orders
        .update_order(order_id, update, &actor)
        .await?;
    let message = if outcome.changed_fields.is_empty() {
        format!("Order {} unchanged", order_id)
    } else {
        format!("Order {} updated successfully", order_id)
    };
    Ok(Json(OrderUpdateResponse { message, outcome }))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/move-to-purchased",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order moved to position 3", body = OrderResponse),
        (status = 400, description = "Order not at position 2 or incomplete", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn move_to_purchased(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state
        .services
        .orders
        .move_to_purchased(order_id, Some(&actor))
        .await?;
    Ok(Json(OrderResponse {
        message: format!("Order {} moved to position 3", order_id),
        order,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/barcode",
    params(("id" = i32, Path, description = "Order id")),
    request_body = BarcodeRequest,
    responses(
        (status = 200, description = "Barcode stored", body = OrderResponse),
        (status = 400, description = "Empty barcode", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn set_barcode(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<BarcodeRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state
        .services
        .orders
        .set_barcode(order_id, &request.barcode, Some(&actor))
        .await?;
    Ok(Json(OrderResponse {
        message: "Barcode updated successfully".to_string(),
        order,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}/barcode",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Barcode cleared", body = OrderResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn clear_barcode(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state
        .services
        .orders
        .clear_barcode(order_id, Some(&actor))
        .await?;
    Ok(Json(OrderResponse {
        message: "Barcode cleared successfully".to_string(),
        order,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/purchase-method",
    params(("id" = i32, Path, description = "Order id")),
    request_body = PurchaseMethodRequest,
    responses(
        (status = 200, description = "Purchase method stored", body = OrderResponse),
        (status = 400, description = "Empty purchase method", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn set_purchase_method(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<PurchaseMethodRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state
        .services
        .orders
        .set_purchase_method(order_id, &request.purchase_method, Some(&actor))
        .await?;
    Ok(Json(OrderResponse {
        message: "Purchase method updated successfully".to_string(),
        order,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/archive",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order archived, or already archived", body = ArchiveResponse),
        (status = 400, description = "Order not at position 2", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn archive_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<ArchiveResponse>, ServiceError> {
    let outcome = state
        .services
        .orders
        .archive_order(order_id, Some(&actor))
        .await?;
    let message = if outcome.already {
        format!("Order {} is already archived", order_id)
    } else {
        format!("Order {} archived", order_id)
    };
    Ok(Json(ArchiveResponse { message, outcome }))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/unarchive",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order unarchived, or already active", body = ArchiveResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn unarchive_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<ArchiveResponse>, ServiceError> {
    let outcome = state
        .services
        .orders
        .unarchive_order(order_id, Some(&actor))
        .await?;
    let message = if outcome.already {
        format!("Order {} is already unarchived", order_id)
    } else {
        format!("Order {} unarchived", order_id)
    };
    Ok(Json(ArchiveResponse { message, outcome }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order deleted", body = DeleteOrderResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<DeleteOrderResponse>, ServiceError> {
    let outcome = state
        .services
        .orders
        .delete_order(order_id, Some(&actor))
        .await?;
    Ok(Json(DeleteOrderResponse {
        message: format!("Order {} deleted", order_id),
        outcome,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/add-to-cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Order linked to the cart", body = AddToCartResponse),
        (status = 400, description = "Cart closed or order past stage 2", body = ErrorResponse),
        (status = 404, description = "Order or cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn add_order_to_cart(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<AddToCartRequest>,
) -> Result<Json<AddToCartResponse>, ServiceError> {
    let outcome = state
        .services
        .carts
        .add_order_to_cart(request.order_id, request.cart_id, Some(&actor))
        .await?;
    Ok(Json(AddToCartResponse {
        message: format!(
            "Order {} added to cart {}",
            outcome.order_id, outcome.cart_id
        ),
        outcome,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/remove-from-cart/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order unlinked from its cart and unarchived", body = RemoveFromCartResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn remove_order_from_cart(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<RemoveFromCartResponse>, ServiceError> {
    let outcome = state
        .services
        .carts
        .remove_order_from_cart(order_id, Some(&actor))
        .await?;
    let message = match outcome.previous_cart_id {
        Some(cart_id) => format!(
            "Order {} removed from cart {} and unarchived",
            order_id, cart_id
        ),
        None => format!("Order {} unarchived (no cart to remove)", order_id),
    };
    Ok(Json(RemoveFromCartResponse { message, outcome }))
}

