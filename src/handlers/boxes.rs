use super::common::{created_response, JsonBody};
use crate::{
    auth::ActorContext,
    entities::shipping_box,
    errors::{ErrorResponse, ServiceError},
    services::boxes::{
        AssignToBoxOutcome, BoxArrivalOutcome, CreateBoxRequest, RemoveFromBoxOutcome,
        SealBoxOutcome,
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
pub struct AssignToBoxRequest {
    pub order_id: i32,
    pub box_id: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveFromBoxRequest {
    pub order_id: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignToBoxResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: AssignToBoxOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveFromBoxResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: RemoveFromBoxOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SealBoxResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: SealBoxOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BoxArrivalResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: BoxArrivalOutcome,
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes",
    request_body = CreateBoxRequest,
    responses(
        (status = 201, description = "Open, empty box created", body = shipping_box::Model),
        (status = 400, description = "Missing number", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn add_box(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<CreateBoxRequest>,
) -> Result<Response, ServiceError> {
    let created = state.services.boxes.add_box(request, Some(&actor)).await?;
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/boxes/{id}",
    params(("id" = i32, Path, description = "Box id")),
    responses(
        (status = 200, description = "Box", body = shipping_box::Model),
        (status = 404, description = "Box not found", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn get_box(
    State(state): State<AppState>,
    Path(box_id): Path<i32>,
) -> Result<Json<shipping_box::Model>, ServiceError> {
    Ok(Json(state.services.boxes.get_box(box_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes/assign",
    request_body = AssignToBoxRequest,
    responses(
        (status = 200, description = "Order packed into the box", body = AssignToBoxResponse),
        (status = 400, description = "Box sealed or order not at position 3", body = ErrorResponse),
        (status = 404, description = "Order or box not found", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn assign_order_to_box(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<AssignToBoxRequest>,
) -> Result<Json<AssignToBoxResponse>, ServiceError> {
    let outcome = state
        .services
        .boxes
        .assign_order_to_box(request.order_id, request.box_id, Some(&actor))
        .await?;
    Ok(Json(AssignToBoxResponse {
        message: format!(
            "Order {} assigned to box {}",
            outcome.order_id, outcome.box_id
        ),
        outcome,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes/remove",
    request_body = RemoveFromBoxRequest,
    responses(
        (status = 200, description = "Order unpacked", body = RemoveFromBoxResponse),
        (status = 400, description = "Order already shipped", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn remove_order_from_box(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<RemoveFromBoxRequest>,
) -> Result<Json<RemoveFromBoxResponse>, ServiceError> {
    let outcome = state
        .services
        .boxes
        .remove_order_from_box(request.order_id, Some(&actor))
        .await?;
    let message = match outcome.previous_box_id {
        Some(box_id) => format!("Order {} removed from box {}", outcome.order_id, box_id),
        None => format!("Order {} was not in a box", outcome.order_id),
    };
    Ok(Json(RemoveFromBoxResponse { message, outcome }))
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes/{id}/move-to-shipping",
    params(("id" = i32, Path, description = "Box id")),
    responses(
        (status = 200, description = "Box sealed; orders and shipments cascaded", body = SealBoxResponse),
        (status = 404, description = "Box not found", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn seal_box(
    State(state): State<AppState>,
    Path(box_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<SealBoxResponse>, ServiceError> {
    let outcome = state.services.boxes.seal_box(box_id, Some(&actor)).await?;
    Ok(Json(SealBoxResponse {
        message: format!("Box {} moved to shipping", box_id),
        outcome,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes/{id}/arrive",
    params(("id" = i32, Path, description = "Box id")),
    responses(
        (status = 200, description = "Shipping orders in the box arrived", body = BoxArrivalResponse),
        (status = 400, description = "Box still open", body = ErrorResponse),
        (status = 404, description = "Box not found", body = ErrorResponse)
    ),
    tag = "boxes"
)]
pub async fn move_orders_packed_to_arrived(
    State(state): State<AppState>,
    Path(box_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<BoxArrivalResponse>, ServiceError> {
    let outcome = state
        .services
        .boxes
        .move_orders_packed_to_arrived(box_id, Some(&actor))
        .await?;
    Ok(Json(BoxArrivalResponse {
        message: "Orders moved from position 4 to 5".to_string(),
        outcome,
    }))
}
