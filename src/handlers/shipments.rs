use super::common::{created_response, JsonBody};
use crate::{
    auth::ActorContext,
    entities::shipment_image,
    errors::{ErrorResponse, ServiceError},
    services::shipments::{
        AddShipmentImageRequest, CreateShipmentRequest, ShipmentArrivalOutcome,
        ShipmentWithImages, UpdateShipmentRequest,
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
pub struct ShipmentArrivalResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: ShipmentArrivalOutcome,
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created ready, with its images", body = ShipmentWithImages),
        (status = 400, description = "Missing or invalid field", body = ErrorResponse),
        (status = 404, description = "Box not found", body = ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn add_shipment(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<CreateShipmentRequest>,
) -> Result<Response, ServiceError> {
    let created = state
        .services
        .shipments
        .add_shipment(request, Some(&actor))
        .await?;
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}",
    params(("id" = i32, Path, description = "Shipment id")),
    responses(
        (status = 200, description = "Shipment with images", body = ShipmentWithImages),
        (status = 404, description = "Shipment not found", body = ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    Path(shipment_id): Path<i32>,
) -> Result<Json<ShipmentWithImages>, ServiceError> {
    Ok(Json(state.services.shipments.get_shipment(shipment_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/shipments/{id}",
    params(("id" = i32, Path, description = "Shipment id")),
    request_body = UpdateShipmentRequest,
    responses(
        (status = 200, description = "Shipment updated", body = ShipmentWithImages),
        (status = 400, description = "Invalid field", body = ErrorResponse),
        (status = 404, description = "Shipment or box not found", body = ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn update_shipment(
    State(state): State<AppState>,
    Path(shipment_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<UpdateShipmentRequest>,
) -> Result<Json<ShipmentWithImages>, ServiceError> {
    let updated = state
        .services
        .shipments
        .update_shipment(shipment_id, request, Some(&actor))
        .await?;
    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/images",
    params(("id" = i32, Path, description = "Shipment id")),
    request_body = AddShipmentImageRequest,
    responses(
        (status = 201, description = "Image attached", body = shipment_image::Model),
        (status = 404, description = "Shipment not found", body = ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn add_shipment_image(
    State(state): State<AppState>,
    Path(shipment_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<AddShipmentImageRequest>,
) -> Result<Response, ServiceError> {
    let image = state
        .services
        .shipments
        .add_shipment_image(shipment_id, request, Some(&actor))
        .await?;
    Ok(created_response(image))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/arrive",
    params(("id" = i32, Path, description = "Shipment id")),
    responses(
        (status = 200, description = "Shipment arrived; every order in its box moved to position 5", body = ShipmentArrivalResponse),
        (status = 400, description = "Shipment not in transit", body = ErrorResponse),
        (status = 404, description = "Shipment not found", body = ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn mark_arrived(
    State(state): State<AppState>,
    Path(shipment_id): Path<i32>,
    actor: ActorContext,
) -> Result<Json<ShipmentArrivalResponse>, ServiceError> {
    let outcome = state
        .services
        .shipments
        .mark_arrived(shipment_id, Some(&actor))
        .await?;
    Ok(Json(ShipmentArrivalResponse {
        message: format!("Shipment {} arrived", shipment_id),
        outcome,
    }))
}
