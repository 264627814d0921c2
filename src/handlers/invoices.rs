use super::common::{created_response, JsonBody};
use crate::{
    auth::ActorContext,
    entities::purchase_invoice,
    errors::{ErrorResponse, ServiceError},
    services::invoices::{
        AddInvoiceRequest, ApplyPurchaseOutcome, ApplyPurchaseRequest, InvoiceLinkOutcome,
        ReplaceInvoiceOutcome, ReplaceInvoiceRequest,
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
pub struct InvoiceLinkResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: InvoiceLinkOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApplyPurchaseResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: ApplyPurchaseOutcome,
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = AddInvoiceRequest,
    responses(
        (status = 201, description = "Invoice stored and linked to the order", body = InvoiceLinkResponse),
        (status = 400, description = "Missing order id or payload", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn add_invoice(
    State(state): State<AppState>,
    actor: ActorContext,
    JsonBody(request): JsonBody<AddInvoiceRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .invoices
        .add_invoice(request, Some(&actor))
        .await?;
    Ok(created_response(InvoiceLinkResponse {
        message: "Invoice added and linked to order successfully".to_string(),
        outcome,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Invoice linked to the order", body = purchase_invoice::Model),
        (status = 404, description = "Order or invoice not found", body = ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<purchase_invoice::Model>, ServiceError> {
    Ok(Json(
        state.services.invoices.get_invoice_by_order(order_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/invoice/replace",
    params(("id" = i32, Path, description = "Order id")),
    request_body = ReplaceInvoiceRequest,
    responses(
        (status = 200, description = "Invoice replaced", body = ReplaceInvoiceOutcome),
        (status = 400, description = "old_invoice_id does not match the order", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn replace_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<ReplaceInvoiceRequest>,
) -> Result<Json<ReplaceInvoiceOutcome>, ServiceError> {
    let outcome = state
        .services
        .invoices
        .replace_invoice(order_id, request, Some(&actor))
        .await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/purchase",
    params(("id" = i32, Path, description = "Order id")),
    request_body = ApplyPurchaseRequest,
    responses(
        (status = 200, description = "Purchase method stored and invoice linked", body = ApplyPurchaseResponse),
        (status = 400, description = "Missing method or payload", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn apply_purchase(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    actor: ActorContext,
    JsonBody(request): JsonBody<ApplyPurchaseRequest>,
) -> Result<Json<ApplyPurchaseResponse>, ServiceError> {
    let outcome = state
        .services
        .invoices
        .apply_purchase(order_id, request, Some(&actor))
        .await?;
    Ok(Json(ApplyPurchaseResponse {
        message: "Purchase applied and invoice linked successfully".to_string(),
        outcome,
    }))
}
