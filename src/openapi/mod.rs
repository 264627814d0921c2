use crate::handlers;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fulfillment API",
        version = "1.0.0",
        description = r#"
# Order fulfillment API

Tracks orders through a fixed pipeline: created (1), in a cart (2),
purchased (3), shipping in a sealed box (4) and arrived (5).

## Actors

Authentication is handled upstream. Every request carries the caller as
`x-actor-id` (integer) and `x-actor-type` (`user` or `customer`).

## Errors

```json
{
  "error": "Bad Request",
  "message": "Precondition failed: Cart 11 has orders without an invoice or purchase method",
  "invalid_order_ids": [201],
  "request_id": "6b0f...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order lifecycle endpoints"),
        (name = "carts", description = "Cart membership and cart close"),
        (name = "boxes", description = "Box packing, sealing and arrival"),
        (name = "shipments", description = "Shipments and their images"),
        (name = "invoices", description = "Purchase invoices")
    ),
    paths(
        // Orders
        handlers::orders::create_full_order,
        handlers::orders::get_order,
        handlers::orders::get_order_cart_id,
        handlers::orders::update_order,
        handlers::orders::move_to_purchased,
        handlers::orders::set_barcode,
        handlers::orders::clear_barcode,
        handlers::orders::set_purchase_method,
        handlers::orders::archive_order,
        handlers::orders::unarchive_order,
        handlers::orders::delete_order,
        // Carts
        handlers::orders::add_order_to_cart,
        handlers::orders::remove_order_from_cart,
        handlers::carts::create_cart,
        handlers::carts::get_cart,
        handlers::carts::list_cart_orders,
        handlers::carts::close_cart,
        // Boxes
        handlers::boxes::add_box,
        handlers::boxes::get_box,
        handlers::boxes::assign_order_to_box,
        handlers::boxes::remove_order_from_box,
        handlers::boxes::seal_box,
        handlers::boxes::move_orders_packed_to_arrived,
        // Shipments
        handlers::shipments::add_shipment,
        handlers::shipments::get_shipment,
        handlers::shipments::update_shipment,
        handlers::shipments::add_shipment_image,
        handlers::shipments::mark_arrived,
        // Invoices
        handlers::invoices::add_invoice,
        handlers::invoices::get_invoice_by_order,
        handlers::invoices::replace_invoice,
        handlers::invoices::apply_purchase,
    ),
    components(schemas(crate::errors::ErrorResponse, crate::auth::ActorType))
)]
pub struct ApiDocV1;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_lifecycle_paths() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Fulfillment API"));
        assert!(json.contains("/api/v1/carts/{id}/unavailable"));
        assert!(json.contains("/api/v1/boxes/{id}/move-to-shipping"));
        assert!(json.contains("/api/v1/shipments/{id}/arrive"));
        assert!(json.contains("invalid_order_ids"));
    }
}
