//! Fulfillment API library
//!
//! Order lifecycle engine, cart and box/shipment aggregators, and the HTTP
//! surface that exposes them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AuthRouterExt, PermissionGate};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: handlers::AppServices,
    pub permissions: Arc<dyn PermissionGate>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Result<Self, errors::ServiceError> {
        let permissions = auth::permission_gate_from_config(&config)?;
        let services = handlers::AppServices::new(db.clone(), event_sender.clone());
        Ok(Self {
            db,
            config,
            event_sender,
            services,
            permissions,
        })
    }
}

/// Every `/api/v1` route. Each group passes through the permission gate
/// with its own action and resource.
pub fn api_v1_routes(gate: Arc<dyn PermissionGate>) -> Router<AppState> {
    // Orders
    let orders_read = Router::new()
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cart", get(handlers::orders::get_order_cart_id))
        .with_permission(gate.clone(), "read", "orders");

    let orders_create = Router::new()
        .route("/orders/full", post(handlers::orders::create_full_order))
        .with_permission(gate.clone(), "create", "orders");

    let orders_update = Router::new()
        .route("/orders/:id", put(handlers::orders::update_order))
        .route(
            "/orders/:id/move-to-purchased",
            post(handlers::orders::move_to_purchased),
        )
        .route(
            "/orders/:id/barcode",
            put(handlers::orders::set_barcode).delete(handlers::orders::clear_barcode),
        )
        .route(
            "/orders/:id/purchase-method",
            put(handlers::orders::set_purchase_method),
        )
        .route("/orders/:id/archive", post(handlers::orders::archive_order))
        .route(
            "/orders/:id/unarchive",
            post(handlers::orders::unarchive_order),
        )
        .with_permission(gate.clone(), "update", "orders");

    let orders_delete = Router::new()
        .route("/orders/:id", delete(handlers::orders::delete_order))
        .with_permission(gate.clone(), "delete", "orders");

    // Carts
    let carts_read = Router::new()
        .route("/carts/:id", get(handlers::carts::get_cart))
        .route("/carts/:id/orders", get(handlers::carts::list_cart_orders))
        .with_permission(gate.clone(), "read", "carts");

    let carts_manage = Router::new()
        .route("/carts", post(handlers::carts::create_cart))
        .route("/carts/:id/unavailable", post(handlers::carts::close_cart))
        .route(
            "/orders/add-to-cart",
            post(handlers::orders::add_order_to_cart),
        )
        .route(
            "/orders/remove-from-cart/:id",
            put(handlers::orders::remove_order_from_cart)
                .post(handlers::orders::remove_order_from_cart),
        )
        .with_permission(gate.clone(), "manage", "carts");

    // Boxes
    let boxes_read = Router::new()
        .route("/boxes/:id", get(handlers::boxes::get_box))
        .with_permission(gate.clone(), "read", "boxes");

    let boxes_manage = Router::new()
        .route("/boxes", post(handlers::boxes::add_box))
        .route("/boxes/assign", post(handlers::boxes::assign_order_to_box))
        .route("/boxes/remove", post(handlers::boxes::remove_order_from_box))
        .route(
            "/boxes/:id/move-to-shipping",
            post(handlers::boxes::seal_box),
        )
        .route(
            "/boxes/:id/arrive",
            post(handlers::boxes::move_orders_packed_to_arrived),
        )
        .with_permission(gate.clone(), "manage", "boxes");

    // Shipments
    let shipments_read = Router::new()
        .route("/shipments/:id", get(handlers::shipments::get_shipment))
        .with_permission(gate.clone(), "read", "shipments");

    let shipments_manage = Router::new()
        .route("/shipments", post(handlers::shipments::add_shipment))
        .route("/shipments/:id", put(handlers::shipments::update_shipment))
        .route(
            "/shipments/:id/images",
            post(handlers::shipments::add_shipment_image),
        )
        .route(
            "/shipments/:id/arrive",
            post(handlers::shipments::mark_arrived),
        )
        .with_permission(gate.clone(), "manage", "shipments");

    // Invoices
    let invoices_read = Router::new()
        .route(
            "/orders/:id/invoice",
            get(handlers::invoices::get_invoice_by_order),
        )
        .with_permission(gate.clone(), "read", "invoices");

    let invoices_manage = Router::new()
        .route("/invoices", post(handlers::invoices::add_invoice))
        .route(
            "/orders/:id/invoice/replace",
            post(handlers::invoices::replace_invoice),
        )
        .route(
            "/orders/:id/purchase",
            post(handlers::invoices::apply_purchase),
        )
        .with_permission(gate, "manage", "invoices");

    Router::new()
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_update)
        .merge(orders_delete)
        .merge(carts_read)
        .merge(carts_manage)
        .merge(boxes_read)
        .merge(boxes_manage)
        .merge(shipments_read)
        .merge(shipments_manage)
        .merge(invoices_read)
        .merge(invoices_manage)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = db::check_connection(&state.db).await.is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if db_ok { "healthy" } else { "unhealthy" },
            "checks": { "database": if db_ok { "healthy" } else { "unhealthy" } },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Full application router: health, the v1 API and the OpenAPI document,
/// wrapped in request ids and HTTP tracing. CORS is left to the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes(state.permissions.clone()))
        .merge(openapi::openapi_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::auth::{ActorContext, ActorType};
    pub use crate::entities::{Creator, OrderPosition, Placement, ShipmentStatus};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::services::{
        BoxService, CartService, InvoiceService, OrderService, ShipmentService,
    };
}
