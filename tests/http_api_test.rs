mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use fulfillment_api::{config::AppConfig, entities::order};
use rstest::rstest;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

fn full_order_body() -> serde_json::Value {
    json!({
        "customer_id": 40,
        "creator_user_id": 1,
        "detail": {
            "title": "Record player",
            "total": "120.00"
        }
    })
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    let (status, body) = app.request_as(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "healthy");
}

#[rstest]
#[case(Method::POST, "/api/v1/carts")]
#[case(Method::GET, "/api/v1/orders/1")]
#[case(Method::POST, "/api/v1/boxes/1/move-to-shipping")]
#[case(Method::POST, "/api/v1/shipments/1/arrive")]
#[tokio::test]
async fn requests_without_an_actor_are_unauthorized(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::new().await;
    let (status, body) = app.request_as(method, uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn creations_return_201() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::POST, "/api/v1/carts", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["orders_count"], 0);

    let (status, body) = app
        .request(Method::POST, "/api/v1/orders/full", Some(full_order_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["orderId"].as_i64().unwrap();
    assert_eq!(body["order"]["order"]["position"], 1);
    assert_eq!(body["order"]["placement"]["kind"], "unassigned");

    let (status, body) = app
        .request(Method::POST, "/api/v1/boxes", Some(json!({ "number": "BX-1" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let box_id = body["id"].as_i64().unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/shipments",
            Some(json!({
                "box_id": box_id,
                "company_id": 2,
                "sender_name": "Dana",
                "weight": "3.2",
                "images": ["aW1n"]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["shipment"]["status"], 1);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({ "orderId": order_id, "invoiceBase64": "cGRm" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order_id"], order_id);
}

#[tokio::test]
async fn creator_conflict_is_rejected_without_insert() {
    let app = TestApp::new().await;
    let mut body = full_order_body();
    body["creator_customer_id"] = json!(9);

    let (status, response) = app
        .request(Method::POST, "/api/v1/orders/full", Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Bad Request");

    let count = order::Entity::find().count(&*app.state.db).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn incomplete_cart_close_lists_offending_orders() {
    let app = TestApp::new().await;
    let cart_id = app.create_cart().await;
    let order_id = app.create_order().await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/orders/add-to-cart",
            Some(json!({ "order_id": order_id, "cart_id": cart_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/unavailable", cart_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["invalid_order_ids"], json!([order_id]));
    assert!(body["request_id"].is_string());

    let (_, cart) = app
        .request(Method::GET, &format!("/api/v1/carts/{}", cart_id), None)
        .await;
    assert_eq!(cart["is_available"], true);
}

#[tokio::test]
async fn cart_close_over_http() {
    let app = TestApp::new().await;
    let cart_id = app.create_cart().await;
    app.purchasable_order_in(cart_id).await;
    app.purchasable_order_in(cart_id).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/unavailable", cart_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["moved_orders_count"], 2);
    assert_eq!(body["cart"]["is_available"], false);

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/carts/{}/orders", cart_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn remove_from_cart_accepts_put_and_post() {
    let app = TestApp::new().await;
    let cart_id = app.create_cart().await;
    let order_id = app.create_order().await;
    app.state
        .services
        .carts
        .add_order_to_cart(order_id, cart_id, None)
        .await
        .unwrap();

    let uri = format!("/api/v1/orders/remove-from-cart/{}", order_id);
    let (status, body) = app.request(Method::PUT, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_cart_id"], cart_id);
    assert_eq!(body["decremented_previous_cart"], true);

    let (status, body) = app.request(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_cart_id"], serde_json::Value::Null);
}

#[tokio::test]
async fn unified_update_rejects_unknown_fields() {
    let app = TestApp::new().await;
    let order_id = app.create_order().await;
    let uri = format!("/api/v1/orders/{}", order_id);

    let (status, body) = app
        .request(Method::PUT, &uri, Some(json!({ "customer_id": 5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");

    let (status, body) = app
        .request(Method::PUT, &uri, Some(json!({ "notes": "fragile", "position_id": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed_fields"], json!(["position", "notes"]));
}

#[tokio::test]
async fn invoice_replace_uses_camel_case() {
    let app = TestApp::new().await;
    let order_id = app.create_order().await;
    let linked = app
        .state
        .services
        .invoices
        .add_invoice(
            fulfillment_api::services::invoices::AddInvoiceRequest {
                order_id,
                invoice_base64: "b2xk".into(),
            },
            None,
        )
        .await
        .unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/invoice/replace", order_id),
            Some(json!({ "oldInvoiceId": linked.invoice_id, "invoiceBase64": "bmV3" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], order_id);
    assert_eq!(body["oldInvoiceId"], linked.invoice_id);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}/invoice", order_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice_image_base64"], "bmV3");
}

#[tokio::test]
async fn unknown_ids_are_404() {
    let app = TestApp::new().await;
    for uri in [
        "/api/v1/orders/404",
        "/api/v1/carts/404",
        "/api/v1/boxes/404",
        "/api/v1/shipments/404",
    ] {
        let (status, body) = app.request(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"], "Not Found");
    }
}

#[tokio::test]
async fn static_grants_gate_routes() {
    let mut cfg = AppConfig::with_database_url("sqlite::memory:");
    cfg.permissions_allow_all = false;
    cfg.permission_grants = vec!["user:1:read:*".into(), "user:2:*:carts".into()];
    let app = TestApp::with_config(cfg).await;

    let (status, body) = app
        .request_as(Method::POST, "/api/v1/carts", None, Some(("1", "user")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, body) = app
        .request_as(Method::POST, "/api/v1/carts", None, Some(("2", "user")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let cart_id = body["id"].as_i64().unwrap();

    let (status, _) = app
        .request_as(
            Method::GET,
            &format!("/api/v1/carts/{}", cart_id),
            None,
            Some(("1", "user")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request_as(
            Method::GET,
            &format!("/api/v1/carts/{}", cart_id),
            None,
            Some(("1", "customer")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let (status, doc) = app
        .request_as(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/orders/full"].is_object());
}
