mod common;

use assert_matches::assert_matches;
use common::TestApp;
use fulfillment_api::{
    entities::purchase_invoice,
    errors::ServiceError,
    events::Event,
    services::invoices::{AddInvoiceRequest, ApplyPurchaseRequest, ReplaceInvoiceRequest},
};
use sea_orm::{EntityTrait, PaginatorTrait};

fn add_request(order_id: i32, payload: &str) -> AddInvoiceRequest {
    AddInvoiceRequest {
        order_id,
        invoice_base64: payload.to_string(),
    }
}

#[tokio::test]
async fn replaced_invoice_is_the_only_one_left() {
    let app = TestApp::new().await;
    let invoices = &app.state.services.invoices;
    let order_id = app.create_order().await;

    let linked = invoices
        .add_invoice(add_request(order_id, "b2xk"), None)
        .await
        .unwrap();
    assert_eq!(linked.replaced_invoice_id, None);

    let outcome = invoices
        .replace_invoice(
            order_id,
            ReplaceInvoiceRequest {
                old_invoice_id: linked.invoice_id,
                invoice_base64: "bmV3".into(),
            },
            Some(&TestApp::actor()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.old_invoice_id, linked.invoice_id);
    assert_ne!(outcome.new_invoice_id, linked.invoice_id);

    let fetched = invoices.get_invoice_by_order(order_id).await.unwrap();
    assert_eq!(fetched.id, outcome.new_invoice_id);
    assert_eq!(fetched.invoice_image_base64, "bmV3");

    let old = purchase_invoice::Entity::find_by_id(linked.invoice_id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(old.is_none());
    assert_eq!(app.order(order_id).await.invoice_id, Some(outcome.new_invoice_id));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["orderId"], order_id);
    assert_eq!(json["newInvoiceId"], outcome.new_invoice_id);
}

#[tokio::test]
async fn replace_rejects_a_stale_invoice_id() {
    let app = TestApp::new().await;
    let invoices = &app.state.services.invoices;
    let order_id = app.create_order().await;
    let linked = invoices
        .add_invoice(add_request(order_id, "b2xk"), None)
        .await
        .unwrap();

    let stale = ReplaceInvoiceRequest {
        old_invoice_id: linked.invoice_id + 100,
        invoice_base64: "bmV3".into(),
    };
    assert_matches!(
        invoices.replace_invoice(order_id, stale, None).await,
        Err(ServiceError::InvalidOperation(_))
    );

    let count = purchase_invoice::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(app.order(order_id).await.invoice_id, Some(linked.invoice_id));

    let missing_order = ReplaceInvoiceRequest {
        old_invoice_id: linked.invoice_id,
        invoice_base64: "bmV3".into(),
    };
    assert_matches!(
        invoices.replace_invoice(order_id + 1, missing_order, None).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn relinking_drops_the_previous_invoice() {
    let app = TestApp::new().await;
    let invoices = &app.state.services.invoices;
    let order_id = app.create_order().await;

    let first = invoices
        .add_invoice(add_request(order_id, "Zmlyc3Q="), None)
        .await
        .unwrap();
    let second = invoices
        .add_invoice(add_request(order_id, "c2Vjb25k"), None)
        .await
        .unwrap();
    assert_eq!(second.replaced_invoice_id, Some(first.invoice_id));

    let count = purchase_invoice::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(count, 1);

    assert!(app.published_events().await.contains(&Event::InvoiceLinked {
        order_id,
        invoice_id: second.invoice_id,
        replaced_invoice_id: Some(first.invoice_id),
    }));
}

#[tokio::test]
async fn apply_purchase_completes_the_order() {
    let app = TestApp::new().await;
    let invoices = &app.state.services.invoices;
    let order_id = app.create_order().await;
    assert!(!app.order(order_id).await.is_purchase_complete());

    let outcome = invoices
        .apply_purchase(
            order_id,
            ApplyPurchaseRequest {
                purchase_method: " cod ".into(),
                invoice_base64: "aW52".into(),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.purchase_method, "cod");

    let order = app.order(order_id).await;
    assert_eq!(order.purchase_method.as_deref(), Some("cod"));
    assert_eq!(order.invoice_id, Some(outcome.invoice_id));
    assert!(order.is_purchase_complete());
}

#[tokio::test]
async fn invoice_inputs_are_validated() {
    let app = TestApp::new().await;
    let invoices = &app.state.services.invoices;
    let order_id = app.create_order().await;

    assert_matches!(
        invoices.add_invoice(add_request(order_id, ""), None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        invoices.add_invoice(add_request(0, "eA=="), None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        invoices.add_invoice(add_request(order_id + 9, "eA=="), None).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        invoices
            .apply_purchase(
                order_id,
                ApplyPurchaseRequest {
                    purchase_method: "   ".into(),
                    invoice_base64: "eA==".into(),
                },
                None,
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        invoices.get_invoice_by_order(order_id).await,
        Err(ServiceError::NotFound(msg)) if msg == format!("No invoice found for order {}", order_id)
    );

    let count = purchase_invoice::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
