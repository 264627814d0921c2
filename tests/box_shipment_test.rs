mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use fulfillment_api::{
    entities::{order, OrderPosition, Placement, ShipmentStatus},
    errors::ServiceError,
    events::Event,
    services::{
        boxes::CreateBoxRequest,
        shipments::{AddShipmentImageRequest, CreateShipmentRequest, UpdateShipmentRequest},
    },
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};

fn shipment_on(box_id: i32) -> CreateShipmentRequest {
    CreateShipmentRequest {
        box_id,
        company_id: 3,
        sender_name: "Harbor Freight Lines".into(),
        weight: dec!(12.5),
        images: vec!["aW1nMQ==".into()],
    }
}

/// Two purchased orders packed into a fresh box with one ready shipment.
async fn packed_box(app: &TestApp) -> (i32, [i32; 2], i32) {
    let boxes = &app.state.services.boxes;
    let box_id = app.create_box("BX-5").await;
    let first = app.purchased_order().await;
    let second = app.purchased_order().await;
    boxes.assign_order_to_box(first, box_id, None).await.unwrap();
    boxes.assign_order_to_box(second, box_id, None).await.unwrap();
    let shipment = app
        .state
        .services
        .shipments
        .add_shipment(shipment_on(box_id), None)
        .await
        .unwrap();
    (box_id, [first, second], shipment.shipment.id)
}

#[tokio::test]
async fn box_numbers_are_required() {
    let app = TestApp::new().await;
    let boxes = &app.state.services.boxes;

    let created = boxes
        .add_box(CreateBoxRequest { number: "  BX-1 ".into() }, None)
        .await
        .unwrap();
    assert_eq!(created.number, "BX-1");
    assert_eq!(created.orders_count, 0);
    assert!(created.is_available);

    assert_matches!(
        boxes.add_box(CreateBoxRequest { number: "   ".into() }, None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(boxes.get_box(created.id + 1).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn only_purchased_orders_are_packed() {
    let app = TestApp::new().await;
    let boxes = &app.state.services.boxes;
    let box_id = app.create_box("BX-2").await;

    let fresh = app.create_order().await;
    assert_matches!(
        boxes.assign_order_to_box(fresh, box_id, None).await,
        Err(ServiceError::InvalidOperation(_))
    );

    let purchased = app.purchased_order().await;
    let outcome = boxes.assign_order_to_box(purchased, box_id, None).await.unwrap();
    assert!(!outcome.already);
    assert_eq!(app.shipping_box(box_id).await.orders_count, 1);
    assert_eq!(app.order(purchased).await.placement(), Placement::InBox(box_id));

    let again = boxes.assign_order_to_box(purchased, box_id, None).await.unwrap();
    assert!(again.already);
    assert_eq!(app.shipping_box(box_id).await.orders_count, 1);
}

#[tokio::test]
async fn repacking_moves_the_counter() {
    let app = TestApp::new().await;
    let boxes = &app.state.services.boxes;
    let first = app.create_box("BX-A").await;
    let second = app.create_box("BX-B").await;
    let order_id = app.purchased_order().await;

    boxes.assign_order_to_box(order_id, first, None).await.unwrap();
    let moved = boxes.assign_order_to_box(order_id, second, None).await.unwrap();
    assert_eq!(moved.previous_box_id, Some(first));
    assert_eq!(app.shipping_box(first).await.orders_count, 0);
    assert_eq!(app.shipping_box(second).await.orders_count, 1);

    let removed = boxes.remove_order_from_box(order_id, None).await.unwrap();
    assert_eq!(removed.previous_box_id, Some(second));
    assert!(removed.decremented_previous_box);
    assert_eq!(app.shipping_box(second).await.orders_count, 0);
    assert_eq!(app.order(order_id).await.box_id, None);

    let nothing = boxes.remove_order_from_box(order_id, None).await.unwrap();
    assert_eq!(nothing.previous_box_id, None);
    assert!(!nothing.decremented_previous_box);
    assert_eq!(app.shipping_box(second).await.orders_count, 0);
}

#[tokio::test]
async fn sealing_cascades_to_orders_and_shipments() {
    let app = TestApp::new().await;
    let (box_id, orders, shipment_id) = packed_box(&app).await;

    let outcome = app
        .state
        .services
        .boxes
        .seal_box(box_id, Some(&TestApp::actor()))
        .await
        .unwrap();
    assert_eq!(outcome.moved_orders_count, 2);
    assert_eq!(outcome.moved_shipments_count, 1);
    assert!(!outcome.shipping_box.is_available);

    for order_id in orders {
        assert_eq!(app.order(order_id).await.position, OrderPosition::Shipping);
    }
    let shipment = app.state.services.shipments.get_shipment(shipment_id).await.unwrap();
    assert_eq!(shipment.shipment.status, ShipmentStatus::InTransit);

    assert!(app.published_events().await.contains(&Event::BoxSealed {
        box_id,
        moved_orders: 2,
        moved_shipments: 1,
    }));
}

#[tokio::test]
async fn resealing_is_a_no_op() {
    let app = TestApp::new().await;
    let (box_id, _, _) = packed_box(&app).await;
    let boxes = &app.state.services.boxes;

    boxes.seal_box(box_id, None).await.unwrap();
    let second = boxes.seal_box(box_id, None).await.unwrap();
    assert_eq!(second.moved_orders_count, 0);
    assert_eq!(second.moved_shipments_count, 0);
    assert!(!second.shipping_box.is_available);

    assert_matches!(boxes.seal_box(777, None).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn sealed_boxes_take_no_orders_and_shipped_orders_stay_packed() {
    let app = TestApp::new().await;
    let (box_id, orders, _) = packed_box(&app).await;
    let boxes = &app.state.services.boxes;
    boxes.seal_box(box_id, None).await.unwrap();

    let late = app.purchased_order().await;
    assert_matches!(
        boxes.assign_order_to_box(late, box_id, None).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        boxes.remove_order_from_box(orders[0], None).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_eq!(app.shipping_box(box_id).await.orders_count, 2);
}

#[tokio::test]
async fn packed_orders_arrive_only_from_sealed_boxes() {
    let app = TestApp::new().await;
    let (box_id, orders, _) = packed_box(&app).await;
    let boxes = &app.state.services.boxes;

    assert_matches!(
        boxes.move_orders_packed_to_arrived(box_id, None).await,
        Err(ServiceError::InvalidOperation(_))
    );

    boxes.seal_box(box_id, None).await.unwrap();
    let outcome = boxes.move_orders_packed_to_arrived(box_id, None).await.unwrap();
    assert_eq!(outcome.moved_orders_count, 2);
    for order_id in orders {
        assert_eq!(app.order(order_id).await.position, OrderPosition::Arrived);
    }

    let again = boxes.move_orders_packed_to_arrived(box_id, None).await.unwrap();
    assert_eq!(again.moved_orders_count, 0);
}

#[tokio::test]
async fn shipment_arrival_moves_every_order_in_the_box() {
    let app = TestApp::new().await;
    let (box_id, orders, shipment_id) = packed_box(&app).await;
    let shipments = &app.state.services.shipments;

    assert_matches!(
        shipments.mark_arrived(shipment_id, None).await,
        Err(ServiceError::InvalidOperation(_))
    );

    app.state.services.boxes.seal_box(box_id, None).await.unwrap();

    // a straggler linked to the box outside the usual flow
    let now = Utc::now();
    let straggler = order::ActiveModel {
        customer_id: Set(40),
        creator_user_id: Set(Some(1)),
        creator_customer_id: Set(None),
        collection_id: Set(None),
        cart_id: Set(None),
        box_id: Set(Some(box_id)),
        invoice_id: Set(None),
        position: Set(OrderPosition::Purchased),
        barcode: Set(None),
        purchase_method: Set(None),
        is_archived: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*app.state.db)
    .await
    .unwrap();

    let outcome = shipments.mark_arrived(shipment_id, Some(&TestApp::actor())).await.unwrap();
    assert_eq!(outcome.shipment.status, ShipmentStatus::Arrived);
    assert_eq!(outcome.box_id, box_id);
    assert_eq!(outcome.moved_orders_count, 3);
    for order_id in [orders[0], orders[1], straggler.id] {
        assert_eq!(app.order(order_id).await.position, OrderPosition::Arrived);
    }

    assert_matches!(
        shipments.mark_arrived(shipment_id, None).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        shipments.mark_arrived(4242, None).await,
        Err(ServiceError::NotFound(_))
    );

    let activity = app.activity_for("shipment", shipment_id).await;
    let arrived = activity.last().unwrap();
    assert_eq!(arrived.action_type, "shipment_arrived");
    assert_eq!(arrived.details["moved_orders_count"], 3);
}

#[tokio::test]
async fn shipments_need_an_existing_box_and_valid_fields() {
    let app = TestApp::new().await;
    let shipments = &app.state.services.shipments;

    assert_matches!(
        shipments.add_shipment(shipment_on(55), None).await,
        Err(ServiceError::NotFound(_))
    );

    let box_id = app.create_box("BX-9").await;
    let mut weightless = shipment_on(box_id);
    weightless.weight = dec!(0);
    assert_matches!(
        shipments.add_shipment(weightless, None).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut unnamed = shipment_on(box_id);
    unnamed.sender_name = "  ".into();
    assert_matches!(
        shipments.add_shipment(unnamed, None).await,
        Err(ServiceError::ValidationError(_))
    );

    let created = shipments.add_shipment(shipment_on(box_id), None).await.unwrap();
    assert_eq!(created.shipment.status, ShipmentStatus::Ready);
    assert_eq!(created.images.len(), 1);
}

#[tokio::test]
async fn shipment_updates_and_images() {
    let app = TestApp::new().await;
    let shipments = &app.state.services.shipments;
    let box_id = app.create_box("BX-10").await;
    let other_box = app.create_box("BX-11").await;
    let created = shipments.add_shipment(shipment_on(box_id), None).await.unwrap();
    let shipment_id = created.shipment.id;

    let image = shipments
        .add_shipment_image(
            shipment_id,
            AddShipmentImageRequest {
                image_data: "aW1nMg==".into(),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(image.shipment_id, shipment_id);
    assert_eq!(
        shipments.get_shipment(shipment_id).await.unwrap().images.len(),
        2
    );

    let updated = shipments
        .update_shipment(
            shipment_id,
            UpdateShipmentRequest {
                box_id: Some(other_box),
                weight: Some(dec!(8)),
                images: Some(vec!["bmV3".into()]),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.shipment.box_id, other_box);
    assert_eq!(updated.shipment.weight, dec!(8));
    assert_eq!(updated.images.len(), 1);
    assert_eq!(updated.images[0].image_data, "bmV3");

    assert_matches!(
        shipments
            .update_shipment(
                shipment_id,
                UpdateShipmentRequest {
                    box_id: Some(999),
                    ..Default::default()
                },
                None,
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        shipments
            .update_shipment(shipment_id, UpdateShipmentRequest::default(), None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        shipments
            .add_shipment_image(
                4242,
                AddShipmentImageRequest {
                    image_data: "eA==".into(),
                },
                None,
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
}
