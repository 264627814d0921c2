#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use fulfillment_api::{
    auth::{ActorContext, ACTOR_ID_HEADER, ACTOR_TYPE_HEADER},
    config::AppConfig,
    db,
    entities::{cart, order, shipping_box},
    events::{
        self,
        activity::{ActivityEntry, DbActivitySink, MemoryActivitySink},
        Event,
    },
    services::{
        boxes::CreateBoxRequest,
        invoices::ApplyPurchaseRequest,
        orders::{CreateFullOrderRequest, OrderDetailInput},
    },
    AppState,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

/// Application state over a private in-memory SQLite database. Events stay
/// in the channel until [`TestApp::drain_events`] hands them to the sink.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sink: Arc<MemoryActivitySink>,
    events: Mutex<mpsc::Receiver<Event>>,
    published: Mutex<Vec<Event>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::with_database_url("sqlite::memory:")).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (sender, rx) = events::channel(4096);
        let state = AppState::new(Arc::new(pool), cfg, Some(Arc::new(sender)))
            .expect("failed to build app state");

        Self {
            router: fulfillment_api::app(state.clone()),
            state,
            sink: Arc::new(MemoryActivitySink::default()),
            events: Mutex::new(rx),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn actor() -> ActorContext {
        ActorContext::user(1)
    }

    /// Moves everything published so far into the sink and the event log.
    pub async fn drain_events(&self) {
        let mut rx = self.events.lock().await;
        let mut published = self.published.lock().await;
        while let Ok(event) = rx.try_recv() {
            events::dispatch_event(event.clone(), self.sink.as_ref()).await;
            published.push(event);
        }
    }

    /// Like [`TestApp::drain_events`], but also writes activity to
    /// `order_activity_log` the way the server's database sink does.
    pub async fn persist_events(&self) {
        let db_sink = DbActivitySink::new(self.state.db.clone());
        let mut rx = self.events.lock().await;
        let mut published = self.published.lock().await;
        while let Ok(event) = rx.try_recv() {
            events::dispatch_event(event.clone(), self.sink.as_ref()).await;
            events::dispatch_event(event.clone(), &db_sink).await;
            published.push(event);
        }
    }

    pub async fn published_events(&self) -> Vec<Event> {
        self.drain_events().await;
        self.published
            .lock()
            .await
            .iter()
            .filter(|e| !matches!(e, Event::Activity(_)))
            .cloned()
            .collect()
    }

    pub async fn activity_for(&self, entity_type: &str, entity_id: i32) -> Vec<ActivityEntry> {
        self.drain_events().await;
        self.sink.entries_for(entity_type, entity_id).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_as(method, uri, body, Some(("1", "user"))).await
    }

    pub async fn request_as(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<(&str, &str)>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, kind)) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, id)
                .header(ACTOR_TYPE_HEADER, kind);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    // Fixtures

    pub async fn create_order(&self) -> i32 {
        self.state
            .services
            .orders
            .create_full_order(order_request("Vintage lamp"), Some(&Self::actor()))
            .await
            .expect("order creation failed")
            .order
            .id
    }

    pub async fn create_cart(&self) -> i32 {
        self.state
            .services
            .carts
            .create_cart(Some(&Self::actor()))
            .await
            .expect("cart creation failed")
            .id
    }

    pub async fn create_box(&self, number: &str) -> i32 {
        self.state
            .services
            .boxes
            .add_box(
                CreateBoxRequest {
                    number: number.to_string(),
                },
                Some(&Self::actor()),
            )
            .await
            .expect("box creation failed")
            .id
    }

    /// Records a purchase method and links a fresh invoice.
    pub async fn complete_purchase(&self, order_id: i32) {
        self.state
            .services
            .invoices
            .apply_purchase(
                order_id,
                ApplyPurchaseRequest {
                    purchase_method: "card".to_string(),
                    invoice_base64: "aW52b2ljZQ==".to_string(),
                },
                Some(&Self::actor()),
            )
            .await
            .expect("apply purchase failed");
    }

    /// Order at position 2 inside `cart_id`, ready to be purchased.
    pub async fn purchasable_order_in(&self, cart_id: i32) -> i32 {
        let order_id = self.create_order().await;
        self.state
            .services
            .carts
            .add_order_to_cart(order_id, cart_id, Some(&Self::actor()))
            .await
            .expect("add to cart failed");
        self.complete_purchase(order_id).await;
        order_id
    }

    /// Order at position 3 (bought through a closed cart).
    pub async fn purchased_order(&self) -> i32 {
        let cart_id = self.create_cart().await;
        let order_id = self.purchasable_order_in(cart_id).await;
        self.state
            .services
            .carts
            .close_cart(cart_id, Some(&Self::actor()))
            .await
            .expect("cart close failed");
        order_id
    }

    pub async fn order(&self, order_id: i32) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("order missing")
    }

    pub async fn cart(&self, cart_id: i32) -> cart::Model {
        cart::Entity::find_by_id(cart_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("cart missing")
    }

    pub async fn shipping_box(&self, box_id: i32) -> shipping_box::Model {
        shipping_box::Entity::find_by_id(box_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("box missing")
    }
}

pub fn detail(title: &str) -> OrderDetailInput {
    OrderDetailInput {
        title: title.to_string(),
        description: Some("Brass, 1960s".to_string()),
        notes: None,
        color: Some("gold".to_string()),
        size: None,
        capacity: None,
        prepaid_value: dec!(20.00),
        original_product_price: dec!(85.50),
        commission: dec!(8.55),
        total: dec!(94.05),
        image_url: None,
    }
}

pub fn order_request(title: &str) -> CreateFullOrderRequest {
    CreateFullOrderRequest {
        customer_id: Some(40),
        creator_user_id: Some(1),
        creator_customer_id: None,
        collection_id: None,
        detail: Some(detail(title)),
        details: None,
    }
}
