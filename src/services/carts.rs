use crate::{
    auth::ActorContext,
    db::{transaction, DbPool},
    entities::{
        cart::{self, Entity as CartEntity},
        order::{self, Entity as OrderEntity, OrderPosition},
    },
    errors::ServiceError,
    events::{activity::ActivityEntry, Event, EventSender, PendingEvents},
    services::orders::{find_order, lock_order_if_unmoved},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// `orders_count = orders_count + 1` in a single statement.
pub(crate) async fn increment_orders_count<C: ConnectionTrait>(
    conn: &C,
    cart_id: i32,
) -> Result<(), ServiceError> {
    CartEntity::update_many()
        .col_expr(
            cart::Column::OrdersCount,
            Expr::col(cart::Column::OrdersCount).add(1),
        )
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Decrements the counter, flooring at zero. Returns whether a row changed.
pub(crate) async fn decrement_orders_count<C: ConnectionTrait>(
    conn: &C,
    cart_id: i32,
) -> Result<bool, ServiceError> {
    let result = CartEntity::update_many()
        .col_expr(
            cart::Column::OrdersCount,
            Expr::col(cart::Column::OrdersCount).sub(1),
        )
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .filter(cart::Column::OrdersCount.gt(0))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

async fn lock_cart<C: ConnectionTrait>(conn: &C, cart_id: i32) -> Result<cart::Model, ServiceError> {
    CartEntity::find_by_id(cart_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart", cart_id))
}

/// Locks every listed cart in ascending id order. Missing ids are skipped.
pub(crate) async fn lock_carts<C: ConnectionTrait>(
    conn: &C,
    cart_ids: impl IntoIterator<Item = i32>,
) -> Result<Vec<cart::Model>, ServiceError> {
    let mut ids: Vec<i32> = cart_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(CartEntity::find()
        .filter(cart::Column::Id.is_in(ids))
        .order_by_asc(cart::Column::Id)
        .lock_exclusive()
        .all(conn)
        .await?)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddToCartOutcome {
    pub order_id: i32,
    pub cart_id: i32,
    pub previous_cart_id: Option<i32>,
    /// The order was already linked to this cart
    pub already: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveFromCartOutcome {
    pub order_id: i32,
    pub previous_cart_id: Option<i32>,
    pub decremented_previous_cart: bool,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CloseCartOutcome {
    pub cart: cart::Model,
    pub moved_orders_count: u64,
    pub unarchived_orders_count: u64,
}

/// Cart Aggregator: membership, `orders_count` and cart close.
#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, actor))]
    pub async fn create_cart(&self, actor: Option<&ActorContext>) -> Result<cart::Model, ServiceError> {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            orders_count: Set(0),
            is_available: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(cart_id = cart.id, "Cart created");
        let mut pending = PendingEvents::new();
        pending.push(Event::CartCreated { cart_id: cart.id });
        pending.activity(ActivityEntry::new("cart", cart.id, "cart_created").by(actor));
        pending.publish(self.event_sender.as_deref());

        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: i32) -> Result<cart::Model, ServiceError> {
        CartEntity::find_by_id(cart_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart", cart_id))
    }

    /// Orders currently linked to the cart, newest first.
    #[instrument(skip(self))]
    pub async fn list_cart_orders(&self, cart_id: i32) -> Result<Vec<order::Model>, ServiceError> {
        let db = &*self.db_pool;
        self.get_cart(cart_id).await?;
        let orders = OrderEntity::find()
            .filter(order::Column::CartId.eq(cart_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(db)
            .await?;
        Ok(orders)
    }

    /// Links an order to an open cart. A position-1 order enters stage 2 on
    /// the way in; moving between carts adjusts both counters.
    #[instrument(skip(self, actor))]
    pub async fn add_order_to_cart(
        &self,
        order_id: i32,
        cart_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<AddToCartOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "add_order_to_cart").await?;

        let snapshot = find_order(&txn, order_id).await?;
        let cart = lock_carts(&txn, snapshot.cart_id.into_iter().chain([cart_id]))
            .await?
            .into_iter()
            .find(|c| c.id == cart_id)
            .ok_or_else(|| ServiceError::not_found("Cart", cart_id))?;
        let order = lock_order_if_unmoved(&txn, &snapshot).await?;

        if order.cart_id == Some(cart_id) {
            transaction::commit(txn, "add_order_to_cart").await?;
            return Ok(AddToCartOutcome {
                order_id,
                cart_id,
                previous_cart_id: Some(cart_id),
                already: true,
            });
        }
        if !cart.is_available {
            return Err(ServiceError::InvalidOperation(format!(
                "Cart {} is closed",
                cart_id
            )));
        }
        if order.position > OrderPosition::UnderPurchase {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is at position {} and can no longer join a cart",
                order_id,
                order.position.as_i32()
            )));
        }

        let previous_cart_id = order.cart_id;
        if let Some(previous) = previous_cart_id {
            decrement_orders_count(&txn, previous).await?;
        }
        increment_orders_count(&txn, cart_id).await?;

        let previous_position = order.position;
        let mut am: order::ActiveModel = order.into();
        am.cart_id = Set(Some(cart_id));
        am.position = Set(OrderPosition::UnderPurchase);
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;

        transaction::commit(txn, "add_order_to_cart").await?;

        info!(order_id, cart_id, ?previous_cart_id, "Order added to cart");
        let mut pending = PendingEvents::new();
        pending.push(Event::OrderAddedToCart {
            order_id,
            cart_id,
            previous_cart_id,
        });
        pending.activity(
            ActivityEntry::new("order", order_id, "order_added_to_cart")
                .by(actor)
                .field_change(
                    "cart_id",
                    previous_cart_id.map(|id| id.to_string()),
                    Some(cart_id.to_string()),
                )
                .with_details(json!({ "previous_position": previous_position.as_i32() })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(AddToCartOutcome {
            order_id,
            cart_id,
            previous_cart_id,
            already: false,
        })
    }

    /// Unlinks an order from its cart and clears the archive flag. An order
    /// without a cart is only unarchived.
    #[instrument(skip(self, actor))]
    pub async fn remove_order_from_cart(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<RemoveFromCartOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "remove_order_from_cart").await?;
        let snapshot = find_order(&txn, order_id).await?;
        lock_carts(&txn, snapshot.cart_id.into_iter()).await?;
        let order = lock_order_if_unmoved(&txn, &snapshot).await?;

        let previous_cart_id = order.cart_id;
        if previous_cart_id.is_some() && order.position > OrderPosition::UnderPurchase {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} was already purchased from its cart",
                order_id
            )));
        }

        let was_archived = order.is_archived;
        if previous_cart_id.is_some() || was_archived {
            let mut am: order::ActiveModel = order.into();
            am.cart_id = Set(None);
            am.is_archived = Set(false);
            am.updated_at = Set(Utc::now());
            am.update(&txn).await?;
        }
        if let Some(previous) = previous_cart_id {
            if !decrement_orders_count(&txn, previous).await? {
                warn!(cart_id = previous, "Cart counter already at zero");
            }
        }

        transaction::commit(txn, "remove_order_from_cart").await?;

        let mut pending = PendingEvents::new();
        pending.push(Event::OrderRemovedFromCart {
            order_id,
            previous_cart_id,
        });
        pending.activity(
            ActivityEntry::new("order", order_id, "order_removed_from_cart")
                .by(actor)
                .field_change("cart_id", previous_cart_id.map(|id| id.to_string()), None)
                .with_details(json!({ "was_archived": was_archived })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(RemoveFromCartOutcome {
            order_id,
            previous_cart_id,
            decremented_previous_cart: previous_cart_id.is_some(),
            is_archived: false,
        })
    }

    /// Bulk 2 → 3 for every stage-2 member, all or nothing. Any incomplete
    /// member aborts the close and is reported in `invalid_order_ids`.
    #[instrument(skip(self, actor))]
    pub async fn close_cart(
        &self,
        cart_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<CloseCartOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "close_cart").await?;
        let cart = lock_cart(&txn, cart_id).await?;

        let members = OrderEntity::find()
            .filter(order::Column::CartId.eq(cart_id))
            .filter(order::Column::Position.eq(OrderPosition::UnderPurchase))
            .order_by_asc(order::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await?;

        let mut invalid_order_ids: Vec<i32> = members
            .iter()
            .filter(|o| !o.is_purchase_complete())
            .map(|o| o.id)
            .collect();
        if !invalid_order_ids.is_empty() {
            invalid_order_ids.sort_unstable();
            warn!(cart_id, ?invalid_order_ids, "Cart close rejected");
            metrics::counter!("fulfillment_cart.close_rejected", 1);
            return Err(ServiceError::PreconditionFailed {
                message: format!(
                    "Cart {} has orders without an invoice or purchase method",
                    cart_id
                ),
                invalid_order_ids,
            });
        }

        let unarchived_orders_count = members.iter().filter(|o| o.is_archived).count() as u64;
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Position, Expr::value(OrderPosition::Purchased))
            .col_expr(order::Column::IsArchived, Expr::value(false))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::CartId.eq(cart_id))
            .filter(order::Column::Position.eq(OrderPosition::UnderPurchase))
            .exec(&txn)
            .await?;
        let moved_orders_count = result.rows_affected;

        let mut am: cart::ActiveModel = cart.into();
        am.is_available = Set(false);
        am.updated_at = Set(Utc::now());
        let cart = am.update(&txn).await?;

        transaction::commit(txn, "close_cart").await?;

        info!(
            cart_id,
            moved_orders_count, unarchived_orders_count, "Cart closed"
        );
        metrics::counter!("fulfillment_cart.closed", 1);
        let mut pending = PendingEvents::new();
        pending.push(Event::CartClosed {
            cart_id,
            moved_orders: moved_orders_count,
            unarchived_orders: unarchived_orders_count,
        });
        pending.activity(
            ActivityEntry::new("cart", cart_id, "cart_closed")
                .by(actor)
                .field_change("is_available", Some("true".into()), Some("false".into()))
                .with_details(json!({
                    "moved_order_ids": members.iter().map(|o| o.id).collect::<Vec<_>>(),
                    "unarchived_orders_count": unarchived_orders_count,
                })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(CloseCartOutcome {
            cart,
            moved_orders_count,
            unarchived_orders_count,
        })
    }
}
