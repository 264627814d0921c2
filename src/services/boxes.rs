use crate::{
    auth::ActorContext,
    db::{transaction, DbPool},
    entities::{
        order::{self, Entity as OrderEntity, OrderPosition},
        shipment::{self, Entity as ShipmentEntity, ShipmentStatus},
        shipping_box::{self, Entity as BoxEntity},
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
use validator::Validate;

pub(crate) async fn increment_orders_count<C: ConnectionTrait>(
    conn: &C,
    box_id: i32,
) -> Result<(), ServiceError> {
    BoxEntity::update_many()
        .col_expr(
            shipping_box::Column::OrdersCount,
            Expr::col(shipping_box::Column::OrdersCount).add(1),
        )
        .col_expr(shipping_box::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(shipping_box::Column::Id.eq(box_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Floors at zero, like the cart counter.
pub(crate) async fn decrement_orders_count<C: ConnectionTrait>(
    conn: &C,
    box_id: i32,
) -> Result<bool, ServiceError> {
    let result = BoxEntity::update_many()
        .col_expr(
            shipping_box::Column::OrdersCount,
            Expr::col(shipping_box::Column::OrdersCount).sub(1),
        )
        .col_expr(shipping_box::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(shipping_box::Column::Id.eq(box_id))
        .filter(shipping_box::Column::OrdersCount.gt(0))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

pub(crate) async fn lock_box<C: ConnectionTrait>(
    conn: &C,
    box_id: i32,
) -> Result<shipping_box::Model, ServiceError> {
    BoxEntity::find_by_id(box_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Box", box_id))
}

/// Same ordering rule as [`crate::services::carts::lock_carts`].
pub(crate) async fn lock_boxes<C: ConnectionTrait>(
    conn: &C,
    box_ids: impl IntoIterator<Item = i32>,
) -> Result<Vec<shipping_box::Model>, ServiceError> {
    let mut ids: Vec<i32> = box_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(BoxEntity::find()
        .filter(shipping_box::Column::Id.is_in(ids))
        .order_by_asc(shipping_box::Column::Id)
        .lock_exclusive()
        .all(conn)
        .await?)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBoxRequest {
    #[validate(length(min = 1, max = 64, message = "number is required"))]
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignToBoxOutcome {
    pub order_id: i32,
    pub box_id: i32,
    pub previous_box_id: Option<i32>,
    pub already: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveFromBoxOutcome {
    pub order_id: i32,
    pub previous_box_id: Option<i32>,
    pub decremented_previous_box: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SealBoxOutcome {
    #[serde(rename = "box")]
    pub shipping_box: shipping_box::Model,
    pub moved_orders_count: u64,
    pub moved_shipments_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BoxArrivalOutcome {
    pub box_id: i32,
    pub moved_orders_count: u64,
}

/// Box half of the Box/Shipment Aggregator.
#[derive(Clone)]
pub struct BoxService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl BoxService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request, actor), fields(number = %request.number))]
    pub async fn add_box(
        &self,
        request: CreateBoxRequest,
        actor: Option<&ActorContext>,
    ) -> Result<shipping_box::Model, ServiceError> {
        let number = request.number.trim().to_string();
        CreateBoxRequest {
            number: number.clone(),
        }
        .validate()?;

        let now = Utc::now();
        let created = shipping_box::ActiveModel {
            number: Set(number),
            orders_count: Set(0),
            is_available: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(box_id = created.id, "Box created");
        let mut pending = PendingEvents::new();
        pending.push(Event::BoxCreated { box_id: created.id });
        pending.activity(
            ActivityEntry::new("box", created.id, "box_created")
                .by(actor)
                .with_details(json!({ "number": &created.number })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_box(&self, box_id: i32) -> Result<shipping_box::Model, ServiceError> {
        BoxEntity::find_by_id(box_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Box", box_id))
    }

    /// Packs a purchased order into an open box.
    #[instrument(skip(self, actor))]
    pub async fn assign_order_to_box(
        &self,
        order_id: i32,
        box_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<AssignToBoxOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "assign_order_to_box").await?;

        let snapshot = find_order(&txn, order_id).await?;
        let target = lock_boxes(&txn, snapshot.box_id.into_iter().chain([box_id]))
            .await?
            .into_iter()
            .find(|b| b.id == box_id)
            .ok_or_else(|| ServiceError::not_found("Box", box_id))?;
        let order = lock_order_if_unmoved(&txn, &snapshot).await?;

        if order.box_id == Some(box_id) {
            transaction::commit(txn, "assign_order_to_box").await?;
            return Ok(AssignToBoxOutcome {
                order_id,
                box_id,
                previous_box_id: Some(box_id),
                already: true,
            });
        }
        if !target.is_available {
            return Err(ServiceError::InvalidOperation(format!(
                "Box {} is sealed",
                box_id
            )));
        }
        if order.position != OrderPosition::Purchased {
            return Err(ServiceError::InvalidOperation(format!(
                "Only orders at position 3 can be packed; order {} is at position {}",
                order_id,
                order.position.as_i32()
            )));
        }

        let previous_box_id = order.box_id;
        if let Some(previous) = previous_box_id {
            decrement_orders_count(&txn, previous).await?;
        }
        increment_orders_count(&txn, box_id).await?;

        let mut am: order::ActiveModel = order.into();
        am.box_id = Set(Some(box_id));
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;

        transaction::commit(txn, "assign_order_to_box").await?;

        info!(order_id, box_id, ?previous_box_id, "Order assigned to box");
        let mut pending = PendingEvents::new();
        pending.push(Event::OrderAssignedToBox {
            order_id,
            box_id,
            previous_box_id,
        });
        pending.activity(
            ActivityEntry::new("order", order_id, "order_assigned_to_box")
                .by(actor)
                .field_change(
                    "box_id",
                    previous_box_id.map(|id| id.to_string()),
                    Some(box_id.to_string()),
                ),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(AssignToBoxOutcome {
            order_id,
            box_id,
            previous_box_id,
            already: false,
        })
    }

    #[instrument(skip(self, actor))]
    pub async fn remove_order_from_box(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<RemoveFromBoxOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "remove_order_from_box").await?;
        let snapshot = find_order(&txn, order_id).await?;
        lock_boxes(&txn, snapshot.box_id.into_iter()).await?;
        let order = lock_order_if_unmoved(&txn, &snapshot).await?;

        let Some(previous_box_id) = order.box_id else {
            transaction::commit(txn, "remove_order_from_box").await?;
            return Ok(RemoveFromBoxOutcome {
                order_id,
                previous_box_id: None,
                decremented_previous_box: false,
            });
        };
        if order.position > OrderPosition::Purchased {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has already shipped in box {}",
                order_id, previous_box_id
            )));
        }

        let mut am: order::ActiveModel = order.into();
        am.box_id = Set(None);
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;
        if !decrement_orders_count(&txn, previous_box_id).await? {
            warn!(box_id = previous_box_id, "Box counter already at zero");
        }

        transaction::commit(txn, "remove_order_from_box").await?;

        let mut pending = PendingEvents::new();
        pending.push(Event::OrderRemovedFromBox {
            order_id,
            previous_box_id: Some(previous_box_id),
        });
        pending.activity(
            ActivityEntry::new("order", order_id, "order_removed_from_box")
                .by(actor)
                .field_change("box_id", Some(previous_box_id.to_string()), None),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(RemoveFromBoxOutcome {
            order_id,
            previous_box_id: Some(previous_box_id),
            decremented_previous_box: true,
        })
    }

    /// Seals the box: orders 3 → 4 and ready shipments → in transit.
    /// Re-sealing is a no-op that reports zero moves.
    #[instrument(skip(self, actor))]
    pub async fn seal_box(
        &self,
        box_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<SealBoxOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "seal_box").await?;
        let anchor = lock_box(&txn, box_id).await?;
        let was_available = anchor.is_available;

        let now = Utc::now();
        let mut am: shipping_box::ActiveModel = anchor.into();
        am.is_available = Set(false);
        am.updated_at = Set(now);
        let sealed = am.update(&txn).await?;

        let moved_orders_count = OrderEntity::update_many()
            .col_expr(order::Column::Position, Expr::value(OrderPosition::Shipping))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::BoxId.eq(box_id))
            .filter(order::Column::Position.eq(OrderPosition::Purchased))
            .exec(&txn)
            .await?
            .rows_affected;

        let moved_shipments_count = ShipmentEntity::update_many()
            .col_expr(shipment::Column::Status, Expr::value(ShipmentStatus::InTransit))
            .col_expr(shipment::Column::UpdatedAt, Expr::value(now))
            .filter(shipment::Column::BoxId.eq(box_id))
            .filter(shipment::Column::Status.eq(ShipmentStatus::Ready))
            .exec(&txn)
            .await?
            .rows_affected;

        transaction::commit(txn, "seal_box").await?;

        info!(
            box_id,
            moved_orders_count, moved_shipments_count, "Box sealed"
        );
        metrics::counter!("fulfillment_box.sealed", 1);
        let mut pending = PendingEvents::new();
        pending.push(Event::BoxSealed {
            box_id,
            moved_orders: moved_orders_count,
            moved_shipments: moved_shipments_count,
        });
        pending.activity(
            ActivityEntry::new("box", box_id, "box_sealed")
                .by(actor)
                .field_change(
                    "is_available",
                    Some(was_available.to_string()),
                    Some("false".into()),
                )
                .with_details(json!({
                    "moved_orders_count": moved_orders_count,
                    "moved_shipments_count": moved_shipments_count,
                })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(SealBoxOutcome {
            shipping_box: sealed,
            moved_orders_count,
            moved_shipments_count,
        })
    }

    /// Orders 4 → 5 for a sealed box.
    #[instrument(skip(self, actor))]
    pub async fn move_orders_packed_to_arrived(
        &self,
        box_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<BoxArrivalOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "move_orders_packed_to_arrived").await?;
        let anchor = lock_box(&txn, box_id).await?;

        if anchor.is_available {
            warn!(box_id, "Box is still open");
            return Err(ServiceError::InvalidOperation(format!(
                "Box {} must be sealed before its orders can arrive",
                box_id
            )));
        }

        let moved_orders_count = OrderEntity::update_many()
            .col_expr(order::Column::Position, Expr::value(OrderPosition::Arrived))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::BoxId.eq(box_id))
            .filter(order::Column::Position.eq(OrderPosition::Shipping))
            .exec(&txn)
            .await?
            .rows_affected;

        transaction::commit(txn, "move_orders_packed_to_arrived").await?;

        info!(box_id, moved_orders_count, "Box orders arrived");
        let mut pending = PendingEvents::new();
        pending.push(Event::BoxOrdersArrived {
            box_id,
            moved_orders: moved_orders_count,
        });
        pending.activity(
            ActivityEntry::new("box", box_id, "box_orders_arrived")
                .by(actor)
                .with_details(json!({ "moved_orders_count": moved_orders_count })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(BoxArrivalOutcome {
            box_id,
            moved_orders_count,
        })
    }
}
