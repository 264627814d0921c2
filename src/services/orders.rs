use crate::{
    auth::ActorContext,
    db::{transaction, DbPool},
    entities::{
        order::{self, Creator, Entity as OrderEntity, OrderPosition, Placement},
        order_activity_log::{self, Entity as ActivityLogEntity},
        order_detail::{self, Entity as OrderDetailEntity},
    },
    errors::ServiceError,
    events::{activity::ActivityEntry, Event, EventSender, PendingEvents},
    services::{boxes, carts},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Commercial attributes supplied when an order is created.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderDetailInput {
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub capacity: Option<String>,
    #[serde(default)]
    pub prepaid_value: Decimal,
    #[serde(default)]
    pub original_product_price: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub total: Decimal,
    pub image_url: Option<String>,
}

impl OrderDetailInput {
    fn into_active_model(self, order_id: i32, now: DateTime<Utc>) -> order_detail::ActiveModel {
        order_detail::ActiveModel {
            order_id: Set(order_id),
            title: Set(self.title),
            description: Set(non_blank(self.description)),
            notes: Set(non_blank(self.notes)),
            color: Set(non_blank(self.color)),
            size: Set(non_blank(self.size)),
            capacity: Set(non_blank(self.capacity)),
            prepaid_value: Set(self.prepaid_value),
            original_product_price: Set(self.original_product_price),
            commission: Set(self.commission),
            total: Set(self.total),
            image_url: Set(non_blank(self.image_url)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

/// Body of `POST /orders/full`. `details` is the older array form and must
/// carry exactly one element when used.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateFullOrderRequest {
    pub customer_id: Option<i32>,
    pub creator_user_id: Option<i32>,
    pub creator_customer_id: Option<i32>,
    pub collection_id: Option<i32>,
    pub detail: Option<OrderDetailInput>,
    pub details: Option<Vec<OrderDetailInput>>,
}

impl CreateFullOrderRequest {
    fn single_detail(self) -> Result<OrderDetailInput, ServiceError> {
        if let Some(detail) = self.detail {
            return Ok(detail);
        }
        match self.details {
            Some(mut details) if details.len() == 1 => Ok(details.remove(0)),
            Some(_) => Err(ServiceError::ValidationError(
                "Order must have exactly one detail".to_string(),
            )),
            None => Err(ServiceError::ValidationError(
                "A single 'detail' object is required".to_string(),
            )),
        }
    }
}

/// Unified order update. Header fields: `position`, `collection_id`; every
/// other field belongs to the order's detail row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct OrderUpdate {
    #[serde(alias = "position_id")]
    #[schema(value_type = Option<i32>, minimum = 1, maximum = 5)]
    pub position: Option<OrderPosition>,
    pub collection_id: Option<i32>,
    #[validate(length(min = 1, message = "title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub capacity: Option<String>,
    pub prepaid_value: Option<Decimal>,
    pub original_product_price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub total: Option<Decimal>,
    pub image_url: Option<String>,
}

impl OrderUpdate {
    pub fn touches_header(&self) -> bool {
        self.position.is_some() || self.collection_id.is_some()
    }

    pub fn touches_detail(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.notes.is_some()
            || self.color.is_some()
            || self.size.is_some()
            || self.capacity.is_some()
            || self.prepaid_value.is_some()
            || self.original_product_price.is_some()
            || self.commission.is_some()
            || self.total.is_some()
            || self.image_url.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_header() && !self.touches_detail()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

fn changed<T: PartialEq + Clone>(current: &T, requested: Option<&T>) -> Option<T> {
    requested.filter(|r| *r != current).cloned()
}

fn changed_opt<T: PartialEq + Clone>(current: &Option<T>, requested: Option<&T>) -> Option<T> {
    requested.filter(|r| current.as_ref() != Some(*r)).cloned()
}

macro_rules! apply_required {
    ($changes:ident, $am:ident, $current:ident, $update:ident, $($field:ident),+ $(,)?) => {$(
        if let Some(value) = changed(&$current.$field, $update.$field.as_ref()) {
            $changes.push(FieldChange {
                field: stringify!($field),
                old_value: Some($current.$field.to_string()),
                new_value: Some(value.to_string()),
            });
            $am.$field = Set(value);
        }
    )+};
}

macro_rules! apply_optional {
    ($changes:ident, $am:ident, $current:ident, $update:ident, $($field:ident),+ $(,)?) => {$(
        if let Some(value) = changed_opt(&$current.$field, $update.$field.as_ref()) {
            $changes.push(FieldChange {
                field: stringify!($field),
                old_value: $current.$field.as_ref().map(ToString::to_string),
                new_value: Some(value.to_string()),
            });
            $am.$field = Set(Some(value));
        }
    )+};
}

/// Diffs the header part of an update against the stored order.
pub fn diff_header(
    current: &order::Model,
    update: &OrderUpdate,
) -> Result<(order::ActiveModel, Vec<FieldChange>), ServiceError> {
    let mut am: order::ActiveModel = current.clone().into();
    let mut changes = Vec::new();

    if let Some(target) = changed(&current.position, update.position.as_ref()) {
        check_position_step(current, target)?;
        changes.push(FieldChange {
            field: "position",
            old_value: Some(current.position.as_i32().to_string()),
            new_value: Some(target.as_i32().to_string()),
        });
        am.position = Set(target);
        if target == OrderPosition::Purchased {
            am.is_archived = Set(false);
        }
    }
    apply_optional!(changes, am, current, update, collection_id);

    Ok((am, changes))
}

/// Diffs the detail part of an update against the stored detail row.
pub fn diff_detail(
    current: &order_detail::Model,
    update: &OrderUpdate,
) -> (order_detail::ActiveModel, Vec<FieldChange>) {
    let mut am: order_detail::ActiveModel = current.clone().into();
    let mut changes = Vec::new();

    apply_required!(
        changes,
        am,
        current,
        update,
        title,
        prepaid_value,
        original_product_price,
        commission,
        total,
    );
    apply_optional!(
        changes,
        am,
        current,
        update,
        description,
        notes,
        color,
        size,
        capacity,
        image_url,
    );

    (am, changes)
}

/// A position change through the unified update must be one forward step.
/// Positions 4 and 5 are only ever reached through their anchors.
pub fn check_position_step(
    order: &order::Model,
    target: OrderPosition,
) -> Result<(), ServiceError> {
    if !order.position.can_advance_to(target) {
        return Err(ServiceError::InvalidOperation(format!(
            "Order {} cannot move from position {} to {}",
            order.id,
            order.position.as_i32(),
            target.as_i32()
        )));
    }

    match target {
        OrderPosition::UnderPurchase => Ok(()),
        OrderPosition::Purchased if order.is_purchase_complete() => Ok(()),
        OrderPosition::Purchased => Err(ServiceError::PreconditionFailed {
            message: format!(
                "Order {} is missing an invoice or purchase method",
                order.id
            ),
            invalid_order_ids: vec![order.id],
        }),
        OrderPosition::Shipping | OrderPosition::Arrived | OrderPosition::Created => {
            Err(ServiceError::InvalidOperation(format!(
                "Order {} reaches position {} only through its box or shipment",
                order.id,
                target.as_i32()
            )))
        }
    }
}

/// Reads an order row with `FOR UPDATE`.
pub(crate) async fn lock_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

/// Unlocked read of an order, used to learn which cart or box rows must be
/// locked before the order row itself.
pub(crate) async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

/// Locks the order after its anchors. Fails with a conflict when the
/// order's cart or box link changed since `snapshot` was read.
pub(crate) async fn lock_order_if_unmoved<C: ConnectionTrait>(
    conn: &C,
    snapshot: &order::Model,
) -> Result<order::Model, ServiceError> {
    let order = lock_order(conn, snapshot.id).await?;
    if order.cart_id != snapshot.cart_id || order.box_id != snapshot.box_id {
        warn!(order_id = order.id, "Order was relinked while acquiring locks");
        return Err(ServiceError::Conflict(format!(
            "Order {} was moved by a concurrent request; retry",
            order.id
        )));
    }
    Ok(order)
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FullOrder {
    pub order: order::Model,
    pub detail: Option<order_detail::Model>,
    pub placement: Placement,
    /// Activity history, newest first
    pub activities: Vec<order_activity_log::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderUpdateOutcome {
    pub order_id: i32,
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArchiveOutcome {
    pub order_id: i32,
    pub is_archived: bool,
    /// True when the order was already in the requested state
    pub already: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteOrderOutcome {
    pub order_id: i32,
    pub previous_cart_id: Option<i32>,
    pub previous_box_id: Option<i32>,
}

/// Order Lifecycle Engine.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order at position 1 together with its single detail row.
    #[instrument(skip(self, request, actor))]
    pub async fn create_full_order(
        &self,
        request: CreateFullOrderRequest,
        actor: Option<&ActorContext>,
    ) -> Result<FullOrder, ServiceError> {
        let creator = Creator::from_parts(request.creator_user_id, request.creator_customer_id)?;
        let customer_id = creator.resolve_customer(request.customer_id)?;
        let collection_id = request.collection_id;
        let detail_input = request.single_detail()?;
        detail_input.validate()?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let txn = transaction::begin(db, "create_full_order").await?;

        let order = order::ActiveModel {
            customer_id: Set(customer_id),
            creator_user_id: Set(creator.user_id()),
            creator_customer_id: Set(creator.customer_id()),
            collection_id: Set(collection_id),
            cart_id: Set(None),
            box_id: Set(None),
            invoice_id: Set(None),
            position: Set(OrderPosition::Created),
            barcode: Set(None),
            purchase_method: Set(None),
            is_archived: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, customer_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let detail = detail_input
            .into_active_model(order.id, now)
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = order.id, "Failed to insert order detail");
                ServiceError::DatabaseError(e)
            })?;

        transaction::commit(txn, "create_full_order").await?;

        info!(order_id = order.id, customer_id, "Full order created");
        let mut pending = PendingEvents::new();
        pending.push(Event::OrderCreated { order_id: order.id });
        pending.activity(
            ActivityEntry::new("order", order.id, "order_created")
                .by(actor)
                .with_details(json!({
                    "customer_id": customer_id,
                    "order_detail_id": detail.id,
                    "creator_user_id": creator.user_id(),
                    "creator_customer_id": creator.customer_id(),
                })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(FullOrder {
            placement: order.placement(),
            order,
            detail: Some(detail),
            activities: Vec::new(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i32) -> Result<FullOrder, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let detail = OrderDetailEntity::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .order_by_asc(order_detail::Column::Id)
            .one(db)
            .await?;
        let activities = ActivityLogEntity::find()
            .filter(order_activity_log::Column::EntityType.eq("order"))
            .filter(order_activity_log::Column::EntityId.eq(order_id))
            .order_by_desc(order_activity_log::Column::CreatedAt)
            .order_by_desc(order_activity_log::Column::Id)
            .all(db)
            .await?;

        Ok(FullOrder {
            placement: order.placement(),
            order,
            detail,
            activities,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order_cart_id(&self, order_id: i32) -> Result<Option<i32>, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        Ok(order.cart_id)
    }

    /// Field-diff update over header and detail. One transaction covers the
    /// whole request; one activity entry is emitted per changed field.
    #[instrument(skip(self, update, actor), fields(actor_id = actor.actor_id))]
    pub async fn update_order(
        &self,
        order_id: i32,
        update: OrderUpdate,
        actor: &ActorContext,
    ) -> Result<OrderUpdateOutcome, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::ValidationError(
                "No fields provided to update".to_string(),
            ));
        }
        update.validate()?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let txn = transaction::begin(db, "update_order").await?;

        let order = lock_order(&txn, order_id).await?;
        let (mut order_am, header_changes) = diff_header(&order, &update)?;
        if !header_changes.is_empty() {
            order_am.updated_at = Set(now);
            order_am.update(&txn).await?;
        }

        let mut detail_changes = Vec::new();
        let mut detail_id = None;
        if update.touches_detail() {
            let detail = OrderDetailEntity::find()
                .filter(order_detail::Column::OrderId.eq(order_id))
                .order_by_asc(order_detail::Column::Id)
                .lock_exclusive()
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Order {} has no detail row", order_id))
                })?;
            let (mut detail_am, changes) = diff_detail(&detail, &update);
            if !changes.is_empty() {
                detail_am.updated_at = Set(now);
                detail_am.update(&txn).await?;
            }
            detail_id = Some(detail.id);
            detail_changes = changes;
        }

        transaction::commit(txn, "update_order").await?;

        let mut pending = PendingEvents::new();
        let mut changed_fields = Vec::new();
        for (change, table, detail_id) in header_changes
            .iter()
            .map(|c| (c, "orders", None))
            .chain(detail_changes.iter().map(|c| (c, "order_details", detail_id)))
        {
            changed_fields.push(change.field.to_string());
            pending.activity(
                ActivityEntry::new("order", order_id, "order_update")
                    .by(Some(actor))
                    .field_change(change.field, change.old_value.clone(), change.new_value.clone())
                    .with_details(json!({ "table": table, "order_detail_id": detail_id })),
            );
        }
        if !changed_fields.is_empty() {
            pending.push(Event::OrderUpdated {
                order_id,
                changed_fields: changed_fields.clone(),
            });
        }
        pending.publish(self.event_sender.as_deref());

        info!(order_id, changed = changed_fields.len(), "Order updated");
        Ok(OrderUpdateOutcome {
            order_id,
            changed_fields,
        })
    }

    /// Single-order 2 → 3. The completeness check is folded into the
    /// conditional update; no matching row means the precondition failed.
    #[instrument(skip(self, actor))]
    pub async fn move_to_purchased(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "move_to_purchased").await?;
        lock_order(&txn, order_id).await?;

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Position, Expr::value(OrderPosition::Purchased))
            .col_expr(order::Column::IsArchived, Expr::value(false))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Position.eq(OrderPosition::UnderPurchase))
            .filter(order::Column::InvoiceId.is_not_null())
            .filter(order::Column::InvoiceId.ne(0))
            .filter(order::Column::PurchaseMethod.is_not_null())
            .filter(order::Column::PurchaseMethod.ne(""))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id, "Order does not meet the conditions for position 3");
            return Err(ServiceError::PreconditionFailed {
                message: format!(
                    "Order {} must be at position 2 with an invoice and purchase method",
                    order_id
                ),
                invalid_order_ids: vec![order_id],
            });
        }

        let order = lock_order(&txn, order_id).await?;
        transaction::commit(txn, "move_to_purchased").await?;

        let mut pending = PendingEvents::new();
        pending.push(Event::OrderMovedToPurchased { order_id });
        pending.activity(
            ActivityEntry::new("order", order_id, "order_moved_to_purchased")
                .by(actor)
                .field_change("position", Some("2".into()), Some("3".into())),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(order)
    }

    #[instrument(skip(self, actor))]
    pub async fn set_barcode(
        &self,
        order_id: i32,
        barcode: &str,
        actor: Option<&ActorContext>,
    ) -> Result<order::Model, ServiceError> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(ServiceError::ValidationError(
                "barcode is required".to_string(),
            ));
        }
        self.set_text_field(order_id, "barcode", Some(barcode.to_string()), actor)
            .await
    }

    #[instrument(skip(self, actor))]
    pub async fn clear_barcode(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<order::Model, ServiceError> {
        self.set_text_field(order_id, "barcode", None, actor).await
    }

    #[instrument(skip(self, actor))]
    pub async fn set_purchase_method(
        &self,
        order_id: i32,
        purchase_method: &str,
        actor: Option<&ActorContext>,
    ) -> Result<order::Model, ServiceError> {
        let method = purchase_method.trim();
        if method.is_empty() {
            return Err(ServiceError::ValidationError(
                "purchase_method is required".to_string(),
            ));
        }
        self.set_text_field(order_id, "purchase_method", Some(method.to_string()), actor)
            .await
    }

    async fn set_text_field(
        &self,
        order_id: i32,
        field: &'static str,
        value: Option<String>,
        actor: Option<&ActorContext>,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, field).await?;
        let order = lock_order(&txn, order_id).await?;

        let old_value = match field {
            "barcode" => order.barcode.clone(),
            _ => order.purchase_method.clone(),
        };
        if old_value == value {
            transaction::commit(txn, field).await?;
            return Ok(order);
        }

        let mut am: order::ActiveModel = order.into();
        match field {
            "barcode" => am.barcode = Set(value.clone()),
            _ => am.purchase_method = Set(value.clone()),
        }
        am.updated_at = Set(Utc::now());
        let updated = am.update(&txn).await?;
        transaction::commit(txn, field).await?;

        let action = match (field, value.is_some()) {
            ("barcode", true) => "barcode_set",
            ("barcode", false) => "barcode_cleared",
            _ => "purchase_method_set",
        };
        let mut pending = PendingEvents::new();
        pending.push(Event::OrderUpdated {
            order_id,
            changed_fields: vec![field.to_string()],
        });
        pending.activity(
            ActivityEntry::new("order", order_id, action)
                .by(actor)
                .field_change(field, old_value, value),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(updated)
    }

    /// Archiving is an overlay on position 2.
    #[instrument(skip(self, actor))]
    pub async fn archive_order(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<ArchiveOutcome, ServiceError> {
        self.set_archived(order_id, true, actor).await
    }

    #[instrument(skip(self, actor))]
    pub async fn unarchive_order(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<ArchiveOutcome, ServiceError> {
        self.set_archived(order_id, false, actor).await
    }

    async fn set_archived(
        &self,
        order_id: i32,
        archived: bool,
        actor: Option<&ActorContext>,
    ) -> Result<ArchiveOutcome, ServiceError> {
        let operation = if archived { "archive_order" } else { "unarchive_order" };
        let db = &*self.db_pool;
        let txn = transaction::begin(db, operation).await?;
        let order = lock_order(&txn, order_id).await?;

        if order.is_archived == archived {
            transaction::commit(txn, operation).await?;
            return Ok(ArchiveOutcome {
                order_id,
                is_archived: archived,
                already: true,
            });
        }
        if archived && order.position != OrderPosition::UnderPurchase {
            return Err(ServiceError::InvalidOperation(format!(
                "Only orders at position 2 can be archived; order {} is at position {}",
                order_id,
                order.position.as_i32()
            )));
        }

        let mut am: order::ActiveModel = order.into();
        am.is_archived = Set(archived);
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;
        transaction::commit(txn, operation).await?;

        let mut pending = PendingEvents::new();
        pending.activity(
            ActivityEntry::new("order", order_id, operation)
                .by(actor)
                .field_change(
                    "is_archived",
                    Some((!archived).to_string()),
                    Some(archived.to_string()),
                ),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(ArchiveOutcome {
            order_id,
            is_archived: archived,
            already: false,
        })
    }

    /// Hard delete. Container counters are adjusted in the same transaction.
    #[instrument(skip(self, actor))]
    pub async fn delete_order(
        &self,
        order_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<DeleteOrderOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "delete_order").await?;
        let snapshot = find_order(&txn, order_id).await?;
        carts::lock_carts(&txn, snapshot.cart_id.into_iter()).await?;
        boxes::lock_boxes(&txn, snapshot.box_id.into_iter()).await?;
        let order = lock_order_if_unmoved(&txn, &snapshot).await?;

        // captured before the row disappears
        let entry = ActivityEntry::new("order", order_id, "order_deleted")
            .by(actor)
            .with_details(json!({ "order": &order }));

        if let Some(cart_id) = order.cart_id {
            carts::decrement_orders_count(&txn, cart_id).await?;
        }
        if let Some(box_id) = order.box_id {
            boxes::decrement_orders_count(&txn, box_id).await?;
        }

        OrderDetailEntity::delete_many()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        OrderEntity::delete_by_id(order_id).exec(&txn).await?;

        transaction::commit(txn, "delete_order").await?;

        info!(order_id, "Order deleted");
        let mut pending = PendingEvents::new();
        pending.push(Event::OrderDeleted { order_id });
        pending.activity(entry);
        pending.publish(self.event_sender.as_deref());

        Ok(DeleteOrderOutcome {
            order_id,
            previous_cart_id: order.cart_id,
            previous_box_id: order.box_id,
        })
    }
}
