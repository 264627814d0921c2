use crate::{
    auth::ActorContext,
    db::{transaction, DbPool},
    entities::{
        order::{self, Entity as OrderEntity, OrderPosition},
        shipment::{self, Entity as ShipmentEntity, ShipmentStatus},
        shipment_image::{self, Entity as ShipmentImageEntity},
        shipping_box::Entity as BoxEntity,
    },
    errors::ServiceError,
    events::{activity::ActivityEntry, Event, EventSender, PendingEvents},
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
use validator::{Validate, ValidationError};

fn positive_weight(weight: &Decimal) -> Result<(), ValidationError> {
    if weight.is_sign_positive() && !weight.is_zero() {
        Ok(())
    } else {
        Err(ValidationError::new("weight must be greater than zero"))
    }
}

fn non_empty_images(images: &Vec<String>) -> Result<(), ValidationError> {
    if images.iter().any(|i| i.trim().is_empty()) {
        return Err(ValidationError::new("images cannot contain empty entries"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateShipmentRequest {
    #[validate(range(min = 1, message = "box_id is required"))]
    pub box_id: i32,
    #[validate(range(min = 1, message = "company_id is required"))]
    pub company_id: i32,
    #[validate(length(min = 1, message = "sender_name is required"))]
    pub sender_name: String,
    #[validate(custom = "positive_weight")]
    pub weight: Decimal,
    #[serde(default)]
    #[validate(custom = "non_empty_images")]
    pub images: Vec<String>,
}

/// Partial update. `images` (or its alias `image_data`) replaces the whole
/// image set; an empty list leaves the shipment without images.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateShipmentRequest {
    #[validate(range(min = 1))]
    pub box_id: Option<i32>,
    #[validate(range(min = 1))]
    pub company_id: Option<i32>,
    #[validate(length(min = 1, message = "sender_name cannot be empty"))]
    pub sender_name: Option<String>,
    #[validate(custom = "positive_weight")]
    pub weight: Option<Decimal>,
    #[serde(alias = "image_data")]
    #[validate(custom = "non_empty_images")]
    pub images: Option<Vec<String>>,
}

impl UpdateShipmentRequest {
    pub fn is_empty(&self) -> bool {
        self.box_id.is_none()
            && self.company_id.is_none()
            && self.sender_name.is_none()
            && self.weight.is_none()
            && self.images.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddShipmentImageRequest {
    #[validate(length(min = 1, message = "image_data is required"))]
    pub image_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentWithImages {
    pub shipment: shipment::Model,
    pub images: Vec<shipment_image::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentArrivalOutcome {
    pub shipment: shipment::Model,
    pub box_id: i32,
    pub moved_orders_count: u64,
}

async fn insert_images<C: ConnectionTrait>(
    conn: &C,
    shipment_id: i32,
    images: Vec<String>,
    now: DateTime<Utc>,
) -> Result<Vec<shipment_image::Model>, ServiceError> {
    let mut inserted = Vec::with_capacity(images.len());
    for image_data in images {
        let image = shipment_image::ActiveModel {
            shipment_id: Set(shipment_id),
            image_data: Set(image_data),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(|e| {
            error!(error = %e, shipment_id, "Failed to insert shipment image");
            ServiceError::DatabaseError(e)
        })?;
        inserted.push(image);
    }
    Ok(inserted)
}

async fn images_of<C: ConnectionTrait>(
    conn: &C,
    shipment_id: i32,
) -> Result<Vec<shipment_image::Model>, ServiceError> {
    Ok(ShipmentImageEntity::find()
        .filter(shipment_image::Column::ShipmentId.eq(shipment_id))
        .order_by_asc(shipment_image::Column::Id)
        .all(conn)
        .await?)
}

async fn lock_shipment<C: ConnectionTrait>(
    conn: &C,
    shipment_id: i32,
) -> Result<shipment::Model, ServiceError> {
    ShipmentEntity::find_by_id(shipment_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Shipment", shipment_id))
}

async fn ensure_box_exists<C: ConnectionTrait>(conn: &C, box_id: i32) -> Result<(), ServiceError> {
    BoxEntity::find_by_id(box_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::not_found("Box", box_id))
}

/// Shipment half of the Box/Shipment Aggregator.
#[derive(Clone)]
pub struct ShipmentService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ShipmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Inserts the shipment in the ready state together with its images.
    /// A failed image insert rolls the shipment back as well.
    #[instrument(skip(self, request, actor), fields(box_id = request.box_id))]
    pub async fn add_shipment(
        &self,
        request: CreateShipmentRequest,
        actor: Option<&ActorContext>,
    ) -> Result<ShipmentWithImages, ServiceError> {
        request.validate()?;
        let sender_name = request.sender_name.trim().to_string();
        if sender_name.is_empty() {
            return Err(ServiceError::ValidationError(
                "sender_name is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let txn = transaction::begin(db, "add_shipment").await?;
        ensure_box_exists(&txn, request.box_id).await?;

        let created = shipment::ActiveModel {
            box_id: Set(request.box_id),
            company_id: Set(request.company_id),
            sender_name: Set(sender_name),
            weight: Set(request.weight),
            status: Set(ShipmentStatus::Ready),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        let images = insert_images(&txn, created.id, request.images, now).await?;

        transaction::commit(txn, "add_shipment").await?;

        info!(shipment_id = created.id, images = images.len(), "Shipment created");
        let mut pending = PendingEvents::new();
        pending.push(Event::ShipmentCreated {
            shipment_id: created.id,
            box_id: created.box_id,
        });
        pending.activity(
            ActivityEntry::new("shipment", created.id, "shipment_created")
                .by(actor)
                .with_details(json!({
                    "box_id": created.box_id,
                    "company_id": created.company_id,
                    "images_count": images.len(),
                })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(ShipmentWithImages {
            shipment: created,
            images,
        })
    }

    #[instrument(skip(self, request, actor))]
    pub async fn update_shipment(
        &self,
        shipment_id: i32,
        request: UpdateShipmentRequest,
        actor: Option<&ActorContext>,
    ) -> Result<ShipmentWithImages, ServiceError> {
        if request.is_empty() {
            return Err(ServiceError::ValidationError(
                "No fields provided to update".to_string(),
            ));
        }
        request.validate()?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let txn = transaction::begin(db, "update_shipment").await?;
        let current = lock_shipment(&txn, shipment_id).await?;

        let mut changed = Vec::new();
        let mut am: shipment::ActiveModel = current.clone().into();
        if let Some(box_id) = request.box_id.filter(|b| *b != current.box_id) {
            ensure_box_exists(&txn, box_id).await?;
            am.box_id = Set(box_id);
            changed.push("box_id");
        }
        if let Some(company_id) = request.company_id.filter(|c| *c != current.company_id) {
            am.company_id = Set(company_id);
            changed.push("company_id");
        }
        if let Some(sender_name) = request
            .sender_name
            .map(|s| s.trim().to_string())
            .filter(|s| *s != current.sender_name)
        {
            if sender_name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "sender_name cannot be empty".to_string(),
                ));
            }
            am.sender_name = Set(sender_name);
            changed.push("sender_name");
        }
        if let Some(weight) = request.weight.filter(|w| *w != current.weight) {
            am.weight = Set(weight);
            changed.push("weight");
        }

        let shipment = if changed.is_empty() {
            current
        } else {
            am.updated_at = Set(now);
            am.update(&txn).await?
        };

        let images = match request.images {
            Some(replacement) => {
                ShipmentImageEntity::delete_many()
                    .filter(shipment_image::Column::ShipmentId.eq(shipment_id))
                    .exec(&txn)
                    .await?;
                changed.push("images");
                insert_images(&txn, shipment_id, replacement, now).await?
            }
            None => images_of(&txn, shipment_id).await?,
        };

        transaction::commit(txn, "update_shipment").await?;

        let mut pending = PendingEvents::new();
        if !changed.is_empty() {
            pending.push(Event::ShipmentUpdated { shipment_id });
            pending.activity(
                ActivityEntry::new("shipment", shipment_id, "shipment_updated")
                    .by(actor)
                    .with_details(json!({ "changed_fields": &changed })),
            );
        }
        pending.publish(self.event_sender.as_deref());

        Ok(ShipmentWithImages { shipment, images })
    }

    #[instrument(skip(self, request, actor))]
    pub async fn add_shipment_image(
        &self,
        shipment_id: i32,
        request: AddShipmentImageRequest,
        actor: Option<&ActorContext>,
    ) -> Result<shipment_image::Model, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        let txn = transaction::begin(db, "add_shipment_image").await?;
        lock_shipment(&txn, shipment_id).await?;
        let mut inserted =
            insert_images(&txn, shipment_id, vec![request.image_data], Utc::now()).await?;
        transaction::commit(txn, "add_shipment_image").await?;

        let image = inserted
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Image insert returned no row".into()))?;

        let mut pending = PendingEvents::new();
        pending.activity(
            ActivityEntry::new("shipment", shipment_id, "shipment_image_added")
                .by(actor)
                .with_details(json!({ "image_id": image.id })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(image)
    }

    #[instrument(skip(self))]
    pub async fn get_shipment(&self, shipment_id: i32) -> Result<ShipmentWithImages, ServiceError> {
        let db = &*self.db_pool;
        let shipment = ShipmentEntity::find_by_id(shipment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Shipment", shipment_id))?;
        let images = images_of(db, shipment_id).await?;
        Ok(ShipmentWithImages { shipment, images })
    }

    /// In transit → arrived. Every order in the shipment's box moves to
    /// position 5 whatever its current position.
    #[instrument(skip(self, actor))]
    pub async fn mark_arrived(
        &self,
        shipment_id: i32,
        actor: Option<&ActorContext>,
    ) -> Result<ShipmentArrivalOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = transaction::begin(db, "mark_shipment_arrived").await?;
        let current = lock_shipment(&txn, shipment_id).await?;

        if current.status != ShipmentStatus::InTransit {
            warn!(shipment_id, status = current.status.as_i32(), "Shipment is not in transit");
            return Err(ServiceError::InvalidOperation(format!(
                "Shipment {} must be in transit to arrive (status {})",
                shipment_id,
                current.status.as_i32()
            )));
        }

        let now = Utc::now();
        let box_id = current.box_id;
        let mut am: shipment::ActiveModel = current.into();
        am.status = Set(ShipmentStatus::Arrived);
        am.updated_at = Set(now);
        let shipment = am.update(&txn).await?;

        let moved_orders_count = OrderEntity::update_many()
            .col_expr(order::Column::Position, Expr::value(OrderPosition::Arrived))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::BoxId.eq(box_id))
            .filter(order::Column::Position.ne(OrderPosition::Arrived))
            .exec(&txn)
            .await?
            .rows_affected;

        transaction::commit(txn, "mark_shipment_arrived").await?;

        info!(shipment_id, box_id, moved_orders_count, "Shipment arrived");
        metrics::counter!("fulfillment_shipment.arrived", 1);
        let mut pending = PendingEvents::new();
        pending.push(Event::ShipmentArrived {
            shipment_id,
            box_id,
            moved_orders: moved_orders_count,
        });
        pending.activity(
            ActivityEntry::new("shipment", shipment_id, "shipment_arrived")
                .by(actor)
                .field_change(
                    "status",
                    Some(ShipmentStatus::InTransit.as_i32().to_string()),
                    Some(ShipmentStatus::Arrived.as_i32().to_string()),
                )
                .with_details(json!({
                    "box_id": box_id,
                    "moved_orders_count": moved_orders_count,
                })),
        );
        pending.publish(self.event_sender.as_deref());

        Ok(ShipmentArrivalOutcome {
            shipment,
            box_id,
            moved_orders_count,
        })
    }
}
