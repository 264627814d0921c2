use crate::{
    auth::ActorContext,
    db::{transaction, DbPool},
    entities::{
        order::{self, Entity as OrderEntity},
        purchase_invoice::{self, Entity as InvoiceEntity},
    },
    errors::ServiceError,
    events::{activity::ActivityEntry, Event, EventSender, PendingEvents},
    services::orders::lock_order,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddInvoiceRequest {
    #[serde(alias = "orderId")]
    #[validate(range(min = 1, message = "order_id is required"))]
    pub order_id: i32,
    #[serde(alias = "invoiceBase64")]
    #[validate(length(min = 1, message = "invoice_base64 is required"))]
    pub invoice_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReplaceInvoiceRequest {
    #[serde(alias = "oldInvoiceId")]
    pub old_invoice_id: i32,
    #[serde(alias = "invoiceBase64")]
    #[validate(length(min = 1, message = "invoice_base64 is required"))]
    pub invoice_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApplyPurchaseRequest {
    #[validate(length(min = 1, message = "purchase_method is required"))]
    pub purchase_method: String,
    #[validate(length(min = 1, message = "invoice_base64 is required"))]
    pub invoice_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceLinkOutcome {
    pub order_id: i32,
    pub invoice_id: i32,
    pub replaced_invoice_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceInvoiceOutcome {
    pub order_id: i32,
    pub old_invoice_id: i32,
    pub new_invoice_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyPurchaseOutcome {
    pub order_id: i32,
    pub purchase_method: String,
    pub invoice_id: i32,
    pub replaced_invoice_id: Option<i32>,
}

fn require_payload(payload: &str) -> Result<(), ServiceError> {
    if payload.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "invoice_base64 is required".to_string(),
        ));
    }
    Ok(())
}

async fn insert_invoice<C: ConnectionTrait>(
    conn: &C,
    payload: String,
) -> Result<purchase_invoice::Model, ServiceError> {
    Ok(purchase_invoice::ActiveModel {
        invoice_image_base64: Set(payload),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}

/// Points the order at `invoice_id` and drops the invoice it replaces.
async fn relink<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    invoice_id: i32,
    purchase_method: Option<String>,
) -> Result<Option<i32>, ServiceError> {
    let replaced = order.invoice_id.filter(|id| *id != 0);
    let mut am: order::ActiveModel = order.into();
    am.invoice_id = Set(Some(invoice_id));
    if let Some(method) = purchase_method {
        am.purchase_method = Set(Some(method));
    }
    am.updated_at = Set(Utc::now());
    am.update(conn).await?;

    if let Some(old) = replaced {
        InvoiceEntity::delete_by_id(old).exec(conn).await?;
    }
    Ok(replaced)
}

/// Purchase invoices, one per order.
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request, actor), fields(order_id = request.order_id))]
    pub async fn add_invoice(
        &self,
        request: AddInvoiceRequest,
        actor: Option<&ActorContext>,
    ) -> Result<InvoiceLinkOutcome, ServiceError> {
        request.validate()?;
        require_payload(&request.invoice_base64)?;

        let db = &*self.db_pool;
        let txn = transaction::begin(db, "add_invoice").await?;
        let order = lock_order(&txn, request.order_id).await?;
        let invoice = insert_invoice(&txn, request.invoice_base64).await?;
        let replaced_invoice_id = relink(&txn, order, invoice.id, None).await?;
        transaction::commit(txn, "add_invoice").await?;

        info!(invoice_id = invoice.id, ?replaced_invoice_id, "Invoice linked");
        self.publish_link(request.order_id, invoice.id, replaced_invoice_id, "invoice_added", actor);

        Ok(InvoiceLinkOutcome {
            order_id: request.order_id,
            invoice_id: invoice.id,
            replaced_invoice_id,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_invoice_by_order(
        &self,
        order_id: i32,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let Some(invoice_id) = order.invoice_id else {
            return Err(ServiceError::NotFound(format!(
                "No invoice found for order {}",
                order_id
            )));
        };
        InvoiceEntity::find_by_id(invoice_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No invoice found for order {}", order_id)))
    }

    /// Swaps the order's invoice. `old_invoice_id` must match what the order
    /// currently links to.
    #[instrument(skip(self, request, actor), fields(old_invoice_id = request.old_invoice_id))]
    pub async fn replace_invoice(
        &self,
        order_id: i32,
        request: ReplaceInvoiceRequest,
        actor: Option<&ActorContext>,
    ) -> Result<ReplaceInvoiceOutcome, ServiceError> {
        request.validate()?;
        require_payload(&request.invoice_base64)?;

        let db = &*self.db_pool;
        let txn = transaction::begin(db, "replace_invoice").await?;
        let order = lock_order(&txn, order_id).await?;

        if order.invoice_id != Some(request.old_invoice_id) {
            warn!(order_id, current = ?order.invoice_id, "Invoice id mismatch");
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not linked to invoice {}",
                order_id, request.old_invoice_id
            )));
        }

        let invoice = insert_invoice(&txn, request.invoice_base64).await?;
        relink(&txn, order, invoice.id, None).await?;
        transaction::commit(txn, "replace_invoice").await?;

        info!(order_id, new_invoice_id = invoice.id, "Invoice replaced");
        self.publish_link(
            order_id,
            invoice.id,
            Some(request.old_invoice_id),
            "invoice_replaced",
            actor,
        );

        Ok(ReplaceInvoiceOutcome {
            order_id,
            old_invoice_id: request.old_invoice_id,
            new_invoice_id: invoice.id,
        })
    }

    /// Records how the order was bought and links a fresh invoice.
    #[instrument(skip(self, request, actor))]
    pub async fn apply_purchase(
        &self,
        order_id: i32,
        request: ApplyPurchaseRequest,
        actor: Option<&ActorContext>,
    ) -> Result<ApplyPurchaseOutcome, ServiceError> {
        request.validate()?;
        require_payload(&request.invoice_base64)?;
        let purchase_method = request.purchase_method.trim().to_string();
        if purchase_method.is_empty() {
            return Err(ServiceError::ValidationError(
                "purchase_method is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = transaction::begin(db, "apply_purchase").await?;
        let order = lock_order(&txn, order_id).await?;
        let previous_method = order.purchase_method.clone();
        let invoice = insert_invoice(&txn, request.invoice_base64).await?;
        let replaced_invoice_id =
            relink(&txn, order, invoice.id, Some(purchase_method.clone())).await?;
        transaction::commit(txn, "apply_purchase").await?;

        info!(order_id, invoice_id = invoice.id, "Purchase applied");
        let mut pending = PendingEvents::new();
        pending.activity(
            ActivityEntry::new("order", order_id, "purchase_method_set")
                .by(actor)
                .field_change(
                    "purchase_method",
                    previous_method,
                    Some(purchase_method.clone()),
                ),
        );
        pending.publish(self.event_sender.as_deref());
        self.publish_link(order_id, invoice.id, replaced_invoice_id, "purchase_applied", actor);

        Ok(ApplyPurchaseOutcome {
            order_id,
            purchase_method,
            invoice_id: invoice.id,
            replaced_invoice_id,
        })
    }

    fn publish_link(
        &self,
        order_id: i32,
        invoice_id: i32,
        replaced_invoice_id: Option<i32>,
        action: &str,
        actor: Option<&ActorContext>,
    ) {
        let mut pending = PendingEvents::new();
        pending.push(Event::InvoiceLinked {
            order_id,
            invoice_id,
            replaced_invoice_id,
        });
        pending.activity(
            ActivityEntry::new("order", order_id, action)
                .by(actor)
                .field_change(
                    "invoice_id",
                    replaced_invoice_id.map(|id| id.to_string()),
                    Some(invoice_id.to_string()),
                )
                .with_details(json!({ "invoice_id": invoice_id })),
        );
        pending.publish(self.event_sender.as_deref());
    }
}
