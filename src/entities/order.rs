use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Order header. Exactly one detail row hangs off every order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub customer_id: i32,
    #[sea_orm(nullable)]
    pub creator_user_id: Option<i32>,
    #[sea_orm(nullable)]
    pub creator_customer_id: Option<i32>,
    #[sea_orm(nullable)]
    pub collection_id: Option<i32>,
    #[sea_orm(nullable)]
    pub cart_id: Option<i32>,
    #[sea_orm(nullable)]
    pub box_id: Option<i32>,
    #[sea_orm(nullable)]
    pub invoice_id: Option<i32>,
    #[schema(value_type = i32, minimum = 1, maximum = 5)]
    pub position: OrderPosition,
    #[sea_orm(nullable)]
    pub barcode: Option<String>,
    #[sea_orm(nullable)]
    pub purchase_method: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_detail::Entity")]
    Details,
    #[sea_orm(
        belongs_to = "super::cart::Entity",
        from = "Column::CartId",
        to = "super::cart::Column::Id"
    )]
    Cart,
    #[sea_orm(
        belongs_to = "super::shipping_box::Entity",
        from = "Column::BoxId",
        to = "super::shipping_box::Column::Id"
    )]
    ShippingBox,
    #[sea_orm(
        belongs_to = "super::purchase_invoice::Entity",
        from = "Column::InvoiceId",
        to = "super::purchase_invoice::Column::Id"
    )]
    Invoice,
}

impl Related<super::order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Details.def()
    }
}

impl Related<super::cart::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cart.def()
    }
}

impl Related<super::shipping_box::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShippingBox.def()
    }
}

impl Related<super::purchase_invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn placement(&self) -> Placement {
        Placement::derive(self.position, self.cart_id, self.box_id)
    }

    /// Invoice linked and a non-blank purchase method recorded.
    pub fn is_purchase_complete(&self) -> bool {
        self.invoice_id.map_or(false, |id| id != 0)
            && self
                .purchase_method
                .as_deref()
                .map_or(false, |m| !m.trim().is_empty())
    }
}

/// Lifecycle stage of an order. Stored as its integer value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(try_from = "i32", into = "i32")]
pub enum OrderPosition {
    #[sea_orm(num_value = 1)]
    Created,
    #[sea_orm(num_value = 2)]
    UnderPurchase,
    #[sea_orm(num_value = 3)]
    Purchased,
    #[sea_orm(num_value = 4)]
    Shipping,
    #[sea_orm(num_value = 5)]
    Arrived,
}

impl OrderPosition {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Created => 1,
            Self::UnderPurchase => 2,
            Self::Purchased => 3,
            Self::Shipping => 4,
            Self::Arrived => 5,
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::UnderPurchase),
            Self::UnderPurchase => Some(Self::Purchased),
            Self::Purchased => Some(Self::Shipping),
            Self::Shipping => Some(Self::Arrived),
            Self::Arrived => None,
        }
    }

    /// Only a single forward step is ever legal.
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl From<OrderPosition> for i32 {
    fn from(position: OrderPosition) -> Self {
        position.as_i32()
    }
}

impl TryFrom<i32> for OrderPosition {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Created),
            2 => Ok(Self::UnderPurchase),
            3 => Ok(Self::Purchased),
            4 => Ok(Self::Shipping),
            5 => Ok(Self::Arrived),
            other => Err(format!("position must be between 1 and 5, got {}", other)),
        }
    }
}

/// Who created an order: a staff user or a customer, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creator {
    ByUser(i32),
    ByCustomer(i32),
}

impl Creator {
    pub fn from_parts(
        user_id: Option<i32>,
        customer_id: Option<i32>,
    ) -> Result<Self, ServiceError> {
        match (user_id, customer_id) {
            (Some(user), None) => Ok(Self::ByUser(user)),
            (None, Some(customer)) => Ok(Self::ByCustomer(customer)),
            _ => Err(ServiceError::ValidationError(
                "Order must be created by either a user OR a customer (exactly one)".to_string(),
            )),
        }
    }

    /// Customer the order belongs to. A user creating an order must name one;
    /// a customer creates orders for themselves.
    pub fn resolve_customer(&self, customer_id: Option<i32>) -> Result<i32, ServiceError> {
        match (self, customer_id) {
            (Self::ByUser(_), Some(customer)) => Ok(customer),
            (Self::ByUser(_), None) => Err(ServiceError::ValidationError(
                "When a user creates an order, customer_id must be provided".to_string(),
            )),
            (Self::ByCustomer(own), None) => Ok(*own),
            (Self::ByCustomer(own), Some(customer)) if customer == *own => Ok(customer),
            (Self::ByCustomer(_), Some(_)) => Err(ServiceError::ValidationError(
                "A customer can only create orders for themselves".to_string(),
            )),
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        match self {
            Self::ByUser(id) => Some(*id),
            Self::ByCustomer(_) => None,
        }
    }

    pub fn customer_id(&self) -> Option<i32> {
        match self {
            Self::ByUser(_) => None,
            Self::ByCustomer(id) => Some(*id),
        }
    }
}

/// Logical container an order sits in. An order is only "in a cart" while
/// under purchase and only "in a box" once purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Placement {
    Unassigned,
    InCart(i32),
    InBox(i32),
}

impl Placement {
    pub fn derive(position: OrderPosition, cart_id: Option<i32>, box_id: Option<i32>) -> Self {
        match (position, cart_id, box_id) {
            (OrderPosition::UnderPurchase, Some(cart), _) => Self::InCart(cart),
            (p, _, Some(b)) if p >= OrderPosition::Purchased => Self::InBox(b),
            _ => Self::Unassigned,
        }
    }
}
