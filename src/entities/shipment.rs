use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "shipments")]
#[schema(as = Shipment)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub box_id: i32,
    /// Shipping company carrying the box
    pub company_id: i32,
    pub sender_name: String,
    #[sea_orm(column_type = "Decimal(Some((12, 3)))")]
    pub weight: Decimal,
    #[schema(value_type = i32, minimum = 1, maximum = 3)]
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shipping_box::Entity",
        from = "Column::BoxId",
        to = "super::shipping_box::Column::Id"
    )]
    ShippingBox,
    #[sea_orm(has_many = "super::shipment_image::Entity")]
    Images,
}

impl Related<super::shipping_box::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShippingBox.def()
    }
}

impl Related<super::shipment_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Shipment status. A shipment is created ready, goes in transit when its box
/// is sealed and is marked arrived explicitly.
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
pub enum ShipmentStatus {
    #[sea_orm(num_value = 1)]
    Ready,
    #[sea_orm(num_value = 2)]
    InTransit,
    #[sea_orm(num_value = 3)]
    Arrived,
}

impl ShipmentStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ready => 1,
            Self::InTransit => 2,
            Self::Arrived => 3,
        }
    }
}

impl From<ShipmentStatus> for i32 {
    fn from(status: ShipmentStatus) -> Self {
        status.as_i32()
    }
}

impl TryFrom<i32> for ShipmentStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ready),
            2 => Ok(Self::InTransit),
            3 => Ok(Self::Arrived),
            other => Err(format!("status must be between 1 and 3, got {}", other)),
        }
    }
}
