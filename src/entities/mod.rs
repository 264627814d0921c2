pub mod cart;
pub mod order;
pub mod order_activity_log;
pub mod order_detail;
pub mod purchase_invoice;
pub mod shipment;
pub mod shipment_image;
pub mod shipping_box;

pub use order::{Creator, OrderPosition, Placement};
pub use shipment::ShipmentStatus;
