// Order Lifecycle Engine
pub mod orders;

// Aggregators
pub mod boxes;
pub mod carts;
pub mod shipments;

// Purchase invoice linking
pub mod invoices;

pub use boxes::BoxService;
pub use carts::CartService;
pub use invoices::InvoiceService;
pub use orders::OrderService;
pub use shipments::ShipmentService;
