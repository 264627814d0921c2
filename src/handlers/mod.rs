pub mod boxes;
pub mod carts;
pub mod common;
pub mod invoices;
pub mod orders;
pub mod shipments;

use crate::{db::DbPool, events::EventSender};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<crate::services::OrderService>,
    pub carts: Arc<crate::services::CartService>,
    pub boxes: Arc<crate::services::BoxService>,
    pub shipments: Arc<crate::services::ShipmentService>,
    pub invoices: Arc<crate::services::InvoiceService>,
}

impl AppServices {
    /// Builds every service over one pool. Without a sender, events are
    /// discarded after commit.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            orders: Arc::new(crate::services::OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            carts: Arc::new(crate::services::CartService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            boxes: Arc::new(crate::services::BoxService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            shipments: Arc::new(crate::services::ShipmentService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            invoices: Arc::new(crate::services::InvoiceService::new(
                db_pool,
                event_sender,
            )),
        }
    }
}
