use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub mod activity;

use activity::{ActivityEntry, ActivitySink};

/// Domain events. Published only after the originating transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: i32,
    },
    OrderUpdated {
        order_id: i32,
        changed_fields: Vec<String>,
    },
    OrderMovedToPurchased {
        order_id: i32,
    },
    OrderDeleted {
        order_id: i32,
    },

    // Cart events
    CartCreated {
        cart_id: i32,
    },
    OrderAddedToCart {
        order_id: i32,
        cart_id: i32,
        previous_cart_id: Option<i32>,
    },
    OrderRemovedFromCart {
        order_id: i32,
        previous_cart_id: Option<i32>,
    },
    CartClosed {
        cart_id: i32,
        moved_orders: u64,
        unarchived_orders: u64,
    },

    // Box and shipment events
    BoxCreated {
        box_id: i32,
    },
    OrderAssignedToBox {
        order_id: i32,
        box_id: i32,
        previous_box_id: Option<i32>,
    },
    OrderRemovedFromBox {
        order_id: i32,
        previous_box_id: Option<i32>,
    },
    BoxSealed {
        box_id: i32,
        moved_orders: u64,
        moved_shipments: u64,
    },
    BoxOrdersArrived {
        box_id: i32,
        moved_orders: u64,
    },
    ShipmentCreated {
        shipment_id: i32,
        box_id: i32,
    },
    ShipmentUpdated {
        shipment_id: i32,
    },
    ShipmentArrived {
        shipment_id: i32,
        box_id: i32,
        moved_orders: u64,
    },

    // Invoice events
    InvoiceLinked {
        order_id: i32,
        invoice_id: i32,
        replaced_invoice_id: Option<i32>,
    },

    /// Audit entry bound for the activity sink
    Activity(ActivityEntry),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, waiting for channel capacity.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting. A full or closed channel is logged and
    /// the event dropped; callers never fail because of it.
    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            metrics::counter!("fulfillment_events.dropped", 1);
            warn!(error = %e, "Dropping domain event");
        }
    }

    /// Publishes a batch of activity entries, in order.
    pub fn send_activity(&self, entries: impl IntoIterator<Item = ActivityEntry>) {
        for entry in entries {
            self.send_or_log(Event::Activity(entry));
        }
    }
}

/// Events collected while a transaction is open. Nothing leaves until
/// [`PendingEvents::publish`] is called after the commit; dropping the
/// collection on an error path discards everything.
#[derive(Debug, Default)]
#[must_use = "pending events are discarded unless published"]
pub struct PendingEvents {
    events: Vec<Event>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn activity(&mut self, entry: ActivityEntry) {
        self.events.push(Event::Activity(entry));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn publish(self, sender: Option<&EventSender>) {
        let Some(sender) = sender else {
            return;
        };
        for event in self.events {
            sender.send_or_log(event);
        }
    }
}

/// Creates the event channel used between services and [`process_events`].
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Hands a single event to its consumer. Sink failures stay here.
pub async fn dispatch_event(event: Event, sink: &dyn ActivitySink) {
    match event {
        Event::Activity(entry) => {
            if let Err(e) = sink.record(&entry).await {
                metrics::counter!("fulfillment_activity.sink_failures", 1);
                warn!(
                    error = %e,
                    entity_type = %entry.entity_type,
                    entity_id = entry.entity_id,
                    action = %entry.action_type,
                    "Activity sink failed to record entry"
                );
            }
        }
        other => {
            info!(event = ?other, "Domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, sink: Arc<dyn ActivitySink>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        dispatch_event(event, sink.as_ref()).await;
    }

    info!("Event processing loop stopped");
}
