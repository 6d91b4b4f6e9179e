//! # Domain Events
//!
//! Fire-and-forget notifications published after a workflow commits.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleRepository::confirm                                                │
//! │       │                                                                 │
//! │       ├── tx.commit()  ← state is durable                              │
//! │       │                                                                 │
//! │       └── events.publish(SaleConfirmed)                                │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │        broadcast::Sender ──► subscriber 1 (notifications)              │
//! │                          ──► subscriber 2 (audit log)                  │
//! │                                                                         │
//! │  No subscribers? Logged at debug, the workflow still succeeds.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use stockroom_core::{Money, MovementType, Quantity};
use tokio::sync::broadcast;
use tracing::debug;

/// Something that happened and was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    MovementCompleted {
        movement_id: String,
        product_id: String,
        branch_id: String,
        movement_type: MovementType,
        quantity: Quantity,
    },
    TransferCompleted {
        reference_id: String,
        product_id: String,
        from_branch_id: String,
        to_branch_id: String,
        quantity: Quantity,
    },
    /// Stock at a branch dropped to or below its minimum.
    LowStock {
        product_id: String,
        branch_id: String,
        stock: Quantity,
        min_stock: Quantity,
    },
    PurchaseCreated {
        purchase_id: String,
        invoice_number: String,
        total: Money,
    },
    PurchaseReceived {
        purchase_id: String,
        branch_id: String,
    },
    PurchaseCancelled {
        purchase_id: String,
    },
    SaleCreated {
        sale_id: String,
        invoice_number: String,
        total: Money,
    },
    SaleConfirmed {
        sale_id: String,
        branch_id: String,
        total: Money,
    },
    SaleCancelled {
        sale_id: String,
    },
    PaymentApplied {
        order: String,
        order_id: String,
        payment_id: String,
        amount: Money,
    },
    PaymentCancelled {
        order: String,
        order_id: String,
        payment_id: String,
    },
}

impl DomainEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::MovementCompleted { .. } => "movement_completed",
            DomainEvent::TransferCompleted { .. } => "transfer_completed",
            DomainEvent::LowStock { .. } => "low_stock",
            DomainEvent::PurchaseCreated { .. } => "purchase_created",
            DomainEvent::PurchaseReceived { .. } => "purchase_received",
            DomainEvent::PurchaseCancelled { .. } => "purchase_cancelled",
            DomainEvent::SaleCreated { .. } => "sale_created",
            DomainEvent::SaleConfirmed { .. } => "sale_confirmed",
            DomainEvent::SaleCancelled { .. } => "sale_cancelled",
            DomainEvent::PaymentApplied { .. } => "payment_applied",
            DomainEvent::PaymentCancelled { .. } => "payment_cancelled",
        }
    }
}

/// Broadcast bus shared by every repository of one [`crate::Database`].
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    /// Publishes an event. Never fails: a send with no subscribers is dropped.
    pub fn publish(&self, event: DomainEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "Event published"),
            Err(_) => debug!(event = name, "Event dropped, no subscribers"),
        }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.publish(DomainEvent::SaleCancelled {
            sale_id: "s-1".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::PurchaseReceived {
            purchase_id: "p-1".to_string(),
            branch_id: "b-1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "purchase_received");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = DomainEvent::SaleCancelled {
            sale_id: "s-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sale_cancelled");
        assert_eq!(json["sale_id"], "s-1");
    }
}
