//! Domain event bus for the invoicing service.
//!
//! Notification and audit consumers subscribe independently; the
//! orchestrator never calls them directly.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::Invoice;

/// Events published by the invoicing orchestrator.
#[derive(Debug, Clone)]
pub enum InvoiceEvent {
    /// An invoice transitioned from draft to sent. Carries the full
    /// invoice for downstream consumers.
    Sent(Invoice),
}

/// Broadcast-based pub/sub handle shared by the orchestrator and its
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<InvoiceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: InvoiceEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers for invoice event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvoiceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Logs every sent invoice for audit; runs until the bus is dropped.
pub fn spawn_audit_logger(bus: &EventBus) {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(InvoiceEvent::Sent(invoice)) => {
                    info!(
                        invoice_id = %invoice.invoice_id,
                        tenant_id = %invoice.tenant_id,
                        number = %invoice.number,
                        total = %invoice.total,
                        "invoice.sent"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped = skipped, "Audit logger lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn test_invoice() -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            number: "F-1".to_string(),
            status: "sent".to_string(),
            issue_date: Utc::now().date_naive(),
            due_date: Utc::now().date_naive(),
            total: Decimal::ZERO,
            notes: None,
            billing_line1: None,
            billing_line2: None,
            billing_city: None,
            billing_postal_code: None,
            billing_country: None,
            patient_id: None,
            encounter_id: None,
            pdf_path: None,
            qr_path: None,
            created_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let invoice = test_invoice();

        bus.publish(InvoiceEvent::Sent(invoice.clone()));

        let InvoiceEvent::Sent(received) = receiver.recv().await.unwrap();
        assert_eq!(received.invoice_id, invoice.invoice_id);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(InvoiceEvent::Sent(test_invoice()));
    }
}
