//! Domain services for clinic-invoicing.

pub mod events;
pub mod invoicing;
pub mod metrics;
pub mod pdf;
pub mod qr;
pub mod storage;

pub use events::{spawn_audit_logger, EventBus, InvoiceEvent};
pub use invoicing::{InvoiceWithRelations, InvoicingService};
pub use metrics::{get_metrics, init_metrics};
pub use storage::{LocalStorage, S3Storage, Storage};
