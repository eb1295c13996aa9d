//! Domain models for clinic-invoicing.

mod invoice;
mod line;
mod patient;
mod tenant;

pub use invoice::{
    default_due_date, generate_invoice_number, BillingAddress, CreateInvoice, Invoice,
    InvoiceStatus, UpdateInvoice,
};
pub use line::{compute_line_amounts, CreateInvoiceLine, InvoiceLine, LineAmounts};
pub use patient::Patient;
pub use tenant::Tenant;
