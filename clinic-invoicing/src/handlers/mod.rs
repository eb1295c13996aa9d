mod health;
mod invoices;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use invoices::{
    add_line, create_invoice, delete_invoice, download_pdf, get_invoice, list_invoices, mark_paid,
    regenerate_pdf, remind_overdue, send_invoice, send_invoice_by_id, update_invoice,
};
