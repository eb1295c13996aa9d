//! Persistence capability for the invoicing service.
//!
//! Two backends behind one trait, mirroring the local/S3 split of the
//! object storage layer: PostgreSQL for deployments, in-memory for tests
//! and local development.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::error::AppError;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Invoice, InvoiceLine, InvoiceStatus, Patient, Tenant, UpdateInvoice,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    async fn list_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, AppError>;

    async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError>;

    async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError>;

    /// Set the status, optionally only when the current status matches
    /// `expected`. Returns the updated invoice, or `None` when no row
    /// matched the scope (and guard, if any).
    async fn set_status(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
        expected: Option<InvoiceStatus>,
    ) -> Result<Option<Invoice>, AppError>;

    async fn set_total(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        total: Decimal,
    ) -> Result<(), AppError>;

    async fn set_artifact_paths(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        pdf_path: &str,
        qr_path: &str,
    ) -> Result<(), AppError>;

    async fn insert_line(&self, line: &InvoiceLine) -> Result<(), AppError>;

    async fn get_lines(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLine>, AppError>;

    /// Move every sent invoice past its due date to overdue and return the
    /// updated set. Invoices already overdue do not match, so a repeated
    /// sweep returns nothing new.
    async fn sweep_overdue(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError>;

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), AppError>;

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;

    async fn upsert_patient(&self, patient: &Patient) -> Result<(), AppError>;

    async fn get_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<Patient>, AppError>;
}
