//! In-memory store used by tests and local development.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::error::AppError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::{Invoice, InvoiceLine, InvoiceStatus, Patient, Tenant, UpdateInvoice};

use super::InvoiceStore;

#[derive(Default)]
struct Inner {
    invoices: HashMap<Uuid, Invoice>,
    lines: Vec<InvoiceLine>,
    tenants: HashMap<Uuid, Tenant>,
    patients: HashMap<Uuid, Patient>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(invoice: &mut Invoice, input: &UpdateInvoice) {
    if let Some(number) = &input.number {
        invoice.number = number.clone();
    }
    if let Some(due_date) = input.due_date {
        invoice.due_date = due_date;
    }
    if let Some(notes) = &input.notes {
        invoice.notes = Some(notes.clone());
    }
    if let Some(address) = &input.billing_address {
        invoice.billing_line1 = Some(address.line1.clone());
        invoice.billing_line2 = address.line2.clone();
        invoice.billing_city = address.city.clone();
        invoice.billing_postal_code = address.postal_code.clone();
        invoice.billing_country = address.country.clone();
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        let duplicate = inner.invoices.values().any(|existing| {
            existing.tenant_id == invoice.tenant_id && existing.number == invoice.number
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number '{}' already exists for this tenant",
                invoice.number
            )));
        }
        inner.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let inner = self.inner.read().unwrap();
        let mut invoices: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let mut inner = self.inner.write().unwrap();
        match inner
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
        {
            Some(invoice) => {
                apply_update(invoice, input);
                Ok(Some(invoice.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.write().unwrap();
        let owned = inner
            .invoices
            .get(&invoice_id)
            .map(|invoice| invoice.tenant_id == tenant_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        inner.invoices.remove(&invoice_id);
        inner.lines.retain(|line| line.invoice_id != invoice_id);
        Ok(true)
    }

    async fn set_status(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
        expected: Option<InvoiceStatus>,
    ) -> Result<Option<Invoice>, AppError> {
        let mut inner = self.inner.write().unwrap();
        match inner
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .filter(|invoice| {
                expected
                    .map(|exp| invoice.status == exp.as_str())
                    .unwrap_or(true)
            }) {
            Some(invoice) => {
                invoice.status = status.as_str().to_string();
                Ok(Some(invoice.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_total(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        total: Decimal,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(invoice) = inner
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
        {
            invoice.total = total;
        }
        Ok(())
    }

    async fn set_artifact_paths(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        pdf_path: &str,
        qr_path: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(invoice) = inner
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
        {
            invoice.pdf_path = Some(pdf_path.to_string());
            invoice.qr_path = Some(qr_path.to_string());
        }
        Ok(())
    }

    async fn insert_line(&self, line: &InvoiceLine) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        inner.lines.push(line.clone());
        Ok(())
    }

    async fn get_lines(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLine>, AppError> {
        let inner = self.inner.read().unwrap();
        let mut lines: Vec<InvoiceLine> = inner
            .lines
            .iter()
            .filter(|line| line.tenant_id == tenant_id && line.invoice_id == invoice_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(lines)
    }

    async fn sweep_overdue(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let mut inner = self.inner.write().unwrap();
        let mut updated = Vec::new();
        for invoice in inner.invoices.values_mut() {
            if invoice.tenant_id == tenant_id
                && invoice.status == InvoiceStatus::Sent.as_str()
                && invoice.due_date < today
            {
                invoice.status = InvoiceStatus::Overdue.as_str().to_string();
                updated.push(invoice.clone());
            }
        }
        updated.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(updated)
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        inner.tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.tenants.get(&tenant_id).cloned())
    }

    async fn upsert_patient(&self, patient: &Patient) -> Result<(), AppError> {
        let mut inner = self.inner.write().unwrap();
        inner.patients.insert(patient.patient_id, patient.clone());
        Ok(())
    }

    async fn get_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<Patient>, AppError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .patients
            .get(&patient_id)
            .filter(|patient| patient.tenant_id == tenant_id)
            .cloned())
    }
}
