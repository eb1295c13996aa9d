//! Invoicing orchestrator: the facade consumed by the HTTP layer.
//!
//! Owns the line ledger, the status transitions, the PDF/QR pipeline and
//! the object-store cleanup of superseded artifacts. Every operation is
//! tenant-scoped; cross-tenant access is structurally impossible here.

use chrono::Utc;
use clinic_core::error::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    compute_line_amounts, default_due_date, generate_invoice_number, CreateInvoice,
    CreateInvoiceLine, Invoice, InvoiceLine, InvoiceStatus, Patient, UpdateInvoice,
};
use crate::repository::InvoiceStore;
use crate::services::events::{EventBus, InvoiceEvent};
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_TOTAL, PDF_RENDER_DURATION};
use crate::services::pdf::{render_facture, RenderContext};
use crate::services::qr::{encode_png, QrPayload};
use crate::services::storage::{pdf_object_key, qr_object_key, ObjectMeta, Storage};

/// An invoice with its owned lines and the referenced patient record.
#[derive(Debug, Clone)]
pub struct InvoiceWithRelations {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub patient: Option<Patient>,
}

#[derive(Clone)]
pub struct InvoicingService {
    store: Arc<dyn InvoiceStore>,
    storage: Arc<dyn Storage>,
    events: EventBus,
}

impl InvoicingService {
    pub fn new(store: Arc<dyn InvoiceStore>, storage: Arc<dyn Storage>, events: EventBus) -> Self {
        Self {
            store,
            storage,
            events,
        }
    }

    /// Create and persist a draft invoice. The number defaults to a
    /// time-derived value and the due date to issue date + 30 days.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id))]
    pub async fn create_draft(
        &self,
        tenant_id: Uuid,
        input: CreateInvoice,
    ) -> Result<Invoice, AppError> {
        let now = Utc::now();
        let issue_date = input.issue_date.unwrap_or_else(|| now.date_naive());
        let due_date = input.due_date.unwrap_or_else(|| default_due_date(issue_date));
        let number = input
            .number
            .filter(|number| !number.trim().is_empty())
            .unwrap_or_else(|| generate_invoice_number(now));

        let address = input.billing_address;
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id,
            number,
            status: InvoiceStatus::Draft.as_str().to_string(),
            issue_date,
            due_date,
            total: Decimal::ZERO,
            notes: input.notes,
            billing_line1: address.as_ref().map(|a| a.line1.clone()),
            billing_line2: address.as_ref().and_then(|a| a.line2.clone()),
            billing_city: address.as_ref().and_then(|a| a.city.clone()),
            billing_postal_code: address.as_ref().and_then(|a| a.postal_code.clone()),
            billing_country: address.as_ref().and_then(|a| a.country.clone()),
            patient_id: input.patient_id,
            encounter_id: input.encounter_id,
            pdf_path: None,
            qr_path: None,
            created_utc: now,
        };

        self.store.insert_invoice(&invoice).await?;
        INVOICES_TOTAL.with_label_values(&["draft"]).inc();

        Ok(invoice)
    }

    /// Append a billable line to a draft invoice, then recompute and
    /// persist the invoice total.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, invoice_id = %input.invoice_id))]
    pub async fn add_line(
        &self,
        tenant_id: Uuid,
        input: CreateInvoiceLine,
    ) -> Result<InvoiceWithRelations, AppError> {
        if input.quantity <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quantity must be positive"
            )));
        }
        if input.unit_price < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unit price cannot be negative"
            )));
        }
        let hundred = Decimal::from(100);
        if input.third_party_rate < Decimal::ZERO || input.third_party_rate > hundred {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Third-party rate must be between 0 and 100"
            )));
        }
        if input.tax_rate < Decimal::ZERO || input.tax_rate > hundred {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tax rate must be between 0 and 100"
            )));
        }

        let invoice = self
            .store
            .get_invoice(tenant_id, input.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if invoice.status != InvoiceStatus::Draft.as_str() {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Cannot add lines to a non-draft invoice"
            )));
        }

        let amounts = compute_line_amounts(
            input.quantity,
            input.unit_price,
            input.third_party_rate,
            input.tax_rate,
        );
        let line = InvoiceLine {
            line_id: Uuid::new_v4(),
            invoice_id: invoice.invoice_id,
            tenant_id,
            description: input.description,
            quantity: input.quantity,
            unit_price: input.unit_price,
            third_party_rate: input.third_party_rate,
            tax_rate: input.tax_rate,
            amount: amounts.amount,
            created_utc: Utc::now(),
        };
        self.store.insert_line(&line).await?;

        self.recalculate_total(tenant_id, invoice.invoice_id).await?;

        self.find_one(tenant_id, invoice.invoice_id).await
    }

    /// Recompute the invoice total from the raw line values and persist
    /// it. Tolerates zero lines (total = 0).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn recalculate_total(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let lines = self.store.get_lines(tenant_id, invoice_id).await?;
        let total: Decimal = lines
            .iter()
            .map(|line| {
                compute_line_amounts(
                    line.quantity,
                    line.unit_price,
                    line.third_party_rate,
                    line.tax_rate,
                )
                .amount
            })
            .sum();

        self.store.set_total(tenant_id, invoice_id, total).await?;

        Ok(total)
    }

    /// Transition a draft invoice to sent and publish `invoice.sent`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn send(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if invoice.status != InvoiceStatus::Draft.as_str() {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Only draft invoices can be sent"
            )));
        }

        let lines = self.store.get_lines(tenant_id, invoice_id).await?;
        if lines.is_empty() {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Cannot send an invoice without lines"
            )));
        }

        let sent = self
            .store
            .set_status(
                tenant_id,
                invoice_id,
                InvoiceStatus::Sent,
                Some(InvoiceStatus::Draft),
            )
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(anyhow::anyhow!("Only draft invoices can be sent"))
            })?;

        INVOICES_TOTAL.with_label_values(&["sent"]).inc();
        info!(number = %sent.number, "Invoice sent");

        self.events.publish(InvoiceEvent::Sent(sent.clone()));

        Ok(sent)
    }

    /// Set the invoice to paid. No prior-status guard: paid is reachable
    /// from any status, including draft.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn mark_paid(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let paid = self
            .store
            .set_status(tenant_id, invoice_id, InvoiceStatus::Paid, None)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        INVOICES_TOTAL.with_label_values(&["paid"]).inc();
        info!(number = %paid.number, "Invoice marked paid");

        Ok(paid)
    }

    /// Overdue sweep: every sent invoice past its due date becomes
    /// overdue. Re-running is a no-op until new invoices fall due.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn remind_overdue(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let today = Utc::now().date_naive();
        let overdue = self.store.sweep_overdue(tenant_id, today).await?;

        if !overdue.is_empty() {
            INVOICES_TOTAL
                .with_label_values(&["overdue"])
                .inc_by(overdue.len() as f64);
            info!(count = overdue.len(), "Invoices moved to overdue");
        }

        Ok(overdue)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn find_all(&self, tenant_id: Uuid) -> Result<Vec<InvoiceWithRelations>, AppError> {
        let invoices = self.store.list_invoices(tenant_id).await?;
        let mut out = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            out.push(self.attach_relations(tenant_id, invoice).await?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn find_one(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceWithRelations, AppError> {
        let invoice = self
            .store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        self.attach_relations(tenant_id, invoice).await
    }

    async fn attach_relations(
        &self,
        tenant_id: Uuid,
        invoice: Invoice,
    ) -> Result<InvoiceWithRelations, AppError> {
        let lines = self.store.get_lines(tenant_id, invoice.invoice_id).await?;
        let patient = match invoice.patient_id {
            Some(patient_id) => self.store.get_patient(tenant_id, patient_id).await?,
            None => None,
        };
        Ok(InvoiceWithRelations {
            invoice,
            lines,
            patient,
        })
    }

    /// Generic field update; peripheral CRUD, not a state transition.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn update(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: UpdateInvoice,
    ) -> Result<Invoice, AppError> {
        self.store
            .update_invoice(tenant_id, invoice_id, &input)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    /// Peripheral delete; owned lines cascade with the invoice.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn delete(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<(), AppError> {
        let deleted = self.store.delete_invoice(tenant_id, invoice_id).await?;
        if !deleted {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }
        Ok(())
    }

    /// Regenerate both artifacts and update the stored paths. The invoice
    /// record is only touched after both uploads succeed; superseded
    /// objects are removed best-effort afterwards.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn generate_pdf(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut invoice = self
            .store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let lines = self.store.get_lines(tenant_id, invoice_id).await?;
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;
        let patient = match invoice.patient_id {
            Some(patient_id) => self.store.get_patient(tenant_id, patient_id).await?,
            None => None,
        };

        let generated_at = Utc::now();
        let payload = QrPayload::for_invoice(&invoice, generated_at);
        let qr_png = encode_png(&payload)?;

        let timer = PDF_RENDER_DURATION.start_timer();
        let pdf_bytes = render_facture(&RenderContext {
            invoice: &invoice,
            lines: &lines,
            tenant: &tenant,
            patient: patient.as_ref(),
            qr_png: &qr_png,
            generated_at,
        })?;
        timer.observe_duration();

        let qr_key = qr_object_key(tenant_id, invoice_id);
        let pdf_key = pdf_object_key(tenant_id, invoice_id);

        self.storage
            .upload(
                &qr_key,
                qr_png,
                &ObjectMeta {
                    invoice_id,
                    tenant_id,
                    content_type: "image/png",
                },
            )
            .await?;
        self.storage
            .upload(
                &pdf_key,
                pdf_bytes,
                &ObjectMeta {
                    invoice_id,
                    tenant_id,
                    content_type: "application/pdf",
                },
            )
            .await?;

        // Both uploads succeeded; superseded objects (if stored under
        // other keys) can now go. Cleanup failures are logged, never fatal.
        self.remove_superseded(invoice.pdf_path.as_deref(), &pdf_key)
            .await;
        self.remove_superseded(invoice.qr_path.as_deref(), &qr_key)
            .await;

        self.store
            .set_artifact_paths(tenant_id, invoice_id, &pdf_key, &qr_key)
            .await?;

        invoice.pdf_path = Some(pdf_key);
        invoice.qr_path = Some(qr_key);

        info!(number = %invoice.number, "Invoice artifacts regenerated");

        Ok(invoice)
    }

    async fn remove_superseded(&self, old_key: Option<&str>, new_key: &str) {
        let Some(old_key) = old_key else {
            return;
        };
        if old_key == new_key {
            return;
        }
        // Probe first: a previous partial failure may have left no object.
        let result = match self.storage.exists(old_key).await {
            Ok(true) => self.storage.delete(old_key).await,
            Ok(false) => return,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            ERRORS_TOTAL.with_label_values(&["artifact_cleanup"]).inc();
            warn!(key = old_key, error = %err, "Failed to remove superseded artifact");
        }
    }

    /// Return the PDF bytes, generating the artifacts first if the
    /// invoice has never had a PDF.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn download_pdf(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(Invoice, Vec<u8>), AppError> {
        let invoice = self
            .store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let invoice = if invoice.pdf_path.is_none() {
            self.generate_pdf(tenant_id, invoice_id).await?
        } else {
            invoice
        };

        let pdf_path = invoice.pdf_path.clone().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Invoice has no stored PDF after generation"))
        })?;
        let bytes = self.storage.download(&pdf_path).await?;

        Ok((invoice, bytes))
    }
}
