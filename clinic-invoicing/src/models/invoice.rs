//! Invoice model for clinic-invoicing.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status. `partially_paid` and `cancelled` are representable but
/// never produced by the lifecycle operations themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    PartiallyPaid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "paid" => InvoiceStatus::Paid,
            "partially_paid" => InvoiceStatus::PartiallyPaid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }

    /// French label printed on the facture document.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Brouillon",
            InvoiceStatus::Sent => "Envoyée",
            InvoiceStatus::Paid => "Payée",
            InvoiceStatus::PartiallyPaid => "Partiellement payée",
            InvoiceStatus::Overdue => "En retard",
            InvoiceStatus::Cancelled => "Annulée",
        }
    }
}

/// Invoice record. `total` is authoritative only after recalculation from
/// the owned lines; it is never written directly by callers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub number: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub notes: Option<String>,
    pub billing_line1: Option<String>,
    pub billing_line2: Option<String>,
    pub billing_city: Option<String>,
    pub billing_postal_code: Option<String>,
    pub billing_country: Option<String>,
    pub patient_id: Option<Uuid>,
    pub encounter_id: Option<Uuid>,
    pub pdf_path: Option<String>,
    pub qr_path: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Structured billing address, stored flattened on the invoice row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone, Default)]
pub struct CreateInvoice {
    pub patient_id: Option<Uuid>,
    pub number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub encounter_id: Option<Uuid>,
    pub billing_address: Option<BillingAddress>,
    pub notes: Option<String>,
}

/// Input for the generic field update (peripheral CRUD, draft or not).
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub number: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub billing_address: Option<BillingAddress>,
}

impl Invoice {
    pub fn billing_address(&self) -> Option<BillingAddress> {
        self.billing_line1.as_ref().map(|line1| BillingAddress {
            line1: line1.clone(),
            line2: self.billing_line2.clone(),
            city: self.billing_city.clone(),
            postal_code: self.billing_postal_code.clone(),
            country: self.billing_country.clone(),
        })
    }
}

/// Time-derived invoice number with a random tail so two drafts created
/// within the same second still get distinct numbers.
pub fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let tail = Uuid::new_v4().simple().to_string();
    format!("F-{}-{}", now.format("%Y%m%d%H%M%S"), &tail[..6])
}

/// Payment terms: due 30 days after issue unless the caller says otherwise.
pub fn default_due_date(issue_date: NaiveDate) -> NaiveDate {
    issue_date + Duration::days(30)
}
