//! Request/response DTOs for the invoice endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{BillingAddress, CreateInvoice, CreateInvoiceLine, UpdateInvoice};
use crate::models::{Invoice, InvoiceLine, Patient};
use crate::services::InvoiceWithRelations;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BillingAddressDto {
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<BillingAddressDto> for BillingAddress {
    fn from(dto: BillingAddressDto) -> Self {
        BillingAddress {
            line1: dto.line1,
            line2: dto.line2,
            city: dto.city,
            postal_code: dto.postal_code,
            country: dto.country,
        }
    }
}

impl From<BillingAddress> for BillingAddressDto {
    fn from(address: BillingAddress) -> Self {
        BillingAddressDto {
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            postal_code: address.postal_code,
            country: address.country,
        }
    }
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct CreateInvoiceRequest {
    pub patient_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub encounter_id: Option<Uuid>,
    pub billing_address: Option<BillingAddressDto>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<CreateInvoiceRequest> for CreateInvoice {
    fn from(request: CreateInvoiceRequest) -> Self {
        CreateInvoice {
            patient_id: request.patient_id,
            number: request.number,
            issue_date: request.issue_date,
            due_date: request.due_date,
            encounter_id: request.encounter_id,
            billing_address: request.billing_address.map(Into::into),
            notes: request.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineRequest {
    pub invoice_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub third_party_rate: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
}

impl From<AddLineRequest> for CreateInvoiceLine {
    fn from(request: AddLineRequest) -> Self {
        CreateInvoiceLine {
            invoice_id: request.invoice_id,
            description: request.description,
            quantity: request.quantity,
            unit_price: request.unit_price,
            third_party_rate: request.third_party_rate,
            tax_rate: request.tax_rate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InvoiceIdRequest {
    pub invoice_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateInvoiceRequest {
    #[validate(length(min = 1, max = 64))]
    pub number: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub billing_address: Option<BillingAddressDto>,
}

impl From<UpdateInvoiceRequest> for UpdateInvoice {
    fn from(request: UpdateInvoiceRequest) -> Self {
        UpdateInvoice {
            number: request.number,
            due_date: request.due_date,
            notes: request.notes,
            billing_address: request.billing_address.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceLineResponse {
    pub line_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub third_party_rate: Decimal,
    pub tax_rate: Decimal,
    pub amount: Decimal,
}

impl From<InvoiceLine> for InvoiceLineResponse {
    fn from(line: InvoiceLine) -> Self {
        InvoiceLineResponse {
            line_id: line.line_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            third_party_rate: line.third_party_rate,
            tax_rate: line.tax_rate,
            amount: line.amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatientResponse {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl From<Patient> for PatientResponse {
    fn from(patient: Patient) -> Self {
        PatientResponse {
            patient_id: patient.patient_id,
            first_name: patient.first_name,
            last_name: patient.last_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub number: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub notes: Option<String>,
    pub billing_address: Option<BillingAddressDto>,
    pub patient_id: Option<Uuid>,
    pub encounter_id: Option<Uuid>,
    pub pdf_path: Option<String>,
    pub qr_path: Option<String>,
    pub created_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<InvoiceLineResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientResponse>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        let billing_address = invoice.billing_address().map(Into::into);
        InvoiceResponse {
            invoice_id: invoice.invoice_id,
            tenant_id: invoice.tenant_id,
            number: invoice.number,
            status: invoice.status,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            total: invoice.total,
            notes: invoice.notes,
            billing_address,
            patient_id: invoice.patient_id,
            encounter_id: invoice.encounter_id,
            pdf_path: invoice.pdf_path,
            qr_path: invoice.qr_path,
            created_utc: invoice.created_utc,
            lines: None,
            patient: None,
        }
    }
}

impl From<InvoiceWithRelations> for InvoiceResponse {
    fn from(full: InvoiceWithRelations) -> Self {
        let mut response = InvoiceResponse::from(full.invoice);
        response.lines = Some(full.lines.into_iter().map(Into::into).collect());
        response.patient = full.patient.map(Into::into);
        response
    }
}
