//! REST handlers for the invoice endpoints.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use clinic_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    AddLineRequest, CreateInvoiceRequest, InvoiceIdRequest, InvoiceResponse, UpdateInvoiceRequest,
};
use crate::middleware::TenantContext;
use crate::startup::AppState;

pub async fn create_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let invoice = state
        .invoicing
        .create_draft(tenant.tenant_id, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

pub async fn add_line(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<AddLineRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let invoice = state
        .invoicing
        .add_line(tenant.tenant_id, payload.into())
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn send_invoice_by_id(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoicing.send(tenant.tenant_id, invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn send_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<InvoiceIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .invoicing
        .send(tenant.tenant_id, payload.invoice_id)
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<InvoiceIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .invoicing
        .mark_paid(tenant.tenant_id, payload.invoice_id)
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn remind_overdue(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.invoicing.remind_overdue(tenant.tenant_id).await?;
    let responses: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.invoicing.find_all(tenant.tenant_id).await?;
    let responses: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoicing.find_one(tenant.tenant_id, invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let invoice = state
        .invoicing
        .update(tenant.tenant_id, invoice_id, payload.into())
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.invoicing.delete(tenant.tenant_id, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_pdf(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, bytes) = state
        .invoicing
        .download_pdf(tenant.tenant_id, invoice_id)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"facture-{}.pdf\"", invoice.number),
            ),
        ],
        bytes,
    ))
}

pub async fn regenerate_pdf(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .invoicing
        .generate_pdf(tenant.tenant_id, invoice_id)
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}
