//! Tenant context middleware for multi-tenancy support.
//!
//! Extracts the tenant id from the `X-Tenant-ID` request header, set by
//! the authenticating layer in front of this service. Every repository
//! query is additionally scoped by this id, so a bad header can at worst
//! reach an empty partition.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use clinic_core::error::AppError;
use uuid::Uuid;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-Tenant-ID header"))
            })?;

        let tenant_id = raw.parse::<Uuid>().map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid X-Tenant-ID header"))
        })?;

        // Add to tracing span for observability
        let span = tracing::Span::current();
        span.record("tenant_id", raw);

        Ok(TenantContext { tenant_id })
    }
}
