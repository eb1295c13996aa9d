//! QR authentication payload for generated factures.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::error::AppError;
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Cursor;
use uuid::Uuid;

use crate::models::Invoice;

/// Verification payload embedded in the QR code. A content snapshot the
/// recipient can compare against the system record; not a signature.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub patient_id: Option<Uuid>,
    pub total: Decimal,
    pub issue_date: NaiveDate,
    /// Generation time, distinct from the issue date.
    pub timestamp: DateTime<Utc>,
}

impl QrPayload {
    pub fn for_invoice(invoice: &Invoice, generated_at: DateTime<Utc>) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.number.clone(),
            patient_id: invoice.patient_id,
            total: invoice.total,
            issue_date: invoice.issue_date,
            timestamp: generated_at,
        }
    }
}

/// Serialize the payload and encode it into a scannable PNG buffer.
pub fn encode_png(payload: &QrPayload) -> Result<Vec<u8>, AppError> {
    let json = serde_json::to_string(payload)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("QR payload failed: {}", e)))?;

    let code = QrCode::new(json.as_bytes())
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("QR encoding failed: {}", e)))?;
    let image = code.render::<Luma<u8>>().build();

    let dynamic_image = DynamicImage::ImageLuma8(image);
    let mut buffer = Cursor::new(Vec::new());
    dynamic_image
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("QR image write failed: {}", e)))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QrPayload {
        QrPayload {
            invoice_id: Uuid::new_v4(),
            invoice_number: "F-20260115120000-abc123".to_string(),
            patient_id: Some(Uuid::new_v4()),
            total: "264".parse().unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let json = serde_json::to_string(&payload()).unwrap();
        for key in [
            "invoiceId",
            "invoiceNumber",
            "patientId",
            "total",
            "issueDate",
            "timestamp",
        ] {
            assert!(json.contains(key), "missing key {} in {}", key, json);
        }
    }

    #[test]
    fn encode_png_produces_a_png_buffer() {
        let png = encode_png(&payload()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
