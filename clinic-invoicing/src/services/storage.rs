//! Object storage for generated invoice artifacts.
//!
//! One fixed logical bucket holds every tenant's artifacts; isolation
//! comes from the deterministic key scheme, not separate buckets.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use clinic_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// Metadata attached to every stored artifact.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub content_type: &'static str,
}

/// Deterministic object key for an invoice's QR image. Other tooling
/// depends on this exact scheme.
pub fn qr_object_key(tenant_id: Uuid, invoice_id: Uuid) -> String {
    format!("{}/invoices/qr/{}.png", tenant_id, invoice_id)
}

/// Deterministic object key for an invoice's PDF document.
pub fn pdf_object_key(tenant_id: Uuid, invoice_id: Uuid) -> String {
    format!("{}/invoices/pdf/{}.pdf", tenant_id, invoice_id)
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>, meta: &ObjectMeta) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .await
                .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _meta: &ObjectMeta) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("Local upload failed: {}", e)))?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(key);
        let data = fs::read(path)
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("Local download failed: {}", e)))?;
        Ok(data)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.base_path.join(key).exists())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if path.exists() {
            fs::remove_file(path)
                .await
                .map_err(|e| AppError::StorageError(anyhow::anyhow!("Local delete failed: {}", e)))?;
        }
        Ok(())
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>, meta: &ObjectMeta) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(meta.content_type)
            .metadata("invoice-id", meta.invoice_id.to_string())
            .metadata("tenant-id", meta.tenant_id.to_string())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("S3 upload failed: {}", e)))?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("S3 download failed: {}", e)))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| {
                AppError::StorageError(anyhow::anyhow!("S3 body collection failed: {}", e))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::StorageError(anyhow::anyhow!(
                        "S3 head failed: {}",
                        service_err
                    )))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(anyhow::anyhow!("S3 delete failed: {}", e)))?;
        Ok(())
    }
}
