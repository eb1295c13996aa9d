use chrono::Utc;
use clinic_core::config::Config as CoreConfig;
use clinic_invoicing::config::{
    DatabaseBackend, DatabaseConfig, InvoicingConfig, StorageBackend, StorageConfig,
};
use clinic_invoicing::models::{Patient, Tenant};
use clinic_invoicing::repository::InvoiceStore;
use clinic_invoicing::services::{EventBus, Storage};
use clinic_invoicing::startup::Application;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub store: Arc<dyn InvoiceStore>,
    pub storage: Arc<dyn Storage>,
    pub events: EventBus,
    pub client: reqwest::Client,
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let storage_dir = tempfile::tempdir().expect("Failed to create temp storage dir");

        let config = InvoicingConfig {
            common: CoreConfig { port: 0 },
            database: DatabaseConfig {
                backend: DatabaseBackend::Memory,
                url: None,
                max_connections: 5,
                min_connections: 1,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_path: Some(storage_dir.path().to_string_lossy().into_owned()),
                s3_bucket: None,
                s3_region: None,
            },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let store = app.store();
        let storage = app.storage();
        let events = app.events();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        // Seed the tenant and a patient this service reads
        let tenant_id = Uuid::new_v4();
        store
            .upsert_tenant(&Tenant {
                tenant_id,
                name: "Cabinet Santé Plus".to_string(),
                created_utc: Utc::now(),
            })
            .await
            .expect("Failed to seed tenant");

        let patient_id = Uuid::new_v4();
        store
            .upsert_patient(&Patient {
                patient_id,
                tenant_id,
                first_name: "Claire".to_string(),
                last_name: "Moreau".to_string(),
                created_utc: Utc::now(),
            })
            .await
            .expect("Failed to seed patient");

        TestApp {
            address,
            tenant_id,
            patient_id,
            store,
            storage,
            events,
            client,
            _storage_dir: storage_dir,
        }
    }

    pub async fn post_as(&self, tenant_id: Uuid, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", tenant_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.post_as(self.tenant_id, path, body).await
    }

    pub async fn get_as(&self, tenant_id: Uuid, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", tenant_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.get_as(self.tenant_id, path).await
    }

    /// Create a draft invoice for the seeded patient and return it.
    pub async fn create_draft(&self) -> Value {
        let response = self
            .post("/invoices", json!({ "patient_id": self.patient_id }))
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.expect("Invalid invoice response")
    }

    /// Append a line and return the updated invoice with lines.
    pub async fn add_line(
        &self,
        invoice_id: &str,
        description: &str,
        quantity: &str,
        unit_price: &str,
        third_party_rate: &str,
        tax_rate: &str,
    ) -> Value {
        let response = self
            .post(
                "/invoices/line",
                json!({
                    "invoice_id": invoice_id,
                    "description": description,
                    "quantity": quantity,
                    "unit_price": unit_price,
                    "third_party_rate": third_party_rate,
                    "tax_rate": tax_rate,
                }),
            )
            .await;
        assert_eq!(response.status(), 200);
        response.json().await.expect("Invalid invoice response")
    }
}

/// Parse a decimal field serialized as a JSON string.
pub fn dec(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {}", value))
        .parse()
        .expect("invalid decimal")
}
