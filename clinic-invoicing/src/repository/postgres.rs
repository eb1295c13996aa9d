//! PostgreSQL store for clinic-invoicing.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Invoice, InvoiceLine, InvoiceStatus, Patient, Tenant, UpdateInvoice};
use crate::services::metrics::DB_QUERY_DURATION;

use super::InvoiceStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "clinic-invoicing"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(tenant_id = %invoice.tenant_id, invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                patient_id, encounter_id, pdf_path, qr_path, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.tenant_id)
        .bind(&invoice.number)
        .bind(&invoice.status)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.total)
        .bind(&invoice.notes)
        .bind(&invoice.billing_line1)
        .bind(&invoice.billing_line2)
        .bind(&invoice.billing_city)
        .bind(&invoice.billing_postal_code)
        .bind(&invoice.billing_country)
        .bind(invoice.patient_id)
        .bind(invoice.encounter_id)
        .bind(&invoice.pdf_path)
        .bind(&invoice.qr_path)
        .bind(invoice.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number '{}' already exists for this tenant",
                    invoice.number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e)),
        })?;

        timer.observe_duration();

        info!(number = %invoice.number, "Invoice created");

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                patient_id, encounter_id, pdf_path, qr_path, created_utc
            FROM invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_invoices(&self, tenant_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                patient_id, encounter_id, pdf_path, qr_path, created_utc
            FROM invoices
            WHERE tenant_id = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let address = input.billing_address.as_ref();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET number = COALESCE($3, number),
                due_date = COALESCE($4, due_date),
                notes = COALESCE($5, notes),
                billing_line1 = COALESCE($6, billing_line1),
                billing_line2 = COALESCE($7, billing_line2),
                billing_city = COALESCE($8, billing_city),
                billing_postal_code = COALESCE($9, billing_postal_code),
                billing_country = COALESCE($10, billing_country)
            WHERE tenant_id = $1 AND invoice_id = $2
            RETURNING invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                patient_id, encounter_id, pdf_path, qr_path, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(&input.number)
        .bind(input.due_date)
        .bind(&input.notes)
        .bind(address.map(|a| a.line1.clone()))
        .bind(address.and_then(|a| a.line2.clone()))
        .bind(address.and_then(|a| a.city.clone()))
        .bind(address.and_then(|a| a.postal_code.clone()))
        .bind(address.and_then(|a| a.country.clone()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Invoice deleted");
        }

        Ok(deleted)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id, status = status.as_str()))]
    async fn set_status(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
        expected: Option<InvoiceStatus>,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_status"])
            .start_timer();

        let invoice = if let Some(expected) = expected {
            sqlx::query_as::<_, Invoice>(
                r#"
                UPDATE invoices
                SET status = $3
                WHERE tenant_id = $1 AND invoice_id = $2 AND status = $4
                RETURNING invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                    billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                    patient_id, encounter_id, pdf_path, qr_path, created_utc
                "#,
            )
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(status.as_str())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Invoice>(
                r#"
                UPDATE invoices
                SET status = $3
                WHERE tenant_id = $1 AND invoice_id = $2
                RETURNING invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                    billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                    patient_id, encounter_id, pdf_path, qr_path, created_utc
                "#,
            )
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set status: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn set_total(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        total: Decimal,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_total"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoices
            SET total = $3
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(total)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set total: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn set_artifact_paths(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        pdf_path: &str,
        qr_path: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_artifact_paths"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoices
            SET pdf_path = $3, qr_path = $4
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(pdf_path)
        .bind(qr_path)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set artifact paths: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, line), fields(tenant_id = %line.tenant_id, invoice_id = %line.invoice_id))]
    async fn insert_line(&self, line: &InvoiceLine) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_line"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                line_id, invoice_id, tenant_id, description, quantity, unit_price,
                third_party_rate, tax_rate, amount, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(line.line_id)
        .bind(line.invoice_id)
        .bind(line.tenant_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.third_party_rate)
        .bind(line.tax_rate)
        .bind(line.amount)
        .bind(line.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert line: {}", e)))?;

        timer.observe_duration();

        info!(line_id = %line.line_id, "Invoice line added");

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn get_lines(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, InvoiceLine>(
            r#"
            SELECT line_id, invoice_id, tenant_id, description, quantity, unit_price,
                third_party_rate, tax_rate, amount, created_utc
            FROM invoice_lines
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_utc, line_id
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get lines: {}", e)))?;

        timer.observe_duration();

        Ok(lines)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn sweep_overdue(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sweep_overdue"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'overdue'
            WHERE tenant_id = $1 AND status = 'sent' AND due_date < $2
            RETURNING invoice_id, tenant_id, number, status, issue_date, due_date, total, notes,
                billing_line1, billing_line2, billing_city, billing_postal_code, billing_country,
                patient_id, encounter_id, pdf_path, qr_path, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to sweep overdue invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.tenant_id))]
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, name, created_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.name)
        .bind(tenant.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert tenant: {}", e)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT tenant_id, name, created_utc
            FROM tenants
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tenant: {}", e)))?;

        Ok(tenant)
    }

    #[instrument(skip(self, patient), fields(tenant_id = %patient.tenant_id, patient_id = %patient.patient_id))]
    async fn upsert_patient(&self, patient: &Patient) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO patients (patient_id, tenant_id, first_name, last_name, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (patient_id) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
            "#,
        )
        .bind(patient.patient_id)
        .bind(patient.tenant_id)
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(patient.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert patient: {}", e)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, patient_id = %patient_id))]
    async fn get_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<Patient>, AppError> {
        let patient = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, tenant_id, first_name, last_name, created_utc
            FROM patients
            WHERE tenant_id = $1 AND patient_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get patient: {}", e)))?;

        Ok(patient)
    }
}
