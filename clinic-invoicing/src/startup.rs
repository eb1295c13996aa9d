use crate::config::{DatabaseBackend, InvoicingConfig, StorageBackend};
use crate::handlers;
use crate::repository::{InvoiceStore, MemoryStore, PgStore};
use crate::services::{spawn_audit_logger, EventBus, InvoicingService, LocalStorage, S3Storage, Storage};
use axum::{
    routing::{get, post},
    Router,
};
use clinic_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: InvoicingConfig,
    pub store: Arc<dyn InvoiceStore>,
    pub storage: Arc<dyn Storage>,
    pub invoicing: InvoicingService,
    pub events: EventBus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/invoices",
            post(handlers::create_invoice).get(handlers::list_invoices),
        )
        .route("/invoices/line", post(handlers::add_line))
        .route("/invoices/send", post(handlers::send_invoice))
        .route("/invoices/mark-paid", post(handlers::mark_paid))
        .route("/invoices/remind-overdue", post(handlers::remind_overdue))
        .route(
            "/invoices/:id",
            get(handlers::get_invoice)
                .patch(handlers::update_invoice)
                .delete(handlers::delete_invoice),
        )
        .route("/invoices/:id/send", post(handlers::send_invoice_by_id))
        .route("/invoices/:id/download/pdf", get(handlers::download_pdf))
        .route("/invoices/:id/regenerate-pdf", post(handlers::regenerate_pdf))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let store: Arc<dyn InvoiceStore> = match config.database.backend {
            DatabaseBackend::Postgres => {
                let url = config.database.url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "DATABASE_URL is required for the postgres backend"
                    ))
                })?;
                let store = PgStore::connect(
                    url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await?;
                store.run_migrations().await?;
                Arc::new(store)
            }
            DatabaseBackend::Memory => {
                tracing::warn!("Using the in-memory store; data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let storage: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Local => {
                let path = config.storage.local_path.clone().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "STORAGE_LOCAL_PATH is required for the local backend"
                    ))
                })?;
                Arc::new(LocalStorage::new(path).await?)
            }
            StorageBackend::S3 => {
                let bucket = config.storage.s3_bucket.clone().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "STORAGE_S3_BUCKET is required for the s3 backend"
                    ))
                })?;
                let aws_config =
                    aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
                let client = aws_sdk_s3::Client::new(&aws_config);
                Arc::new(S3Storage::new(client, bucket))
            }
        };

        let events = EventBus::default();
        spawn_audit_logger(&events);

        let invoicing = InvoicingService::new(store.clone(), storage.clone(), events.clone());

        let state = AppState {
            config: config.clone(),
            store,
            storage,
            invoicing,
            events,
        };

        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> Arc<dyn InvoiceStore> {
        self.state.store.clone()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.state.storage.clone()
    }

    pub fn events(&self) -> EventBus {
        self.state.events.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
