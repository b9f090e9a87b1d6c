//! Application startup and lifecycle management.

use crate::config::InvoicingConfig;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{
    init_metrics, Database, DocumentGenerator, InvoiceService, InvoiceSettings, LocalStorage,
    PdfDocumentGenerator, Storage,
};
use axum::{
    body::Body,
    http::Request,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoicingConfig,
    pub db: Database,
    pub invoices: Arc<InvoiceService>,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(
        config: InvoicingConfig,
        db: Database,
        storage: Arc<dyn Storage>,
        documents: Arc<dyn DocumentGenerator>,
    ) -> Self {
        let invoices = Arc::new(InvoiceService::new(
            db.clone(),
            documents,
            InvoiceSettings::from(&config),
        ));
        Self {
            config,
            db,
            invoices,
            storage,
        }
    }
}

/// HTTP routes with the shared middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/invoices", post(handlers::create_invoice))
        .route("/api/invoices/:id", get(handlers::get_invoice))
        .route("/api/invoices/:id/pdf", get(handlers::download_invoice_pdf))
        .route(
            "/api/products/:id/stock-movements",
            get(handlers::list_stock_movements),
        )
        .layer(from_fn(http_metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true, None).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: InvoicingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false, None).await
    }

    /// Build with a custom document generator in place of the PDF renderer.
    pub async fn build_with_document_generator(
        config: InvoicingConfig,
        documents: Arc<dyn DocumentGenerator>,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, false, Some(documents)).await
    }

    async fn build_internal(
        config: InvoicingConfig,
        run_migrations: bool,
        documents: Option<Arc<dyn DocumentGenerator>>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(&config.documents.storage_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        path = %config.documents.storage_path,
                        error = %e,
                        "Failed to initialize document storage"
                    );
                    e
                })?,
        );

        let documents = documents
            .unwrap_or_else(|| Arc::new(PdfDocumentGenerator::new(storage.clone())));

        let state = AppState::new(config.clone(), db, storage, documents);

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "GST invoicing service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
