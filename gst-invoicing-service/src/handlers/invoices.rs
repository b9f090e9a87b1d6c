use crate::dtos::{CreateInvoiceRequest, CreateInvoiceResponse};
use crate::error::InvoiceError;
use crate::services::documents::storage_key;
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::DocumentOutcome;
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn create_invoice(
    State(state): State<AppState>,
    payload: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, InvoiceError> {
    let Json(request) = payload.map_err(|rejection| {
        INVOICES_TOTAL.with_label_values(&["validation_error"]).inc();
        InvoiceError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let created = state.invoices.create_invoice(request).await?;

    let (message, pdf_url, pdf_error) = match created.document {
        DocumentOutcome::Stored { .. } => (
            "Invoice created successfully",
            Some(format!("/api/invoices/{}/pdf", created.invoice_id)),
            None,
        ),
        DocumentOutcome::Failed { reason } => (
            "Invoice created successfully, but PDF generation failed",
            None,
            Some(reason),
        ),
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateInvoiceResponse {
            success: true,
            message: message.to_string(),
            invoice_id: created.invoice_id,
            invoice_number: created.invoice_number,
            pdf_url,
            pdf_error,
        }),
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<impl IntoResponse, InvoiceError> {
    let invoice = state
        .db
        .get_invoice_with_items(invoice_id)
        .await?
        .ok_or_else(|| InvoiceError::NotFound(format!("Invoice {}", invoice_id)))?;

    Ok(Json(invoice))
}

pub async fn download_invoice_pdf(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<impl IntoResponse, InvoiceError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| InvoiceError::NotFound(format!("Invoice {}", invoice_id)))?;

    let key = storage_key(invoice.invoice_number.as_deref(), invoice_id);
    let data = state.storage.download(&key).await.map_err(|e| match e {
        AppError::NotFound(_) => {
            InvoiceError::NotFound(format!("Document for invoice {}", invoice_id))
        }
        other => InvoiceError::Storage(other),
    })?;

    let filename = key.rsplit('/').next().unwrap_or("invoice.pdf").to_string();

    tracing::info!(invoice_id, size = data.len(), "Serving invoice PDF");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        data,
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::InvoicingConfig;
    use crate::services::{Database, LocalStorage, PdfDocumentGenerator, Storage};
    use crate::startup::{router, AppState};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Router over a pool that never connects; only paths that fail before
    /// the database are exercised.
    async fn app(dir: &tempfile::TempDir) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let db = Database::from_pool(pool);
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let documents = Arc::new(PdfDocumentGenerator::new(storage.clone()));
        let config = InvoicingConfig::with_database_url("postgres://localhost/unused");
        router(AppState::new(config, db, storage, documents))
    }

    async fn post_invoice(app: Router, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/invoices")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_customer_is_rejected_before_database() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "products": [{ "product_id": 1, "quantity": 1 }],
            "summaryData": {}
        });

        let (status, body) = post_invoice(app(&dir).await, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Customer details are required");
    }

    #[tokio::test]
    async fn empty_product_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "customer": { "name": "Walk-in" },
            "products": [],
            "summaryData": {}
        });

        let (status, body) = post_invoice(app(&dir).await, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "At least one product is required");
    }

    #[tokio::test]
    async fn missing_summary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "customer": { "name": "Walk-in" },
            "products": [{ "product_id": 1, "quantity": 1 }]
        });

        let (status, body) = post_invoice(app(&dir).await, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invoice summary is required");
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();

        let (status, body) = post_invoice(app(&dir).await, "{\"customer\":".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn responses_carry_request_id_and_security_headers() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .await
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-123");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }
}
