//! Error taxonomy for invoice creation and the read endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoiceError {
    /// The request is missing required data. Nothing was persisted.
    #[error("{0}")]
    Validation(String),

    /// Deducting a line item would drive the product's stock negative.
    /// The whole invoice was rolled back.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        requested: Decimal,
        available: Decimal,
    },

    /// A line item references a product that does not exist.
    /// The whole invoice was rolled back.
    #[error("Product {product_id} does not exist")]
    ProductNotFound { product_id: i64 },

    #[error("{0} not found")]
    NotFound(String),

    /// Unexpected database failure, including timeouts. Rolled back.
    #[error("Database error: {0}")]
    Persistence(anyhow::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] AppError),
}

impl InvoiceError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InvoiceError::Validation(_) => "validation_error",
            InvoiceError::InsufficientStock { .. } => "insufficient_stock",
            InvoiceError::ProductNotFound { .. } => "product_not_found",
            InvoiceError::NotFound(_) => "not_found",
            InvoiceError::Persistence(_) => "persistence_error",
            InvoiceError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            InvoiceError::Validation(_)
            | InvoiceError::InsufficientStock { .. }
            | InvoiceError::ProductNotFound { .. } => StatusCode::BAD_REQUEST,
            InvoiceError::NotFound(_) => StatusCode::NOT_FOUND,
            InvoiceError::Persistence(_) | InvoiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Validation failures are reported one at a time, in request order.
const VALIDATED_FIELDS: [&str; 3] = ["customer", "products", "summary_data"];

impl From<validator::ValidationErrors> for InvoiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let message = VALIDATED_FIELDS
            .iter()
            .filter_map(|field| field_errors.get(*field))
            .chain(field_errors.values())
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid invoice request".to_string());
        InvoiceError::Validation(message)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<Decimal>,
}

impl IntoResponse for InvoiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = FailureBody {
            success: false,
            message: self.to_string(),
            product_id: None,
            requested: None,
            available: None,
        };

        match &self {
            InvoiceError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                body.message = format!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product_id,
                    requested.normalize(),
                    available.normalize()
                );
                body.product_id = Some(*product_id);
                body.requested = Some(requested.normalize());
                body.available = Some(available.normalize());
            }
            InvoiceError::ProductNotFound { product_id } => {
                body.product_id = Some(*product_id);
            }
            InvoiceError::Persistence(_) | InvoiceError::Storage(_) => {
                body.message = "Internal server error".to_string();
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
