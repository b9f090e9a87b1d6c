use crate::error::InvoiceError;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

const DEFAULT_MOVEMENT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct MovementParams {
    pub limit: Option<i64>,
}

/// A product's stock audit log, newest first.
pub async fn list_stock_movements(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Query(params): Query<MovementParams>,
) -> Result<impl IntoResponse, InvoiceError> {
    if state.db.get_product(product_id).await?.is_none() {
        return Err(InvoiceError::NotFound(format!("Product {}", product_id)));
    }

    let movements = state
        .db
        .list_stock_movements(product_id, params.limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT))
        .await?;

    Ok(Json(movements))
}
