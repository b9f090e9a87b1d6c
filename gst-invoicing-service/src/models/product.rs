//! Product model for gst-invoicing-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sellable product. Only `stock_quantity` is mutated here, and only inside
/// the invoice transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub hsn_code: Option<String>,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub gst_percentage: Decimal,
    pub stock_quantity: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
