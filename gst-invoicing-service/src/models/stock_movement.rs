//! Stock movement model for gst-invoicing-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Direction of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    In,
    Out,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::In => "IN",
            ChangeType::Out => "OUT",
        }
    }
}

/// Append-only audit entry for one stock change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub movement_id: i64,
    pub product_id: i64,
    pub change_type: String,
    pub quantity_changed: Decimal,
    pub old_stock: Decimal,
    pub new_stock: Decimal,
    pub reason: Option<String>,
    pub reference_id: Option<i64>,
    pub updated_by: String,
    pub created_utc: DateTime<Utc>,
}
