//! Line item model for gst-invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Line item on an invoice. Figures are the caller's, snapshotted at creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub item_id: i64,
    pub invoice_id: i64,
    pub product_id: i64,
    pub hsn_code: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub gst_percentage: Decimal,
    pub base_amount: Decimal,
    pub total_with_gst: Decimal,
    pub sort_order: i32,
}

/// Input for creating a line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLineItem {
    pub product_id: i64,
    pub hsn_code: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub gst_percentage: Decimal,
    pub base_amount: Decimal,
    pub total_with_gst: Decimal,
}
