//! Customer model for gst-invoicing-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Billing customer. Customers with a GST number are unique by it; walk-in
/// customers (no GST number) get a fresh row per invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: i64,
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub gst_number: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub place_of_supply: Option<String>,
    pub vehicle_number: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for resolving or creating a customer.
///
/// Every field is already trimmed; blank values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewCustomer {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub gst_number: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub place_of_supply: Option<String>,
    pub vehicle_number: Option<String>,
}
