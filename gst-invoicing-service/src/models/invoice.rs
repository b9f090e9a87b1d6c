//! Invoice model for gst-invoicing-service.

use super::{LineItem, NewCustomer, NewLineItem};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How `discount_value` is applied to the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    #[serde(rename = "%")]
    Percentage,
    #[serde(rename = "flat")]
    Absolute,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "%",
            DiscountType::Absolute => "flat",
        }
    }

    /// Parses the spellings the billing UI sends. Unknown values yield `None`
    /// so the caller can fall back to the configured default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "%" | "percent" | "percentage" => Some(DiscountType::Percentage),
            "flat" | "absolute" | "amount" | "fixed" | "rs" | "inr" | "₹" => {
                Some(DiscountType::Absolute)
            }
            _ => None,
        }
    }
}

/// How the invoice was (or will be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Cash,
    Online,
    Advance,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "Cash",
            PaymentType::Online => "Online",
            PaymentType::Advance => "Advance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(PaymentType::Cash),
            "online" | "upi" | "card" | "bank" => Some(PaymentType::Online),
            "advance" => Some(PaymentType::Advance),
            _ => None,
        }
    }
}

/// Persisted invoice header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    pub customer_id: i64,
    pub invoice_date: NaiveDate,
    pub place_of_supply: Option<String>,
    pub vehicle_number: Option<String>,
    pub subtotal: Decimal,
    pub gst_percentage: Decimal,
    pub gst_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub transport_charge: Decimal,
    pub total_amount: Decimal,
    pub payment_type: String,
    pub advance_amount: Decimal,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
}

/// Invoice header together with its line items, for read endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<LineItem>,
}

/// Header fields for a new invoice, after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoiceHeader {
    pub invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub place_of_supply: Option<String>,
    pub vehicle_number: Option<String>,
    pub subtotal: Decimal,
    pub gst_percentage: Decimal,
    pub gst_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub transport_charge: Decimal,
    pub total_amount: Decimal,
    pub payment_type: PaymentType,
    pub advance_amount: Decimal,
}

/// Everything the invoice transaction persists, validated and normalised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoice {
    pub customer: NewCustomer,
    pub header: NewInvoiceHeader,
    pub items: Vec<NewLineItem>,
    pub created_by: String,
}

impl NewInvoice {
    /// Text recorded on each stock movement this invoice produces.
    pub fn stock_reason(&self, invoice_id: i64) -> String {
        match &self.header.invoice_number {
            Some(number) => format!("Sold on invoice {}", number),
            None => format!("Sold on invoice #{}", invoice_id),
        }
    }
}
