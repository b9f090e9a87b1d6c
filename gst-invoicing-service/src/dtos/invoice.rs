use super::lenient;
use crate::config::FieldDefaults;
use crate::error::InvoiceError;
use crate::models::{
    DiscountType, NewCustomer, NewInvoice, NewInvoiceHeader, NewLineItem, PaymentType,
};
use crate::services::tax::{round_money, round_quantity, round_rate, split_gst};
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /api/invoices`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(required(message = "Customer details are required"))]
    pub customer: Option<CustomerInput>,

    #[validate(
        required(message = "At least one product is required"),
        length(min = 1, message = "At least one product is required")
    )]
    pub products: Option<Vec<LineItemInput>>,

    #[serde(rename = "summaryData")]
    #[validate(required(message = "Invoice summary is required"))]
    pub summary_data: Option<SummaryInput>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub created_by: Option<String>,
}

/// Customer block. It also carries the invoice number and date, as the UI sends them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomerInput {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub mobile: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub gst: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub pincode: Option<String>,
    #[serde(
        rename = "placeOfSupply",
        default,
        deserialize_with = "lenient::string"
    )]
    pub place_of_supply: Option<String>,
    #[serde(rename = "vehicleNo", default, deserialize_with = "lenient::string")]
    pub vehicle_no: Option<String>,
    #[serde(rename = "invoiceNo", default, deserialize_with = "lenient::string")]
    pub invoice_no: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LineItemInput {
    #[serde(default, deserialize_with = "lenient::integer")]
    pub product_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub hsn_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub gst: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub amount: Option<Decimal>,
    #[serde(
        rename = "priceIncludingGst",
        default,
        deserialize_with = "lenient::decimal"
    )]
    pub price_including_gst: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInput {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub total_with_gst: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub gst: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub gst_cost: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub cgst_cost: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub sgst_cost: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub discount_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub discount_value: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub transport_charge: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub total: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub payment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub advance_amount: Option<Decimal>,
}

/// Body of a successful `POST /api/invoices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceResponse {
    pub success: bool,
    pub message: String,
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_error: Option<String>,
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

fn parse_invoice_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn money(value: Option<Decimal>) -> Decimal {
    round_money(value.unwrap_or_default())
}

impl CreateInvoiceRequest {
    /// Checks the required parts of the request and applies every default.
    ///
    /// No I/O happens here; a request that passes is ready for the transaction.
    pub fn into_new_invoice(
        self,
        defaults: &FieldDefaults,
        today: NaiveDate,
    ) -> Result<NewInvoice, InvoiceError> {
        self.validate()?;

        let (Some(customer), Some(products), Some(summary)) =
            (self.customer, self.products, self.summary_data)
        else {
            return Err(InvoiceError::Validation(
                "Customer, products and summary are required".to_string(),
            ));
        };

        if customer.name.is_none() && customer.mobile.is_none() {
            return Err(InvoiceError::Validation(
                "Customer name or mobile number is required".to_string(),
            ));
        }

        let items = products
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let product_id = item.product_id.ok_or_else(|| {
                    InvoiceError::Validation(format!("Product {} has no product_id", index + 1))
                })?;
                Ok(NewLineItem {
                    product_id,
                    hsn_code: item.hsn_code,
                    quantity: round_quantity(item.quantity.unwrap_or_default()),
                    unit: item.unit,
                    rate: money(item.rate),
                    gst_percentage: round_rate(item.gst.unwrap_or_default()),
                    base_amount: money(item.amount),
                    total_with_gst: money(item.price_including_gst),
                })
            })
            .collect::<Result<Vec<_>, InvoiceError>>()?;

        if let Some(item) = items.iter().find(|i| i.quantity < Decimal::ZERO) {
            return Err(InvoiceError::Validation(format!(
                "Quantity for product {} cannot be negative",
                item.product_id
            )));
        }

        let gst_amount = money(summary.gst_cost);
        let (cgst_amount, sgst_amount) = split_gst(gst_amount);
        for (label, sent, derived) in [
            ("cgstCost", summary.cgst_cost, cgst_amount),
            ("sgstCost", summary.sgst_cost, sgst_amount),
        ] {
            if let Some(sent) = sent {
                let agrees = sent
                    .checked_sub(derived)
                    .is_some_and(|difference| difference.abs() <= Decimal::new(1, 2));
                if !agrees {
                    tracing::warn!(
                        field = label,
                        sent = %sent,
                        derived = %derived,
                        "Caller GST split disagrees with gstCost; storing the derived half"
                    );
                }
            }
        }

        let invoice_date = customer
            .date
            .as_deref()
            .and_then(parse_invoice_date)
            .unwrap_or(today);

        let header = NewInvoiceHeader {
            invoice_number: customer.invoice_no,
            invoice_date,
            place_of_supply: customer.place_of_supply.clone(),
            vehicle_number: customer.vehicle_no.clone(),
            subtotal: money(summary.total_with_gst),
            gst_percentage: round_rate(summary.gst.unwrap_or_default()),
            gst_amount,
            cgst_amount,
            sgst_amount,
            discount_type: summary
                .discount_type
                .as_deref()
                .and_then(DiscountType::parse)
                .unwrap_or(defaults.discount_type),
            discount_value: money(summary.discount_value),
            transport_charge: money(summary.transport_charge),
            total_amount: money(summary.total),
            payment_type: summary
                .payment_type
                .as_deref()
                .and_then(PaymentType::parse)
                .unwrap_or(defaults.payment_type),
            advance_amount: money(summary.advance_amount),
        };

        let customer = NewCustomer {
            name: customer.name,
            mobile: customer.mobile,
            gst_number: customer.gst.map(|g| g.to_uppercase()),
            address: customer.address,
            state: customer.state,
            pincode: customer.pincode,
            place_of_supply: customer.place_of_supply,
            vehicle_number: customer.vehicle_no,
        };

        Ok(NewInvoice {
            customer,
            header,
            items,
            created_by: self
                .created_by
                .unwrap_or_else(|| defaults.created_by.clone()),
        })
    }
}
