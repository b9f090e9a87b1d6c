//! Invoice creation: validation, the stock transaction and the post-commit document.

use crate::config::{InvoicingConfig, InvoicingRules};
use crate::dtos::CreateInvoiceRequest;
use crate::error::InvoiceError;
use crate::models::{NewInvoice, PaymentType};
use crate::services::database::{CreatedInvoice, Database};
use crate::services::documents::{DocumentGenerator, InvoiceDocument};
use crate::services::metrics::{DOCUMENTS_TOTAL, INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::tax;
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Timeouts and rules applied to every invoice.
#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    pub transaction_timeout: Duration,
    pub lock_timeout: Duration,
    pub rules: InvoicingRules,
}

impl From<&InvoicingConfig> for InvoiceSettings {
    fn from(config: &InvoicingConfig) -> Self {
        Self {
            transaction_timeout: config.database.transaction_timeout,
            lock_timeout: config.database.lock_timeout,
            rules: config.invoicing.clone(),
        }
    }
}

/// What happened to the invoice PDF after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Stored { key: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct InvoiceCreated {
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    pub document: DocumentOutcome,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Database,
    documents: Arc<dyn DocumentGenerator>,
    settings: InvoiceSettings,
}

/// Turns a request into a persistable invoice without touching the database.
pub fn prepare_invoice(
    request: CreateInvoiceRequest,
    rules: &InvoicingRules,
    today: NaiveDate,
) -> Result<NewInvoice, InvoiceError> {
    let invoice = request.into_new_invoice(&rules.defaults, today)?;
    if rules.strict_totals {
        tax::verify_totals(&invoice, rules.totals_tolerance).map_err(InvoiceError::Validation)?;
    }
    Ok(invoice)
}

/// Adds a committed invoice's total to the amount counter. Counters only grow,
/// so zero and negative totals are not counted.
fn record_invoice_amount(payment_type: PaymentType, total_amount: Decimal) {
    let amount = total_amount.to_f64().unwrap_or_default();
    if amount > 0.0 {
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[payment_type.as_str()])
            .inc_by(amount);
    }
}

impl InvoiceService {
    pub fn new(
        db: Database,
        documents: Arc<dyn DocumentGenerator>,
        settings: InvoiceSettings,
    ) -> Self {
        Self {
            db,
            documents,
            settings,
        }
    }

    /// Validates, persists atomically, then generates the PDF.
    ///
    /// A document failure is reported in the outcome; the invoice stays committed.
    #[instrument(skip(self, request))]
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceCreated, InvoiceError> {
        let result = self.create_invoice_inner(request).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.kind(),
        };
        INVOICES_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn create_invoice_inner(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceCreated, InvoiceError> {
        let invoice = prepare_invoice(request, &self.settings.rules, Utc::now().date_naive())?;

        let created = self.persist(&invoice).await?;

        record_invoice_amount(invoice.header.payment_type, invoice.header.total_amount);

        let document = self
            .generate_document(created.invoice_id, &invoice, &created.product_names)
            .await;

        info!(
            invoice_id = created.invoice_id,
            invoice_number = ?invoice.header.invoice_number,
            document_stored = matches!(document, DocumentOutcome::Stored { .. }),
            "Invoice created"
        );

        Ok(InvoiceCreated {
            invoice_id: created.invoice_id,
            invoice_number: invoice.header.invoice_number,
            document,
        })
    }

    async fn persist(&self, invoice: &NewInvoice) -> Result<CreatedInvoice, InvoiceError> {
        let transaction = self.db.create_invoice(invoice, self.settings.lock_timeout);
        match tokio::time::timeout(self.settings.transaction_timeout, transaction).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the transaction future rolls back and releases the connection.
                error!(
                    timeout_ms = self.settings.transaction_timeout.as_millis() as u64,
                    "Invoice transaction timed out"
                );
                Err(InvoiceError::Persistence(anyhow::anyhow!(
                    "Invoice transaction timed out after {} ms",
                    self.settings.transaction_timeout.as_millis()
                )))
            }
        }
    }

    async fn generate_document(
        &self,
        invoice_id: i64,
        invoice: &NewInvoice,
        product_names: &HashMap<i64, String>,
    ) -> DocumentOutcome {
        let document = InvoiceDocument::new(invoice_id, invoice, product_names);
        let key = document.storage_key();

        match self.documents.generate_document(&document, &key).await {
            Ok(()) => {
                DOCUMENTS_TOTAL.with_label_values(&["generated"]).inc();
                DocumentOutcome::Stored { key }
            }
            Err(e) => {
                DOCUMENTS_TOTAL.with_label_values(&["failed"]).inc();
                warn!(invoice_id, error = %e, "Invoice saved but PDF generation failed");
                DocumentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn request(total: serde_json::Value) -> CreateInvoiceRequest {
        serde_json::from_value(json!({
            "customer": { "name": "Sharma Traders" },
            "products": [{
                "product_id": 1, "quantity": 2, "rate": 250, "gst": 18,
                "amount": 500, "priceIncludingGst": 590
            }],
            "summaryData": {
                "totalWithGst": 590, "gst": 18, "gstCost": 90,
                "discountType": "flat", "discountValue": 0,
                "transportCharge": 0, "total": total
            }
        }))
        .unwrap()
    }

    #[test]
    fn caller_totals_are_trusted_by_default() {
        let rules = InvoicingRules::default();
        let invoice = prepare_invoice(request(json!(1)), &rules, today()).unwrap();
        assert_eq!(invoice.header.total_amount, rust_decimal::Decimal::ONE);
    }

    #[test]
    fn strict_mode_rejects_inconsistent_totals() {
        let rules = InvoicingRules {
            strict_totals: true,
            ..InvoicingRules::default()
        };
        match prepare_invoice(request(json!(1)), &rules, today()) {
            Err(InvoiceError::Validation(message)) => {
                assert!(message.starts_with("Invoice total"), "{}", message)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn strict_mode_accepts_consistent_totals() {
        let rules = InvoicingRules {
            strict_totals: true,
            ..InvoicingRules::default()
        };
        assert!(prepare_invoice(request(json!(590)), &rules, today()).is_ok());
    }

    #[test]
    fn negative_totals_leave_the_amount_counter_alone() {
        let counter = INVOICE_AMOUNT_TOTAL.with_label_values(&["Advance"]);
        let before = counter.get();
        record_invoice_amount(PaymentType::Advance, Decimal::new(-8200, 2));
        record_invoice_amount(PaymentType::Advance, Decimal::ZERO);
        assert_eq!(counter.get(), before);

        record_invoice_amount(PaymentType::Advance, Decimal::new(1050, 2));
        assert!(counter.get() >= before + 10.5);
    }
}
