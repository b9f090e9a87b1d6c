//! Services module for gst-invoicing-service.

pub mod database;
pub mod documents;
pub mod invoicing;
pub mod metrics;
pub mod storage;
pub mod tax;

pub use database::{CreatedInvoice, Database};
pub use documents::{DocumentGenerator, InvoiceDocument, PdfDocumentGenerator};
pub use invoicing::{DocumentOutcome, InvoiceCreated, InvoiceService, InvoiceSettings};
pub use metrics::{get_metrics, init_metrics};
pub use storage::{LocalStorage, Storage};
