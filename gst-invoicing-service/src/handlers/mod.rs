pub mod health;
pub mod invoices;
pub mod products;

pub use health::{health_check, metrics_handler, readiness_check};
pub use invoices::{create_invoice, download_invoice_pdf, get_invoice};
pub use products::list_stock_movements;
