//! Domain models for gst-invoicing-service.

mod customer;
mod invoice;
mod line_item;
mod product;
mod stock_movement;

pub use customer::{Customer, NewCustomer};
pub use invoice::{
    DiscountType, Invoice, InvoiceWithItems, NewInvoice, NewInvoiceHeader, PaymentType,
};
pub use line_item::{LineItem, NewLineItem};
pub use product::Product;
pub use stock_movement::{ChangeType, StockMovement};
