//! Request and response shapes for the HTTP API.

mod invoice;
pub mod lenient;

pub use invoice::{
    CreateInvoiceRequest, CreateInvoiceResponse, CustomerInput, LineItemInput, SummaryInput,
};
