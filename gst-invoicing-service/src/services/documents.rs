//! Invoice PDF rendering and storage.

use crate::models::{DiscountType, NewCustomer, NewInvoice, NewInvoiceHeader, NewLineItem};
use async_trait::async_trait;
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::io::BufWriter;
use std::sync::Arc;
use tracing::instrument;

use super::storage::Storage;

/// Everything printed on an invoice, captured after commit.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub invoice_id: i64,
    pub customer: NewCustomer,
    pub header: NewInvoiceHeader,
    pub lines: Vec<DocumentLine>,
}

#[derive(Debug, Clone)]
pub struct DocumentLine {
    pub description: String,
    pub item: NewLineItem,
}

impl InvoiceDocument {
    pub fn new(invoice_id: i64, invoice: &NewInvoice, product_names: &HashMap<i64, String>) -> Self {
        let lines = invoice
            .items
            .iter()
            .map(|item| DocumentLine {
                description: product_names
                    .get(&item.product_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Product #{}", item.product_id)),
                item: item.clone(),
            })
            .collect();

        Self {
            invoice_id,
            customer: invoice.customer.clone(),
            header: invoice.header.clone(),
            lines,
        }
    }

    pub fn display_number(&self) -> String {
        self.header
            .invoice_number
            .clone()
            .unwrap_or_else(|| format!("#{}", self.invoice_id))
    }

    /// Storage key: `invoices/<number>-<id>.pdf`. The id keeps keys unique
    /// because invoice numbers are not.
    pub fn storage_key(&self) -> String {
        storage_key(self.header.invoice_number.as_deref(), self.invoice_id)
    }
}

pub fn storage_key(invoice_number: Option<&str>, invoice_id: i64) -> String {
    format!(
        "invoices/{}-{}.pdf",
        sanitize_filename(invoice_number.unwrap_or("invoice")),
        invoice_id
    )
}

fn sanitize_filename(input: &str) -> String {
    let out: String = input
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        "invoice".to_string()
    } else {
        out
    }
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Renders `data` and stores it under `path`.
    async fn generate_document(&self, data: &InvoiceDocument, path: &str) -> Result<(), AppError>;
}

pub struct PdfDocumentGenerator {
    storage: Arc<dyn Storage>,
}

impl PdfDocumentGenerator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl DocumentGenerator for PdfDocumentGenerator {
    #[instrument(skip(self, data), fields(invoice_id = data.invoice_id))]
    async fn generate_document(&self, data: &InvoiceDocument, path: &str) -> Result<(), AppError> {
        let owned = data.clone();
        let bytes = tokio::task::spawn_blocking(move || render_invoice_pdf(&owned))
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("PDF rendering task failed: {}", e))
            })??;

        self.storage.upload(path, bytes).await
    }
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LEFT: f32 = 15.0;
const RIGHT: f32 = 195.0;
const TOP: f32 = 282.0;
const BOTTOM: f32 = 25.0;

/// Column x positions for the item table.
const COLUMNS: [(&str, f32); 8] = [
    ("#", 15.0),
    ("Description", 22.0),
    ("HSN", 80.0),
    ("Qty", 98.0),
    ("Unit", 116.0),
    ("Rate", 130.0),
    ("GST %", 150.0),
    ("Total", 170.0),
];

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to render invoice PDF: {}", e))
}

/// Indian digit grouping: 12,34,567.89
pub fn format_rupees(value: Decimal) -> String {
    let s = format!("{:.2}", super::tax::round_money(value.abs()));
    let (int_part, dec_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut groups: Vec<String> = Vec::new();
    let mut end = digits.len();
    if end > 3 {
        groups.push(digits[end - 3..].iter().collect());
        end -= 3;
        while end > 2 {
            groups.push(digits[end - 2..end].iter().collect());
            end -= 2;
        }
        groups.push(digits[..end].iter().collect());
        groups.reverse();
    } else {
        groups.push(int_part.to_string());
    }

    let sign = if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, groups.join(","), dec_part)
}

struct Cursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl Cursor {
    fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn rule(&self) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(LEFT), Mm(self.y)), false),
                (Point::new(Mm(RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    fn down(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn ensure_room(&mut self, mm: f32, title: &str) {
        if self.y - mm >= BOTTOM {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
        self.text(&format!("{} (continued)", title), 10.0, LEFT, true);
        self.down(8.0);
        table_header(self);
    }
}

fn table_header(cursor: &mut Cursor) {
    for (label, x) in COLUMNS {
        cursor.text(label, 9.0, x, true);
    }
    cursor.down(2.5);
    cursor.rule();
    cursor.down(5.5);
}

fn optional_line(cursor: &mut Cursor, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        cursor.text(&format!("{}: {}", label, value), 10.0, LEFT, false);
        cursor.down(5.0);
    }
}

fn total_row(cursor: &mut Cursor, label: &str, value: String, bold: bool) {
    cursor.text(label, 10.0, 130.0, bold);
    cursor.text(&value, 10.0, 170.0, bold);
    cursor.down(6.0);
}

/// Renders a plain tabular A4 tax invoice. Long item lists spill onto extra pages.
pub fn render_invoice_pdf(data: &InvoiceDocument) -> Result<Vec<u8>, AppError> {
    let number = data.display_number();
    let title = format!("Tax Invoice {}", number);

    let (doc, page, layer) = PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Page 1");
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let mut cursor = Cursor {
        doc,
        layer,
        font,
        bold,
        y: TOP,
        pages: 1,
    };

    let header = &data.header;
    let customer = &data.customer;

    cursor.text("TAX INVOICE", 18.0, LEFT, true);
    cursor.text(&format!("Invoice No: {}", number), 10.0, 130.0, true);
    cursor.down(6.0);
    cursor.text(
        &format!("Date: {}", header.invoice_date.format("%d-%m-%Y")),
        10.0,
        130.0,
        false,
    );
    cursor.down(6.0);
    cursor.rule();
    cursor.down(8.0);

    cursor.text("Bill To", 11.0, LEFT, true);
    cursor.down(6.0);
    cursor.text(customer.name.as_deref().unwrap_or("Walk-in customer"), 10.0, LEFT, false);
    cursor.down(5.0);
    optional_line(&mut cursor, "Mobile", customer.mobile.as_deref());
    optional_line(&mut cursor, "GSTIN", customer.gst_number.as_deref());
    optional_line(&mut cursor, "Address", customer.address.as_deref());
    let region = [customer.state.as_deref(), customer.pincode.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" - ");
    optional_line(&mut cursor, "State", (!region.is_empty()).then_some(region.as_str()));
    optional_line(&mut cursor, "Place of supply", header.place_of_supply.as_deref());
    optional_line(&mut cursor, "Vehicle No", header.vehicle_number.as_deref());
    cursor.down(4.0);

    table_header(&mut cursor);
    for (index, line) in data.lines.iter().enumerate() {
        cursor.ensure_room(6.0, &title);
        let item = &line.item;
        let description: String = line.description.chars().take(32).collect();
        let cells = [
            (index + 1).to_string(),
            description,
            item.hsn_code.clone().unwrap_or_default(),
            item.quantity.normalize().to_string(),
            item.unit.clone().unwrap_or_default(),
            format_rupees(item.rate),
            item.gst_percentage.normalize().to_string(),
            format_rupees(item.total_with_gst),
        ];
        for ((_, x), cell) in COLUMNS.iter().zip(cells.iter()) {
            cursor.text(cell, 9.0, *x, false);
        }
        cursor.down(6.0);
    }
    cursor.rule();
    cursor.down(8.0);

    cursor.ensure_room(60.0, &title);
    total_row(&mut cursor, "Total with GST", format_rupees(header.subtotal), false);
    total_row(
        &mut cursor,
        &format!("GST ({}%)", header.gst_percentage.normalize()),
        format_rupees(header.gst_amount),
        false,
    );
    total_row(&mut cursor, "  CGST", format_rupees(header.cgst_amount), false);
    total_row(&mut cursor, "  SGST", format_rupees(header.sgst_amount), false);
    if !header.discount_value.is_zero() {
        let label = match header.discount_type {
            DiscountType::Percentage => {
                format!("Discount ({}%)", header.discount_value.normalize())
            }
            DiscountType::Absolute => "Discount".to_string(),
        };
        if let Some(amount) = super::tax::discount_amount(
            header.subtotal,
            header.discount_type,
            header.discount_value,
        ) {
            total_row(&mut cursor, &label, format!("-{}", format_rupees(amount)), false);
        }
    }
    if !header.transport_charge.is_zero() {
        total_row(&mut cursor, "Transport", format_rupees(header.transport_charge), false);
    }
    total_row(
        &mut cursor,
        "TOTAL",
        format!("Rs. {}", format_rupees(header.total_amount)),
        true,
    );
    total_row(&mut cursor, "Payment", header.payment_type.as_str().to_string(), false);
    if !header.advance_amount.is_zero() {
        total_row(&mut cursor, "Advance paid", format_rupees(header.advance_amount), false);
    }

    cursor.y = 12.0;
    cursor.text("This is a computer generated invoice.", 8.0, LEFT, false);

    let mut writer = BufWriter::new(Vec::<u8>::new());
    cursor.doc.save(&mut writer).map_err(pdf_error)?;
    writer.into_inner().map_err(pdf_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentType;
    use crate::services::storage::LocalStorage;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn document(lines: usize) -> InvoiceDocument {
        let item = NewLineItem {
            product_id: 4,
            hsn_code: Some("1006".into()),
            quantity: d("2.5"),
            unit: Some("kg".into()),
            rate: d("80"),
            gst_percentage: d("5"),
            base_amount: d("200"),
            total_with_gst: d("210"),
        };
        InvoiceDocument {
            invoice_id: 9,
            customer: NewCustomer {
                name: Some("Sharma Traders".into()),
                mobile: Some("9876543210".into()),
                gst_number: Some("27AAPFU0939F1ZV".into()),
                state: Some("Maharashtra".into()),
                ..NewCustomer::default()
            },
            header: NewInvoiceHeader {
                invoice_number: Some("INV/2026/009".into()),
                invoice_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                place_of_supply: Some("Pune".into()),
                vehicle_number: None,
                subtotal: d("210"),
                gst_percentage: d("5"),
                gst_amount: d("10"),
                cgst_amount: d("5"),
                sgst_amount: d("5"),
                discount_type: DiscountType::Percentage,
                discount_value: d("10"),
                transport_charge: d("20"),
                total_amount: d("209"),
                payment_type: PaymentType::Advance,
                advance_amount: d("100"),
            },
            lines: (0..lines)
                .map(|_| DocumentLine {
                    description: "Basmati rice".into(),
                    item: item.clone(),
                })
                .collect(),
        }
    }

    struct MemoryStorage(tokio::sync::Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
            self.0.lock().await.insert(key.to_string(), data);
            Ok(())
        }
        async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
            self.0
                .lock()
                .await
                .get(key)
                .cloned()
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("{}", key)))
        }
    }

    #[test]
    fn rendered_bytes_are_a_pdf() {
        let bytes = render_invoice_pdf(&document(3)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_item_lists_render_across_pages() {
        let bytes = render_invoice_pdf(&document(80)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn storage_key_is_sanitised_and_unique_per_invoice() {
        assert_eq!(document(1).storage_key(), "invoices/INV_2026_009-9.pdf");
        assert_eq!(storage_key(None, 3), "invoices/invoice-3.pdf");
        assert_eq!(storage_key(Some("../../etc"), 3), "invoices/______etc-3.pdf");
    }

    #[test]
    fn rupees_use_indian_grouping() {
        assert_eq!(format_rupees(d("0")), "0.00");
        assert_eq!(format_rupees(d("999.5")), "999.50");
        assert_eq!(format_rupees(d("1234567.891")), "12,34,567.89");
        assert_eq!(format_rupees(d("-12345")), "-12,345.00");
    }

    #[test]
    fn unnamed_products_fall_back_to_id() {
        let doc = document(1);
        let invoice = NewInvoice {
            customer: doc.customer.clone(),
            header: doc.header.clone(),
            items: vec![doc.lines[0].item.clone()],
            created_by: "1".into(),
        };
        let names = HashMap::new();
        let built = InvoiceDocument::new(9, &invoice, &names);
        assert_eq!(built.lines[0].description, "Product #4");
    }

    #[tokio::test]
    async fn generator_uploads_to_given_path() {
        let storage = Arc::new(MemoryStorage(Default::default()));
        let generator = PdfDocumentGenerator::new(storage.clone());

        generator
            .generate_document(&document(2), "invoices/test-9.pdf")
            .await
            .unwrap();

        let stored = storage.download("invoices/test-9.pdf").await.unwrap();
        assert!(stored.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn generator_writes_through_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let generator = PdfDocumentGenerator::new(storage.clone());
        let doc = document(1);

        generator
            .generate_document(&doc, &doc.storage_key())
            .await
            .unwrap();

        let bytes = storage.download(&doc.storage_key()).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
