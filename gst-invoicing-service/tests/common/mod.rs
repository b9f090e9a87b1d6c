//! Common test utilities for gst-invoicing-service integration tests.

use gst_invoicing_service::config::InvoicingConfig;
use gst_invoicing_service::services::DocumentGenerator;
use gst_invoicing_service::startup::Application;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,gst_invoicing_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database-backed tests")
}

/// Running application plus direct pool access for seeding and assertions.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub http_port: u16,
    pub pool: PgPool,
    pub client: reqwest::Client,
    storage_dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_inner(None, |_| {}).await
    }

    /// Spawn with a custom document generator, e.g. one that always fails.
    pub async fn spawn_with_documents(documents: Arc<dyn DocumentGenerator>) -> Self {
        Self::spawn_inner(Some(documents), |_| {}).await
    }

    /// Spawn with adjusted settings, applied after the test defaults.
    pub async fn spawn_with_config(configure: impl FnOnce(&mut InvoicingConfig)) -> Self {
        Self::spawn_inner(None, configure).await
    }

    async fn spawn_inner(
        documents: Option<Arc<dyn DocumentGenerator>>,
        configure: impl FnOnce(&mut InvoicingConfig),
    ) -> Self {
        init_tracing();

        let url = database_url();
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .expect("Failed to connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");

        let mut config = InvoicingConfig::with_database_url(url);
        config.common.port = 0;
        config.service_name = "gst-invoicing-service-test".to_string();
        config.database.max_connections = 8;
        config.database.min_connections = 1;
        config.documents.storage_path = storage_dir.path().to_string_lossy().into_owned();
        configure(&mut config);

        let app = match documents {
            Some(documents) => Application::build_with_document_generator(config, documents).await,
            None => Application::build_without_migrations(config).await,
        }
        .expect("Failed to build application");

        let http_port = app.http_port();
        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let address = format!("http://127.0.0.1:{}", http_port);
        let client = reqwest::Client::new();

        let mut attempts = 0;
        while client
            .get(format!("{}/metrics", address))
            .send()
            .await
            .is_err()
        {
            attempts += 1;
            assert!(attempts < 20, "Server did not start");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        Self {
            address,
            http_port,
            pool,
            client,
            storage_dir,
        }
    }

    pub async fn create_product(&self, stock: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO products (name, hsn_code, unit, rate, gst_percentage, stock_quantity)
            VALUES ($1, '1006', 'kg', 100, 18, $2)
            RETURNING product_id
            "#,
        )
        .bind(unique("Basmati rice"))
        .bind(dec(stock))
        .fetch_one(&self.pool)
        .await
        .expect("Failed to seed product")
    }

    pub async fn stock_of(&self, product_id: i64) -> Decimal {
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read stock")
    }

    pub async fn movement_count(&self, product_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count movements")
    }

    pub async fn item_count(&self, product_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM invoice_items WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count line items")
    }

    pub async fn invoice_count(&self, invoice_number: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE invoice_number = $1")
            .bind(invoice_number)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count invoices")
    }

    pub async fn customer_count(&self, gst_number: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE gst_number = $1")
            .bind(gst_number)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count customers")
    }

    pub async fn post_invoice(&self, body: &Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}/api/invoices", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status();
        let body: Value = response.json().await.expect("Response was not JSON");
        (status, body)
    }

    pub async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("invalid decimal literal")
}

pub fn unique(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..10])
}

/// A unique, well-formed GST number.
#[allow(dead_code)]
pub fn unique_gst() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("27{}", &id[..13])
}

/// Invoice request body; each item is `(product_id, quantity)`.
#[allow(dead_code)]
pub fn invoice_body(invoice_number: &str, gst: &str, items: &[(i64, &str)]) -> Value {
    let products: Vec<Value> = items
        .iter()
        .map(|(product_id, quantity)| {
            json!({
                "product_id": product_id,
                "hsn_code": "1006",
                "quantity": quantity,
                "unit": "kg",
                "rate": 100,
                "gst": 18,
                "amount": 100,
                "priceIncludingGst": 118
            })
        })
        .collect();

    json!({
        "customer": {
            "name": "Sharma Traders",
            "mobile": "9876543210",
            "gst": gst,
            "address": "12 MG Road",
            "state": "Maharashtra",
            "pincode": "411001",
            "placeOfSupply": "Pune",
            "vehicleNo": "MH12AB1234",
            "invoiceNo": invoice_number,
            "date": "2026-04-01"
        },
        "products": products,
        "summaryData": {
            "totalWithGst": 118,
            "gst": 18,
            "gstCost": 18,
            "cgstCost": 9,
            "sgstCost": 9,
            "discountType": "%",
            "discountValue": 0,
            "transportCharge": 0,
            "total": 118,
            "paymentType": "Cash",
            "advanceAmount": 0
        },
        "created_by": 1
    })
}
