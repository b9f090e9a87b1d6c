//! Database service for gst-invoicing-service.

use crate::error::InvoiceError;
use crate::models::{
    ChangeType, Invoice, InvoiceWithItems, LineItem, NewCustomer, NewInvoice, NewLineItem,
    Product, StockMovement,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Result of a committed invoice transaction.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    pub invoice_id: i64,
    pub customer_id: i64,
    /// Names of the products on the invoice, read under the stock lock.
    pub product_names: HashMap<i64, String>,
}

fn persistence(context: &str, e: sqlx::Error) -> InvoiceError {
    InvoiceError::Persistence(anyhow::anyhow!("Failed to {}: {}", context, e))
}

fn is_lock_timeout(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "gst-invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Invoice Transaction
    // -------------------------------------------------------------------------

    /// Persist an invoice and deduct its stock as one transaction.
    ///
    /// Either every row (customer, header, items, stock updates, movements) is
    /// committed, or none is. Stock is checked per item under a row lock.
    #[instrument(
        skip(self, invoice),
        fields(
            invoice_number = ?invoice.header.invoice_number,
            item_count = invoice.items.len()
        )
    )]
    pub async fn create_invoice(
        &self,
        invoice: &NewInvoice,
        lock_timeout: Duration,
    ) -> Result<CreatedInvoice, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| persistence("begin transaction", e))?;

        let created = match write_invoice(&mut tx, invoice, lock_timeout).await {
            Ok(created) => created,
            Err(e) => {
                tx.rollback().await.ok();
                timer.observe_duration();
                warn!(error_kind = e.kind(), error = %e, "Invoice transaction rolled back");
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| persistence("commit transaction", e))?;

        timer.observe_duration();

        info!(
            invoice_id = created.invoice_id,
            customer_id = created.customer_id,
            total_amount = %invoice.header.total_amount,
            "Invoice committed"
        );

        Ok(created)
    }

    // -------------------------------------------------------------------------
    // Read Operations
    // -------------------------------------------------------------------------

    /// Get an invoice header by ID.
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, customer_id, invoice_date, place_of_supply,
                   vehicle_number, subtotal, gst_percentage, gst_amount, cgst_amount,
                   sgst_amount, discount_type, discount_value, transport_charge, total_amount,
                   payment_type, advance_amount, created_by, created_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("get invoice", e))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get an invoice with its line items in entry order.
    #[instrument(skip(self))]
    pub async fn get_invoice_with_items(
        &self,
        invoice_id: i64,
    ) -> Result<Option<InvoiceWithItems>, InvoiceError> {
        let Some(invoice) = self.get_invoice(invoice_id).await? else {
            return Ok(None);
        };

        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT item_id, invoice_id, product_id, hsn_code, quantity, unit, rate,
                   gst_percentage, base_amount, total_with_gst, sort_order
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY sort_order, item_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("list invoice items", e))?;

        timer.observe_duration();

        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    /// Get a product by ID.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i64) -> Result<Option<Product>, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, name, hsn_code, unit, rate, gst_percentage, stock_quantity,
                   created_utc, updated_utc
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("get product", e))?;

        timer.observe_duration();

        Ok(product)
    }

    /// A product's stock audit log, newest first.
    #[instrument(skip(self))]
    pub async fn list_stock_movements(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<StockMovement>, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_stock_movements"])
            .start_timer();

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT movement_id, product_id, change_type, quantity_changed, old_stock,
                   new_stock, reason, reference_id, updated_by, created_utc
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY created_utc DESC, movement_id DESC
            LIMIT $2
            "#,
        )
        .bind(product_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("list stock movements", e))?;

        timer.observe_duration();

        Ok(movements)
    }
}

/// Steps 1-4 of the invoice transaction. The caller commits or rolls back.
async fn write_invoice(
    conn: &mut PgConnection,
    invoice: &NewInvoice,
    lock_timeout: Duration,
) -> Result<CreatedInvoice, InvoiceError> {
    // Transaction-local, equivalent to SET LOCAL.
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout.as_millis()))
        .execute(&mut *conn)
        .await
        .map_err(|e| persistence("set lock timeout", e))?;

    let customer_id = resolve_customer(conn, &invoice.customer).await?;
    let invoice_id = insert_header(conn, customer_id, invoice).await?;

    for (sort_order, item) in invoice.items.iter().enumerate() {
        insert_line_item(conn, invoice_id, sort_order as i32, item).await?;
    }

    // Second pass. Ascending product order keeps lock acquisition consistent
    // across concurrent invoices that share products.
    let mut ordered: Vec<&NewLineItem> = invoice.items.iter().collect();
    ordered.sort_by_key(|item| item.product_id);

    let reason = invoice.stock_reason(invoice_id);
    let mut product_names = HashMap::new();
    for item in ordered {
        let name = deduct_stock(conn, item, invoice_id, &reason, &invoice.created_by).await?;
        product_names.insert(item.product_id, name);
    }

    Ok(CreatedInvoice {
        invoice_id,
        customer_id,
        product_names,
    })
}

/// Find a customer by GST number or create one.
///
/// Customers without a GST number are never matched; each gets a new row.
async fn resolve_customer(
    conn: &mut PgConnection,
    customer: &NewCustomer,
) -> Result<i64, InvoiceError> {
    let Some(gst_number) = customer.gst_number.as_deref() else {
        let customer_id = insert_customer(conn, customer, false)
            .await?
            .ok_or_else(|| {
                InvoiceError::Persistence(anyhow::anyhow!("Customer insert returned no row"))
            })?;
        debug!(customer_id, "Created walk-in customer");
        return Ok(customer_id);
    };

    if let Some(customer_id) = find_customer_by_gst(conn, gst_number).await? {
        debug!(customer_id, "Reusing customer by GST number");
        return Ok(customer_id);
    }

    if let Some(customer_id) = insert_customer(conn, customer, true).await? {
        debug!(customer_id, "Created customer");
        return Ok(customer_id);
    }

    // A concurrent invoice inserted the same GST number first.
    find_customer_by_gst(conn, gst_number).await?.ok_or_else(|| {
        InvoiceError::Persistence(anyhow::anyhow!(
            "Customer with GST number {} vanished after conflict",
            gst_number
        ))
    })
}

async fn find_customer_by_gst(
    conn: &mut PgConnection,
    gst_number: &str,
) -> Result<Option<i64>, InvoiceError> {
    sqlx::query_scalar::<_, i64>("SELECT customer_id FROM customers WHERE gst_number = $1")
        .bind(gst_number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| persistence("look up customer", e))
}

async fn insert_customer(
    conn: &mut PgConnection,
    customer: &NewCustomer,
    keyed_by_gst: bool,
) -> Result<Option<i64>, InvoiceError> {
    let sql = if keyed_by_gst {
        r#"
        INSERT INTO customers (name, mobile, gst_number, address, state, pincode, place_of_supply, vehicle_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (gst_number) WHERE gst_number IS NOT NULL DO NOTHING
        RETURNING customer_id
        "#
    } else {
        r#"
        INSERT INTO customers (name, mobile, gst_number, address, state, pincode, place_of_supply, vehicle_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING customer_id
        "#
    };

    sqlx::query_scalar::<_, i64>(sql)
        .bind(&customer.name)
        .bind(&customer.mobile)
        .bind(&customer.gst_number)
        .bind(&customer.address)
        .bind(&customer.state)
        .bind(&customer.pincode)
        .bind(&customer.place_of_supply)
        .bind(&customer.vehicle_number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| persistence("create customer", e))
}

async fn insert_header(
    conn: &mut PgConnection,
    customer_id: i64,
    invoice: &NewInvoice,
) -> Result<i64, InvoiceError> {
    let header = &invoice.header;
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO invoices (
            invoice_number, customer_id, invoice_date, place_of_supply, vehicle_number,
            subtotal, gst_percentage, gst_amount, cgst_amount, sgst_amount,
            discount_type, discount_value, transport_charge, total_amount,
            payment_type, advance_amount, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING invoice_id
        "#,
    )
    .bind(&header.invoice_number)
    .bind(customer_id)
    .bind(header.invoice_date)
    .bind(&header.place_of_supply)
    .bind(&header.vehicle_number)
    .bind(header.subtotal)
    .bind(header.gst_percentage)
    .bind(header.gst_amount)
    .bind(header.cgst_amount)
    .bind(header.sgst_amount)
    .bind(header.discount_type.as_str())
    .bind(header.discount_value)
    .bind(header.transport_charge)
    .bind(header.total_amount)
    .bind(header.payment_type.as_str())
    .bind(header.advance_amount)
    .bind(&invoice.created_by)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| persistence("create invoice", e))
}

async fn insert_line_item(
    conn: &mut PgConnection,
    invoice_id: i64,
    sort_order: i32,
    item: &NewLineItem,
) -> Result<(), InvoiceError> {
    sqlx::query(
        r#"
        INSERT INTO invoice_items (
            invoice_id, product_id, hsn_code, quantity, unit, rate,
            gst_percentage, base_amount, total_with_gst, sort_order
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(invoice_id)
    .bind(item.product_id)
    .bind(&item.hsn_code)
    .bind(item.quantity)
    .bind(&item.unit)
    .bind(item.rate)
    .bind(item.gst_percentage)
    .bind(item.base_amount)
    .bind(item.total_with_gst)
    .bind(sort_order)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            InvoiceError::ProductNotFound {
                product_id: item.product_id,
            }
        }
        _ => persistence("create line item", e),
    })?;

    Ok(())
}

/// Lock the product row, deduct the item's quantity and record the movement.
/// Returns the product name.
async fn deduct_stock(
    conn: &mut PgConnection,
    item: &NewLineItem,
    invoice_id: i64,
    reason: &str,
    updated_by: &str,
) -> Result<String, InvoiceError> {
    // NO KEY: the line-item foreign keys already hold KEY SHARE on this row,
    // and FOR UPDATE would conflict with a concurrent invoice's KEY SHARE.
    let locked = sqlx::query_as::<_, (String, Decimal)>(
        "SELECT name, stock_quantity FROM products WHERE product_id = $1 FOR NO KEY UPDATE",
    )
    .bind(item.product_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        if is_lock_timeout(&e) {
            InvoiceError::Persistence(anyhow::anyhow!(
                "Timed out waiting for stock lock on product {}",
                item.product_id
            ))
        } else {
            persistence("lock product stock", e)
        }
    })?;

    let Some((name, current)) = locked else {
        return Err(InvoiceError::ProductNotFound {
            product_id: item.product_id,
        });
    };

    let remaining = current - item.quantity;
    if remaining < Decimal::ZERO {
        return Err(InvoiceError::InsufficientStock {
            product_id: item.product_id,
            requested: item.quantity,
            available: current,
        });
    }

    sqlx::query("UPDATE products SET stock_quantity = $1, updated_utc = NOW() WHERE product_id = $2")
        .bind(remaining)
        .bind(item.product_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| persistence("update product stock", e))?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            product_id, change_type, quantity_changed, old_stock, new_stock,
            reason, reference_id, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(item.product_id)
    .bind(ChangeType::Out.as_str())
    .bind(item.quantity)
    .bind(current)
    .bind(remaining)
    .bind(reason)
    .bind(invoice_id)
    .bind(updated_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| persistence("record stock movement", e))?;

    debug!(
        product_id = item.product_id,
        old_stock = %current,
        new_stock = %remaining,
        "Stock deducted"
    );

    Ok(name)
}
