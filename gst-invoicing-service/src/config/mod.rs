//! Configuration module for gst-invoicing-service.

use crate::models::{DiscountType, PaymentType};
use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub documents: DocumentConfig,
    pub invoicing: InvoicingRules,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound for the whole invoice transaction, lock waits included.
    pub transaction_timeout: Duration,
    /// Upper bound for a single row-lock wait inside the transaction.
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub storage_path: String,
}

#[derive(Debug, Clone)]
pub struct InvoicingRules {
    /// Reject invoices whose figures disagree with server-side recomputation.
    pub strict_totals: bool,
    pub totals_tolerance: Decimal,
    pub defaults: FieldDefaults,
}

/// Values substituted for optional request fields the caller leaves out.
///
/// Numeric summary fields not listed here default to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefaults {
    pub discount_type: DiscountType,
    pub payment_type: PaymentType,
    pub created_by: String,
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            discount_type: DiscountType::Percentage,
            payment_type: PaymentType::Cash,
            created_by: "1".to_string(),
        }
    }
}

impl Default for InvoicingRules {
    fn default() -> Self {
        Self {
            strict_totals: false,
            totals_tolerance: Decimal::new(1, 2),
            defaults: FieldDefaults::default(),
        }
    }
}

impl InvoicingConfig {
    /// Configuration with every optional setting at its default.
    pub fn with_database_url(url: impl Into<String>) -> Self {
        Self {
            common: core_config::Config { port: 8080 },
            service_name: "gst-invoicing-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: url.into(),
                max_connections: 10,
                min_connections: 2,
                transaction_timeout: Duration::from_millis(15_000),
                lock_timeout: Duration::from_millis(5_000),
            },
            documents: DocumentConfig {
                storage_path: "storage".to_string(),
            },
            invoicing: InvoicingRules::default(),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let defaults = FieldDefaults::default();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "gst-invoicing-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2)?,
                transaction_timeout: Duration::from_millis(parse_env(
                    "TRANSACTION_TIMEOUT_MS",
                    15_000,
                )?),
                lock_timeout: Duration::from_millis(parse_env("LOCK_TIMEOUT_MS", 5_000)?),
            },
            documents: DocumentConfig {
                storage_path: env::var("DOCUMENT_STORAGE_PATH")
                    .unwrap_or_else(|_| "storage".to_string()),
            },
            invoicing: InvoicingRules {
                strict_totals: parse_env("STRICT_TOTALS", false)?,
                totals_tolerance: parse_env("TOTALS_TOLERANCE", Decimal::new(1, 2))?,
                defaults: FieldDefaults {
                    created_by: env::var("DEFAULT_CREATED_BY")
                        .ok()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or(defaults.created_by),
                    ..defaults
                },
            },
        })
    }
}

/// Reads an optional variable, failing loudly on a present-but-malformed value.
fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e))
    })
}
