//! Catalog configuration loading from config.toml
//!
//! The tables and products listed in config.toml are used to seed the database
//! on first run or when entries are missing. The same file carries the stock
//! settings used by the inventory summary.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
pub struct CatalogConfig {
    /// Stock settings
    #[serde(default)]
    pub stock: StockSettings,
    /// Dining tables to seed
    #[serde(default)]
    pub tables: Vec<TableSeed>,
    /// Products to seed
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

/// Inventory settings
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct StockSettings {
    /// Active products strictly below this many units are reported as low
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

const fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

/// Configuration for a single dining table
#[derive(Debug, Deserialize, Clone)]
pub struct TableSeed {
    /// Number on the floor plan
    pub number: i32,
    /// Branch the table belongs to
    pub branch_id: i64,
}

/// Configuration for a single product
#[derive(Debug, Deserialize, Clone)]
pub struct ProductSeed {
    /// Product name, unique per branch
    pub name: String,
    /// Catalog price, written as a string (e.g. `"12.50"`)
    pub price: Decimal,
    /// Opening stock
    #[serde(default)]
    pub stock_qty: i32,
    /// Branch that sells the product
    pub branch_id: i64,
}

/// Loads catalog configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CatalogConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses catalog configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<CatalogConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads catalog configuration from `POS_CONFIG_PATH`, or ./config.toml when unset.
pub fn load_default_config() -> Result<CatalogConfig> {
    let path = std::env::var("POS_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}
