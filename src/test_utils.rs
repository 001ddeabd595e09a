//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases,
//! caller identities and catalog entries with sensible defaults.

use crate::{
    core::{
        catalog::{self, NewProduct},
        guard::{Actor, Role},
    },
    entities::{self, StockMovement, stock_movement},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, prelude::*};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Manager with global scope.
pub const fn manager() -> Actor {
    Actor::new(1, Role::Manager, None)
}

/// Admin bound to `branch_id`.
pub const fn admin(branch_id: i64) -> Actor {
    Actor::new(2, Role::Admin, Some(branch_id))
}

/// Cashier bound to `branch_id`.
pub const fn cashier(branch_id: i64) -> Actor {
    Actor::new(3, Role::Cashier, Some(branch_id))
}

/// Waiter bound to `branch_id`.
pub const fn waiter(branch_id: i64) -> Actor {
    Actor::new(4, Role::Waiter, Some(branch_id))
}

/// Creates an available dining table.
pub async fn create_test_table(
    db: &DatabaseConnection,
    number: i32,
    branch_id: Option<i64>,
) -> Result<entities::table::Model> {
    catalog::insert_table(db, number, branch_id).await
}

/// Creates an active product with the given price and opening stock.
pub async fn create_test_product(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock_qty: i32,
    branch_id: Option<i64>,
) -> Result<entities::product::Model> {
    let new_product = NewProduct {
        name: name.to_string(),
        price,
        stock_qty,
        branch_id,
    };
    catalog::insert_product(db, &new_product, catalog::SYSTEM_USER_ID).await
}

/// Current stock of a product.
pub async fn stock_of(db: &DatabaseConnection, product_id: i64) -> Result<i32> {
    entities::Product::find_by_id(product_id)
        .one(db)
        .await?
        .map(|p| p.stock_qty)
        .ok_or(Error::ProductNotFound { id: product_id })
}

/// Current status text of a table.
pub async fn table_status(db: &DatabaseConnection, table_id: i64) -> Result<String> {
    entities::DiningTable::find_by_id(table_id)
        .one(db)
        .await?
        .map(|t| t.status)
        .ok_or(Error::TableNotFound { id: table_id })
}

/// Every movement of a product, oldest first.
pub async fn movements_for_product(
    db: &DatabaseConnection,
    product_id: i64,
) -> Result<Vec<stock_movement::Model>> {
    StockMovement::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
