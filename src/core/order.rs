//! Order aggregate - Order rows, their lines, and the derived total.
//!
//! The helpers here are the building blocks the lifecycle operations compose inside
//! one database transaction. They take any [`ConnectionTrait`] so the same code runs
//! against a `DatabaseTransaction` or a plain connection. The read operations at the
//! bottom (`get_order`, `list_orders`) are the branch-scoped query surface.

use crate::{
    core::guard::{self, Action, Actor},
    entities::{DiningTable, Order, OrderItem, order, order_item, table},
    errors::{Error, Result},
    models::{OrderDetails, OrderFilter, OrderStatus, TableStatus},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// `unit_price * quantity`, rounded to cents.
///
/// Fails with `Validation` when the product does not fit a `Decimal`.
pub fn line_subtotal(unit_price: Decimal, quantity: i32) -> Result<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(|subtotal| subtotal.round_dp(2))
        .ok_or_else(|| Error::Validation {
            message: format!("Subtotal of {quantity} x {unit_price} is out of range"),
        })
}

/// Loads an order, failing with `OrderNotFound` when absent.
pub async fn find_order<C>(db: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or(Error::OrderNotFound { id: order_id })
}

/// Loads a dining table, failing with `TableNotFound` when absent.
pub async fn find_table<C>(db: &C, table_id: i64) -> Result<table::Model>
where
    C: ConnectionTrait,
{
    DiningTable::find_by_id(table_id)
        .one(db)
        .await?
        .ok_or(Error::TableNotFound { id: table_id })
}

/// Typed status of a stored order.
pub fn status_of(order: &order::Model) -> Result<OrderStatus> {
    order.status.parse()
}

/// Lines may only change while the order is pending.
pub fn ensure_editable(order: &order::Model) -> Result<()> {
    if status_of(order)?.is_terminal() {
        return Err(Error::OrderNotEditable {
            id: order.id,
            status: order.status.clone(),
        });
    }
    Ok(())
}

/// Pay and cancel require a pending order.
pub fn ensure_pending(order: &order::Model) -> Result<()> {
    if status_of(order)?.is_terminal() {
        return Err(Error::NotPending {
            id: order.id,
            status: order.status.clone(),
        });
    }
    Ok(())
}

/// All lines of an order, in insertion order.
pub async fn items_for_order<C>(db: &C, order_id: i64) -> Result<Vec<order_item::Model>>
where
    C: ConnectionTrait,
{
    OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads one line, failing with `ItemNotFound` unless it belongs to `order_id`.
pub async fn find_item_in_order<C>(
    db: &C,
    order_id: i64,
    item_id: i64,
) -> Result<order_item::Model>
where
    C: ConnectionTrait,
{
    OrderItem::find_by_id(item_id)
        .one(db)
        .await?
        .filter(|item| item.order_id == order_id)
        .ok_or(Error::ItemNotFound { order_id, item_id })
}

/// Inserts a line with a price snapshot.
pub async fn insert_item<C>(
    db: &C,
    order_id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
) -> Result<order_item::Model>
where
    C: ConnectionTrait,
{
    order_item::ActiveModel {
        order_id: Set(order_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        unit_price: Set(unit_price),
        subtotal: Set(line_subtotal(unit_price, quantity)?),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Changes a line's quantity and recomputes its subtotal from the snapshot price.
pub async fn set_item_quantity<C>(
    db: &C,
    item: order_item::Model,
    quantity: i32,
) -> Result<order_item::Model>
where
    C: ConnectionTrait,
{
    let subtotal = line_subtotal(item.unit_price, quantity)?;
    let mut active: order_item::ActiveModel = item.into();
    active.quantity = Set(quantity);
    active.subtotal = Set(subtotal);
    active.update(db).await.map_err(Into::into)
}

/// Re-sums the order's line subtotals and stores the result as its total.
///
/// Writes nothing but `total` (and `updated_at`); calling it twice in a row
/// yields the same total.
pub async fn recalc_total<C>(db: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let order = find_order(db, order_id).await?;
    let total = items_for_order(db, order_id)
        .await?
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.subtotal))
        .ok_or_else(|| Error::Validation {
            message: format!("Total of order {order_id} is out of range"),
        })?
        .round_dp(2);

    let mut active: order::ActiveModel = order.into();
    active.total = Set(total);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;
    debug!(order_id, %total, "Order total recalculated");
    Ok(updated)
}

/// Writes a new order status.
pub async fn set_order_status<C>(
    db: &C,
    order: order::Model,
    status: OrderStatus,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let mut active: order::ActiveModel = order.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Writes a new table occupancy status.
pub async fn set_table_status<C>(
    db: &C,
    table_id: i64,
    status: TableStatus,
) -> Result<table::Model>
where
    C: ConnectionTrait,
{
    let table = find_table(db, table_id).await?;
    let mut active: table::ActiveModel = table.into();
    active.status = Set(status.as_str().to_string());
    active.update(db).await.map_err(Into::into)
}

/// Bundles an order with its current lines.
pub async fn load_details<C>(db: &C, order: order::Model) -> Result<OrderDetails>
where
    C: ConnectionTrait,
{
    let items = items_for_order(db, order.id).await?;
    Ok(OrderDetails { order, items })
}

/// Fetches one order with its lines, within the caller's branch scope.
pub async fn get_order(
    db: &DatabaseConnection,
    actor: &Actor,
    order_id: i64,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderView)?;
    let order = find_order(db, order_id).await?;
    guard::ensure_in_scope(actor, Action::OrderView, order.branch_id)?;
    load_details(db, order).await
}

/// Lists orders newest first, optionally filtered by table and status.
///
/// MANAGER sees every branch; everyone else sees only their own.
pub async fn list_orders(
    db: &DatabaseConnection,
    actor: &Actor,
    filter: OrderFilter,
) -> Result<Vec<order::Model>> {
    guard::ensure_permitted(actor, Action::OrderView)?;
    let branch = guard::visible_branch(actor, Action::OrderView)?;

    let mut query = Order::find();
    if let Some(branch_id) = branch {
        query = query.filter(order::Column::BranchId.eq(branch_id));
    }
    if let Some(table_id) = filter.table_id {
        query = query.filter(order::Column::TableId.eq(table_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(order::Column::Status.eq(status.as_str()));
    }

    query
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
