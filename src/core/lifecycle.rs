//! Order lifecycle - The mutating operations on orders.
//!
//! Every operation follows the same shape:
//! 1. role check against the guard, before any database access
//! 2. input validation
//! 3. one database transaction that re-reads the order (or table), checks branch
//!    scope and status, moves stock through the ledger, mutates lines, recomputes
//!    the total and commits
//!
//! Returning an error before `commit` drops the transaction, which rolls back every
//! stock change, movement row and line mutation made so far. Nothing read outside
//! the transaction is trusted for a decision inside it.
//!
//! Stock is reserved when a line is added and released when a line shrinks, is
//! removed, or the order is cancelled. Paying re-checks each product against the
//! order's branch and current stock, then records the sale.

use crate::{
    core::{
        guard::{self, Action, Actor},
        order as aggregate,
        stock::{self, StockContext},
    },
    entities::{order, product},
    errors::{Error, Result},
    models::{MovementType, NewOrder, OrderDetails, OrderStatus, ProductStatus, TableStatus},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{DatabaseTransaction, Set, TransactionTrait, prelude::*};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

const REASON_RESERVE: &str = "reserved for order";
const REASON_RELEASE: &str = "released from order";
const REASON_CANCEL: &str = "order cancelled";
const REASON_SALE: &str = "sale (order paid)";

/// Opens an order at an available table with its initial lines.
///
/// Each line is priced from the product's current price, its stock is reserved,
/// the total is computed and the table becomes occupied, all in one transaction.
///
/// # Errors
/// Returns an error if:
/// - The caller may not create orders, or the table is outside their branch
/// - `items` is empty, or any line has a non-positive quantity, an unknown,
///   inactive or other-branch product (`InvalidItems`)
/// - The table does not exist or is not available
/// - Any product lacks stock (`InsufficientStock`); no reservation survives
#[instrument(skip(db, new_order), fields(user_id = actor.id, table_id = new_order.table_id))]
pub async fn create_order(
    db: &DatabaseConnection,
    actor: &Actor,
    new_order: NewOrder,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderCreate)?;

    if new_order.items.is_empty() {
        return Err(Error::InvalidItems {
            message: "an order needs at least one item".to_string(),
        });
    }
    if let Some(line) = new_order.items.iter().find(|line| line.qty <= 0) {
        return Err(Error::InvalidItems {
            message: format!(
                "quantity {} for product {} must be greater than zero",
                line.qty, line.product_id
            ),
        });
    }

    let txn = db.begin().await?;

    let table = aggregate::find_table(&txn, new_order.table_id).await?;
    guard::ensure_in_scope(actor, Action::OrderCreate, table.branch_id)?;
    if table.status.parse::<TableStatus>()? != TableStatus::Available {
        warn!(table_id = table.id, "Table is not available");
        return Err(Error::TableNotAvailable { id: table.id });
    }

    let now = Utc::now();
    let order = order::ActiveModel {
        table_id: Set(table.id),
        branch_id: Set(table.branch_id),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        total: Set(Decimal::ZERO),
        notes: Set(new_order.notes.clone()),
        created_by_id: Set(actor.id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for line in &new_order.items {
        let product = match stock::find_product(&txn, line.product_id).await {
            Ok(product) => product,
            Err(Error::ProductNotFound { id }) => {
                return Err(Error::InvalidItems {
                    message: format!("product {id} does not exist"),
                });
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = ensure_sellable(&product, order.branch_id) {
            return Err(Error::InvalidItems {
                message: e.to_string(),
            });
        }

        stock::reserve(
            &txn,
            product.id,
            line.qty,
            StockContext::for_order(actor.id, order.id, REASON_RESERVE),
        )
        .await?;
        aggregate::insert_item(&txn, order.id, product.id, line.qty, product.price).await?;
    }

    let order = aggregate::recalc_total(&txn, order.id).await?;
    aggregate::set_table_status(&txn, table.id, TableStatus::Occupied).await?;

    let details = aggregate::load_details(&txn, order).await?;
    txn.commit().await?;

    info!(
        order_id = details.order.id,
        total = %details.order.total,
        lines = details.items.len(),
        "Order created"
    );
    Ok(details)
}

/// Adds a line to a pending order, reserving its stock at the current price.
///
/// # Errors
/// Returns an error if:
/// - The caller may not edit items, or the order is outside their branch
/// - `qty` is not positive
/// - The order does not exist or is no longer pending (`OrderNotEditable`)
/// - The product does not exist, is inactive, or belongs to another branch
/// - There is not enough stock (`InsufficientStock`); nothing changes
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn add_item(
    db: &DatabaseConnection,
    actor: &Actor,
    order_id: i64,
    product_id: i64,
    qty: i32,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderItemAdd)?;
    if qty <= 0 {
        return Err(Error::InvalidQuantity { quantity: qty });
    }

    let txn = db.begin().await?;
    let order = load_editable(&txn, actor, Action::OrderItemAdd, order_id).await?;

    let product = stock::find_product(&txn, product_id).await?;
    ensure_sellable(&product, order.branch_id)?;

    stock::reserve(
        &txn,
        product.id,
        qty,
        StockContext::for_order(actor.id, order.id, REASON_RESERVE),
    )
    .await?;
    aggregate::insert_item(&txn, order.id, product.id, qty, product.price).await?;

    let details = finish_edit(txn, order.id).await?;
    info!(order_id, product_id, qty, "Item added");
    Ok(details)
}

/// Sets a line's quantity, moving the difference through the stock ledger.
///
/// Growing a line reserves the extra units; shrinking it releases them. The
/// subtotal is recomputed from the line's snapshot price.
///
/// # Errors
/// Returns an error if:
/// - The caller may not edit items, or the order is outside their branch
/// - `qty` is not positive
/// - The order does not exist or is no longer pending (`OrderNotEditable`)
/// - The line does not belong to the order (`ItemNotFound`)
/// - Growing the line needs more stock than is on hand; the quantity is unchanged
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn update_item_quantity(
    db: &DatabaseConnection,
    actor: &Actor,
    order_id: i64,
    item_id: i64,
    qty: i32,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderItemUpdate)?;
    if qty <= 0 {
        return Err(Error::InvalidQuantity { quantity: qty });
    }

    let txn = db.begin().await?;
    let order = load_editable(&txn, actor, Action::OrderItemUpdate, order_id).await?;
    let item = aggregate::find_item_in_order(&txn, order.id, item_id).await?;

    let delta = qty - item.quantity;
    let ctx = StockContext::for_order(actor.id, order.id, REASON_RESERVE);
    if delta > 0 {
        stock::reserve(&txn, item.product_id, delta, ctx).await?;
    } else if delta < 0 {
        let ctx = StockContext {
            reason: REASON_RELEASE,
            ..ctx
        };
        stock::release(&txn, item.product_id, -delta, ctx).await?;
    }
    aggregate::set_item_quantity(&txn, item, qty).await?;

    let details = finish_edit(txn, order.id).await?;
    info!(order_id, item_id, qty, delta, "Item quantity updated");
    Ok(details)
}

/// Removes a line from a pending order and releases its stock.
///
/// # Errors
/// Returns an error if:
/// - The caller may not edit items, or the order is outside their branch
/// - The order does not exist or is no longer pending (`OrderNotEditable`)
/// - The line does not belong to the order (`ItemNotFound`)
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn remove_item(
    db: &DatabaseConnection,
    actor: &Actor,
    order_id: i64,
    item_id: i64,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderItemRemove)?;

    let txn = db.begin().await?;
    let order = load_editable(&txn, actor, Action::OrderItemRemove, order_id).await?;
    let item = aggregate::find_item_in_order(&txn, order.id, item_id).await?;

    stock::release(
        &txn,
        item.product_id,
        item.quantity,
        StockContext::for_order(actor.id, order.id, REASON_RELEASE),
    )
    .await?;
    item.delete(&txn).await?;

    let details = finish_edit(txn, order.id).await?;
    info!(order_id, item_id, "Item removed");
    Ok(details)
}

/// Settles a pending order.
///
/// Stock for every line was reserved when the line was added, so this does not
/// decrement again. It re-checks that each product still belongs to the order's
/// branch and that its current stock covers the order's quantity of it, records
/// one sale `OUT` movement per line, marks the order `PAID` and frees the table.
///
/// # Errors
/// Returns an error if:
/// - The caller may not pay orders, or the order is outside their branch
/// - The order does not exist or is not pending (`NotPending`)
/// - A product moved to another branch (`ProductBranchMismatch`)
/// - A product's stock no longer covers the order (`InsufficientStock`, naming it);
///   the order stays pending and nothing is recorded
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn pay(db: &DatabaseConnection, actor: &Actor, order_id: i64) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderPay)?;

    let txn = db.begin().await?;
    let order = load_pending(&txn, actor, Action::OrderPay, order_id).await?;
    let items = aggregate::items_for_order(&txn, order.id).await?;

    let mut required: BTreeMap<i64, i32> = BTreeMap::new();
    for item in &items {
        *required.entry(item.product_id).or_default() += item.quantity;
    }

    let mut products = BTreeMap::new();
    for (&product_id, &quantity) in &required {
        let product = stock::find_product(&txn, product_id).await?;
        if product.branch_id != order.branch_id {
            return Err(Error::ProductBranchMismatch {
                product_id,
                order_branch: order.branch_id,
            });
        }
        if product.stock_qty < quantity {
            warn!(
                order_id,
                product_id,
                available = product.stock_qty,
                requested = quantity,
                "Payment rejected: insufficient stock"
            );
            return Err(Error::InsufficientStock {
                product_id,
                name: product.name,
                available: product.stock_qty,
                requested: quantity,
            });
        }
        products.insert(product_id, product);
    }

    for item in &items {
        if let Some(product) = products.get(&item.product_id) {
            stock::record_movement(
                &txn,
                product,
                MovementType::Out,
                item.quantity,
                StockContext::for_order(actor.id, order.id, REASON_SALE),
            )
            .await?;
        }
    }

    let details = close_order(txn, order, OrderStatus::Paid).await?;
    info!(order_id, total = %details.order.total, "Order paid");
    Ok(details)
}

/// Cancels a pending order, returning every line's stock and freeing the table.
///
/// # Errors
/// Returns an error if:
/// - The caller may not cancel orders, or the order is outside their branch
/// - The order does not exist or is not pending (`NotPending`)
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn cancel(db: &DatabaseConnection, actor: &Actor, order_id: i64) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderCancel)?;

    let txn = db.begin().await?;
    let order = load_pending(&txn, actor, Action::OrderCancel, order_id).await?;

    for item in aggregate::items_for_order(&txn, order.id).await? {
        stock::release(
            &txn,
            item.product_id,
            item.quantity,
            StockContext::for_order(actor.id, order.id, REASON_CANCEL),
        )
        .await?;
    }

    let details = close_order(txn, order, OrderStatus::Cancelled).await?;
    info!(order_id, "Order cancelled");
    Ok(details)
}

/// Generic status entry point.
///
/// `PAID` behaves as [`pay`] and `CANCELLED` as [`cancel`]. Asking for `PENDING`
/// on a pending order changes nothing; on a settled or cancelled order it is an
/// `InvalidTransition`.
#[instrument(skip(db), fields(user_id = actor.id))]
pub async fn set_status(
    db: &DatabaseConnection,
    actor: &Actor,
    order_id: i64,
    target: OrderStatus,
) -> Result<OrderDetails> {
    guard::ensure_permitted(actor, Action::OrderStatusSet)?;

    match target {
        OrderStatus::Paid => pay(db, actor, order_id).await,
        OrderStatus::Cancelled => cancel(db, actor, order_id).await,
        OrderStatus::Pending => {
            let order = aggregate::find_order(db, order_id).await?;
            guard::ensure_in_scope(actor, Action::OrderStatusSet, order.branch_id)?;
            if aggregate::status_of(&order)? == OrderStatus::Pending {
                aggregate::load_details(db, order).await
            } else {
                Err(Error::InvalidTransition {
                    id: order.id,
                    from: order.status,
                    to: target.as_str().to_string(),
                })
            }
        }
    }
}

/// Products must be active and sold by the order's branch.
fn ensure_sellable(product: &product::Model, order_branch: Option<i64>) -> Result<()> {
    if product.status.parse::<ProductStatus>()? != ProductStatus::Active {
        return Err(Error::ProductInactive {
            id: product.id,
            name: product.name.clone(),
        });
    }
    if product.branch_id != order_branch {
        return Err(Error::ProductBranchMismatch {
            product_id: product.id,
            order_branch,
        });
    }
    Ok(())
}

/// Reads the order inside the transaction, checks scope, then editability.
async fn load_editable(
    txn: &DatabaseTransaction,
    actor: &Actor,
    action: Action,
    order_id: i64,
) -> Result<order::Model> {
    let order = aggregate::find_order(txn, order_id).await?;
    guard::ensure_in_scope(actor, action, order.branch_id)?;
    aggregate::ensure_editable(&order)?;
    Ok(order)
}

/// Reads the order inside the transaction, checks scope, then that it is pending.
async fn load_pending(
    txn: &DatabaseTransaction,
    actor: &Actor,
    action: Action,
    order_id: i64,
) -> Result<order::Model> {
    let order = aggregate::find_order(txn, order_id).await?;
    guard::ensure_in_scope(actor, action, order.branch_id)?;
    aggregate::ensure_pending(&order)?;
    Ok(order)
}

/// Recomputes the total after a line mutation and commits.
async fn finish_edit(txn: DatabaseTransaction, order_id: i64) -> Result<OrderDetails> {
    let order = aggregate::recalc_total(&txn, order_id).await?;
    let details = aggregate::load_details(&txn, order).await?;
    txn.commit().await?;
    Ok(details)
}

/// Moves a pending order to a terminal status, frees its table and commits.
async fn close_order(
    txn: DatabaseTransaction,
    order: order::Model,
    status: OrderStatus,
) -> Result<OrderDetails> {
    let table_id = order.table_id;
    let order = aggregate::set_order_status(&txn, order, status).await?;
    aggregate::set_table_status(&txn, table_id, TableStatus::Available).await?;
    let details = aggregate::load_details(&txn, order).await?;
    txn.commit().await?;
    Ok(details)
}
