//! Stock ledger - Owns product quantities and the movement log.
//!
//! [`reserve`] and [`release`] take any [`ConnectionTrait`] so they run inside the
//! caller's database transaction: the stock change, its movement row and whatever
//! order mutation triggered them commit or roll back together. Decrements are
//! conditional updates (`stock_qty >= n` in the WHERE clause), so the sufficiency
//! check and the write happen in one statement and a concurrent writer can never
//! push stock below zero.

use crate::{
    core::guard::{self, Action, Actor},
    entities::{Product, StockMovement, product, stock_movement},
    errors::{Error, Result},
    models::{BranchStock, LowStockEntry, MovementType, ProductStatus, StockLevel, StockSummary},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument, warn};

const DEFAULT_MOVEMENT_LIMIT: u64 = 50;

/// Who caused a stock change, and why.
#[derive(Debug, Clone, Copy)]
pub struct StockContext<'a> {
    /// User whose operation moved the stock
    pub actor_id: i64,
    /// Order event behind the movement, if any
    pub order_id: Option<i64>,
    /// Free-text reason stored on the movement
    pub reason: &'a str,
}

impl<'a> StockContext<'a> {
    /// Movement caused by an order event.
    #[must_use]
    pub const fn for_order(actor_id: i64, order_id: i64, reason: &'a str) -> Self {
        Self {
            actor_id,
            order_id: Some(order_id),
            reason,
        }
    }

    /// Movement not tied to any order.
    #[must_use]
    pub const fn manual(actor_id: i64, reason: &'a str) -> Self {
        Self {
            actor_id,
            order_id: None,
            reason,
        }
    }
}

/// Loads a product, failing with `ProductNotFound` when absent.
pub async fn find_product<C>(db: &C, product_id: i64) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    Product::find_by_id(product_id)
        .one(db)
        .await?
        .ok_or(Error::ProductNotFound { id: product_id })
}

/// Takes `quantity` units out of stock and appends an `OUT` movement.
///
/// Fails with `InsufficientStock` when fewer than `quantity` units are on hand,
/// leaving the product untouched.
pub async fn reserve<C>(
    db: &C,
    product_id: i64,
    quantity: i32,
    ctx: StockContext<'_>,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(Error::InvalidQuantity { quantity });
    }

    let product = find_product(db, product_id).await?;

    let result = Product::update_many()
        .col_expr(
            product::Column::StockQty,
            Expr::col(product::Column::StockQty).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StockQty.gte(quantity))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        warn!(
            product_id,
            available = product.stock_qty,
            requested = quantity,
            "Insufficient stock"
        );
        return Err(Error::InsufficientStock {
            product_id,
            name: product.name,
            available: product.stock_qty,
            requested: quantity,
        });
    }

    record_movement(db, &product, MovementType::Out, quantity, ctx).await?;
    debug!(product_id, quantity, "Reserved stock");
    find_product(db, product_id).await
}

/// Puts `quantity` units back into stock and appends an `IN` movement.
pub async fn release<C>(
    db: &C,
    product_id: i64,
    quantity: i32,
    ctx: StockContext<'_>,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(Error::InvalidQuantity { quantity });
    }

    let product = find_product(db, product_id).await?;

    Product::update_many()
        .col_expr(
            product::Column::StockQty,
            Expr::col(product::Column::StockQty).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(db)
        .await?;

    record_movement(db, &product, MovementType::In, quantity, ctx).await?;
    debug!(product_id, quantity, "Released stock");
    find_product(db, product_id).await
}

/// Applies a signed correction and appends an `ADJUST` movement.
///
/// Fails with `NegativeStock` when the result would drop below zero, and with
/// `Validation` when it would not fit the stock column.
pub(crate) async fn apply_adjustment<C>(
    db: &C,
    product: &product::Model,
    delta: i32,
    ctx: StockContext<'_>,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    let wide_delta = i64::from(delta);
    let target = i64::from(product.stock_qty) + wide_delta;
    if target < 0 {
        return Err(Error::NegativeStock {
            product_id: product.id,
            current: product.stock_qty,
            delta,
        });
    }
    if target > i64::from(i32::MAX) {
        return Err(Error::Validation {
            message: format!(
                "Adjusting product {} by {delta} would exceed the maximum stock of {}",
                product.id,
                i32::MAX
            ),
        });
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::StockQty,
            Expr::col(product::Column::StockQty).add(wide_delta),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product.id))
        .filter(product::Column::StockQty.gte(-wide_delta))
        .filter(product::Column::StockQty.lte(i64::from(i32::MAX) - wide_delta))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::NegativeStock {
            product_id: product.id,
            current: product.stock_qty,
            delta,
        });
    }

    record_movement(db, product, MovementType::Adjust, delta, ctx).await?;
    find_product(db, product.id).await
}

/// Appends one movement row. Movements are never updated or deleted.
pub(crate) async fn record_movement<C>(
    db: &C,
    product: &product::Model,
    movement_type: MovementType,
    quantity: i32,
    ctx: StockContext<'_>,
) -> Result<stock_movement::Model>
where
    C: ConnectionTrait,
{
    stock_movement::ActiveModel {
        movement_type: Set(movement_type.as_str().to_string()),
        quantity: Set(quantity),
        reason: Set(Some(ctx.reason.to_string())),
        product_id: Set(product.id),
        branch_id: Set(product.branch_id),
        created_by_id: Set(ctx.actor_id),
        order_id: Set(ctx.order_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Manual stock correction by `delta` units.
///
/// CASHIER, ADMIN and MANAGER may adjust; everyone but MANAGER only within their
/// own branch.
///
/// # Errors
/// Returns an error if:
/// - The caller's role may not adjust stock, or the product is outside their branch
/// - `delta` is zero
/// - The product does not exist
/// - The adjustment would leave negative stock
#[instrument(skip(db, reason), fields(user_id = actor.id))]
pub async fn adjust_stock(
    db: &DatabaseConnection,
    actor: &Actor,
    product_id: i64,
    delta: i32,
    reason: &str,
) -> Result<product::Model> {
    guard::ensure_permitted(actor, Action::StockAdjust)?;
    if delta == 0 {
        return Err(Error::InvalidQuantity { quantity: delta });
    }

    let txn = db.begin().await?;

    let product = find_product(&txn, product_id).await?;
    guard::ensure_in_scope(actor, Action::StockAdjust, product.branch_id)?;

    let reason = if reason.trim().is_empty() {
        "manual adjustment"
    } else {
        reason.trim()
    };
    let updated =
        apply_adjustment(&txn, &product, delta, StockContext::manual(actor.id, reason)).await?;

    txn.commit().await?;
    info!(
        product_id,
        delta,
        stock_qty = updated.stock_qty,
        "Stock adjusted"
    );
    Ok(updated)
}

/// Lists stock movements, newest first.
///
/// ADMIN and MANAGER only; an ADMIN sees their own branch. `limit` defaults to 50.
pub async fn list_stock_movements(
    db: &DatabaseConnection,
    actor: &Actor,
    product_id: Option<i64>,
    limit: Option<u64>,
) -> Result<Vec<stock_movement::Model>> {
    guard::ensure_permitted(actor, Action::StockView)?;
    let branch = guard::visible_branch(actor, Action::StockView)?;

    let mut query = StockMovement::find();
    if let Some(product_id) = product_id {
        query = query.filter(stock_movement::Column::ProductId.eq(product_id));
    }
    if let Some(branch_id) = branch {
        query = query.filter(stock_movement::Column::BranchId.eq(branch_id));
    }

    query
        .order_by_desc(stock_movement::Column::CreatedAt)
        .order_by_desc(stock_movement::Column::Id)
        .limit(limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT))
        .all(db)
        .await
        .map_err(Into::into)
}

/// All movements recorded against one order, oldest first.
pub async fn get_movements_for_order<C>(
    db: &C,
    order_id: i64,
) -> Result<Vec<stock_movement::Model>>
where
    C: ConnectionTrait,
{
    StockMovement::find()
        .filter(stock_movement::Column::OrderId.eq(order_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Inventory overview for the caller's scope.
///
/// Counts active products, sums units on hand, and lists active products with
/// fewer than `low_stock_threshold` units, lowest first.
pub async fn stock_summary(
    db: &DatabaseConnection,
    actor: &Actor,
    low_stock_threshold: i32,
) -> Result<StockSummary> {
    guard::ensure_permitted(actor, Action::StockView)?;
    let branch = guard::visible_branch(actor, Action::StockView)?;

    let mut query = Product::find();
    if let Some(branch_id) = branch {
        query = query.filter(product::Column::BranchId.eq(branch_id));
    }
    let products = query
        .order_by_asc(product::Column::StockQty)
        .order_by_asc(product::Column::Id)
        .all(db)
        .await?;

    let total_units: i64 = products.iter().map(|p| i64::from(p.stock_qty)).sum();
    let active: Vec<&product::Model> = products
        .iter()
        .filter(|p| p.status == ProductStatus::Active.as_str())
        .collect();
    let low_stock = active
        .iter()
        .filter(|p| p.stock_qty < low_stock_threshold)
        .map(|p| LowStockEntry {
            product_id: p.id,
            name: p.name.clone(),
            stock_qty: p.stock_qty,
            branch_id: p.branch_id,
        })
        .collect();

    Ok(StockSummary {
        branch_id: branch,
        active_products: active.len(),
        total_units,
        low_stock,
    })
}

/// Stock of every product, grouped by branch in ascending branch order.
///
/// MANAGER may narrow the listing to `branch_id` or see every branch; ADMIN always
/// gets their own branch regardless of `branch_id`.
pub async fn stock_by_branch(
    db: &DatabaseConnection,
    actor: &Actor,
    branch_id: Option<i64>,
) -> Result<Vec<BranchStock>> {
    guard::ensure_permitted(actor, Action::StockView)?;
    let branch = match guard::visible_branch(actor, Action::StockView)? {
        None => branch_id,
        own => own,
    };

    let mut query = Product::find();
    if let Some(branch_id) = branch {
        query = query.filter(product::Column::BranchId.eq(branch_id));
    }
    let products = query
        .order_by_asc(product::Column::BranchId)
        .order_by_asc(product::Column::Name)
        .order_by_asc(product::Column::Id)
        .all(db)
        .await?;

    let mut groups: Vec<BranchStock> = Vec::new();
    for p in products {
        let level = StockLevel {
            product_id: p.id,
            name: p.name,
            stock_qty: p.stock_qty,
            status: p.status,
        };
        match groups.last_mut() {
            Some(group) if group.branch_id == p.branch_id => group.items.push(level),
            _ => groups.push(BranchStock {
                branch_id: p.branch_id,
                items: vec![level],
            }),
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::guard::Role;
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_reserve_decrements_and_records_out() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Ceviche", dec!(10.00), 5, Some(1)).await?;

        let txn = db.begin().await?;
        let updated = reserve(&txn, product.id, 2, StockContext::manual(7, "test")).await?;
        txn.commit().await?;

        assert_eq!(updated.stock_qty, 3);
        let movements = movements_for_product(&db, product.id).await?;
        let last = movements.last().unwrap();
        assert_eq!(last.movement_type, "OUT");
        assert_eq!(last.quantity, 2);
        assert_eq!(last.created_by_id, 7);
        assert_eq!(last.branch_id, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_insufficient_leaves_stock_untouched() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Ceviche", dec!(10.00), 3, Some(1)).await?;
        let movements_before = movements_for_product(&db, product.id).await?.len();

        let txn = db.begin().await?;
        let result = reserve(&txn, product.id, 4, StockContext::manual(7, "test")).await;
        drop(txn);

        match result {
            Err(Error::InsufficientStock {
                product_id,
                name,
                available,
                requested,
            }) => {
                assert_eq!(product_id, product.id);
                assert_eq!(name, "Ceviche");
                assert_eq!(available, 3);
                assert_eq!(requested, 4);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(stock_of(&db, product.id).await?, 3);
        assert_eq!(
            movements_for_product(&db, product.id).await?.len(),
            movements_before
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_rejects_non_positive_quantity() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let result = reserve(&db, 1, 0, StockContext::manual(1, "test")).await;
        assert!(matches!(result, Err(Error::InvalidQuantity { quantity: 0 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_increments_and_records_in() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Ceviche", dec!(10.00), 1, Some(1)).await?;

        let updated = release(&db, product.id, 4, StockContext::for_order(3, 99, "test")).await?;

        assert_eq!(updated.stock_qty, 5);
        let movements = get_movements_for_order(&db, 99).await?;
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, "IN");
        assert_eq!(movements[0].quantity, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_unknown_product() -> Result<()> {
        let db = setup_test_db().await?;
        let result = release(&db, 404, 1, StockContext::manual(1, "test")).await;
        assert!(matches!(result, Err(Error::ProductNotFound { id: 404 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_stock_up_and_down() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Inca Kola", dec!(4.00), 10, Some(1)).await?;
        let admin = admin(1);

        let after_up = adjust_stock(&db, &admin, product.id, 5, "delivery").await?;
        assert_eq!(after_up.stock_qty, 15);

        let after_down = adjust_stock(&db, &admin, product.id, -15, "spoiled").await?;
        assert_eq!(after_down.stock_qty, 0);

        let movements = movements_for_product(&db, product.id).await?;
        let adjustments: Vec<_> = movements
            .iter()
            .filter(|m| m.movement_type == "ADJUST")
            .collect();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].quantity, 5);
        assert_eq!(adjustments[0].reason.as_deref(), Some("delivery"));
        assert_eq!(adjustments[1].quantity, -15);
        assert!(adjustments.iter().all(|m| m.order_id.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_stock_never_negative() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Inca Kola", dec!(4.00), 2, Some(1)).await?;

        let result = adjust_stock(&db, &manager(), product.id, -3, "count").await;
        assert!(matches!(
            result,
            Err(Error::NegativeStock {
                current: 2,
                delta: -3,
                ..
            })
        ));
        assert_eq!(stock_of(&db, product.id).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_stock_extreme_deltas() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Inca Kola", dec!(4.00), 2, Some(1)).await?;

        let result = adjust_stock(&db, &manager(), product.id, i32::MIN, "count").await;
        assert!(matches!(
            result,
            Err(Error::NegativeStock {
                current: 2,
                delta: i32::MIN,
                ..
            })
        ));

        let result = adjust_stock(&db, &manager(), product.id, i32::MAX, "count").await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);

        assert_eq!(stock_of(&db, product.id).await?, 2);
        let adjustments = movements_for_product(&db, product.id)
            .await?
            .into_iter()
            .filter(|m| m.movement_type == "ADJUST")
            .count();
        assert_eq!(adjustments, 0);

        let topped = adjust_stock(&db, &manager(), product.id, i32::MAX - 2, "count").await?;
        assert_eq!(topped.stock_qty, i32::MAX);
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_stock_authorization() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Inca Kola", dec!(4.00), 2, Some(3)).await?;

        let result = adjust_stock(&db, &waiter(3), product.id, 1, "").await;
        assert!(matches!(
            result,
            Err(Error::Forbidden {
                role: Role::Waiter,
                ..
            })
        ));

        let result = adjust_stock(&db, &admin(2), product.id, 1, "").await;
        assert!(matches!(result, Err(Error::OutOfScope { .. })));

        let updated = adjust_stock(&db, &cashier(3), product.id, 1, "").await?;
        assert_eq!(updated.stock_qty, 3);

        let updated = adjust_stock(&db, &manager(), product.id, 1, "").await?;
        assert_eq!(updated.stock_qty, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_stock_zero_delta_touches_nothing() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let result = adjust_stock(&db, &manager(), 1, 0, "noop").await;
        assert!(matches!(result, Err(Error::InvalidQuantity { quantity: 0 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_stock_movements_is_branch_scoped() -> Result<()> {
        let db = setup_test_db().await?;
        let north = create_test_product(&db, "Anticucho", dec!(8.00), 4, Some(1)).await?;
        let south = create_test_product(&db, "Anticucho", dec!(8.00), 6, Some(2)).await?;
        adjust_stock(&db, &manager(), north.id, 1, "").await?;
        adjust_stock(&db, &manager(), south.id, 1, "").await?;

        let all = list_stock_movements(&db, &manager(), None, None).await?;
        assert!(all.iter().any(|m| m.branch_id == Some(1)));
        assert!(all.iter().any(|m| m.branch_id == Some(2)));

        let own = list_stock_movements(&db, &admin(1), None, None).await?;
        assert!(!own.is_empty());
        assert!(own.iter().all(|m| m.branch_id == Some(1)));

        let limited = list_stock_movements(&db, &manager(), Some(south.id), Some(1)).await?;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].product_id, south.id);
        assert_eq!(limited[0].movement_type, "ADJUST");

        let result = list_stock_movements(&db, &cashier(1), None, None).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_stock_summary() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_product(&db, "Causa", dec!(9.00), 2, Some(1)).await?;
        create_test_product(&db, "Papa a la Huancaina", dec!(9.00), 10, Some(1)).await?;
        create_test_product(&db, "Tiradito", dec!(12.00), 1, Some(2)).await?;
        let retired = create_test_product(&db, "Old Special", dec!(5.00), 0, Some(1)).await?;
        crate::core::catalog::set_product_status(
            &db,
            &manager(),
            retired.id,
            ProductStatus::Inactive,
        )
        .await?;

        let summary = stock_summary(&db, &admin(1), 5).await?;
        assert_eq!(summary.branch_id, Some(1));
        assert_eq!(summary.active_products, 2);
        assert_eq!(summary.total_units, 12);
        assert_eq!(summary.low_stock.len(), 1);
        assert_eq!(summary.low_stock[0].name, "Causa");

        let global = stock_summary(&db, &manager(), 5).await?;
        assert_eq!(global.branch_id, None);
        assert_eq!(global.active_products, 3);
        assert_eq!(global.low_stock[0].name, "Tiradito");
        Ok(())
    }

    #[tokio::test]
    async fn test_stock_by_branch_groups_and_scopes() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_product(&db, "Tiradito", dec!(12.00), 1, Some(2)).await?;
        create_test_product(&db, "Causa", dec!(9.00), 2, Some(1)).await?;
        create_test_product(&db, "Anticucho", dec!(8.00), 4, Some(1)).await?;

        let all = stock_by_branch(&db, &manager(), None).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].branch_id, Some(1));
        let names: Vec<&str> = all[0].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Anticucho", "Causa"]);
        assert_eq!(all[1].items[0].stock_qty, 1);
        assert_eq!(all[1].items[0].status, "ACTIVE");

        let narrowed = stock_by_branch(&db, &manager(), Some(2)).await?;
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].branch_id, Some(2));

        let own = stock_by_branch(&db, &admin(1), Some(2)).await?;
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].branch_id, Some(1));

        let result = stock_by_branch(&db, &cashier(1), None).await;
        assert!(matches!(result, Err(Error::Forbidden { role: Role::Cashier, .. })));

        assert!(stock_by_branch(&db, &manager(), Some(9)).await?.is_empty());
        Ok(())
    }
}
