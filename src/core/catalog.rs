//! Catalog business logic - Products and dining tables.
//!
//! This is the minimal write surface needed to stand a branch up: creating products
//! and tables, retiring products, and seeding both from config.toml. MANAGER may
//! work on any branch; ADMIN always works on their own branch.

use crate::{
    config::catalog::CatalogConfig,
    core::{
        guard::{self, Action, Actor, Role},
        stock::{self, StockContext},
    },
    entities::{DiningTable, Product, product, table},
    errors::{Error, Result},
    models::{MovementType, ProductStatus, TableStatus},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument};

/// User id recorded on movements created by seeding.
pub const SYSTEM_USER_ID: i64 = 0;

/// Highest catalog price accepted, in currency units.
pub const MAX_PRICE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 2);

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Catalog price per unit
    pub price: Decimal,
    /// Opening stock
    pub stock_qty: i32,
    /// Requested branch; only honoured for MANAGER callers
    pub branch_id: Option<i64>,
}

/// Partial edit of a product. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    /// New display name
    pub name: Option<String>,
    /// New catalog price; existing order lines keep their snapshot
    pub price: Option<Decimal>,
    /// New sale status
    pub status: Option<ProductStatus>,
    /// New branch; MANAGER only
    pub branch_id: Option<i64>,
}

/// What a seeding run created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Tables inserted
    pub tables_created: usize,
    /// Products inserted
    pub products_created: usize,
}

/// Retrieves a specific product by its unique ID.
pub async fn get_product_by_id(
    db: &DatabaseConnection,
    product_id: i64,
) -> Result<Option<product::Model>> {
    Product::find_by_id(product_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a specific dining table by its unique ID.
pub async fn get_table_by_id(
    db: &DatabaseConnection,
    table_id: i64,
) -> Result<Option<table::Model>> {
    DiningTable::find_by_id(table_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates a product in the caller's branch (or the requested one, for MANAGER).
///
/// Opening stock is recorded as an `IN` movement.
///
/// # Errors
/// Returns an error if:
/// - The caller may not manage products, or has no branch to create it in
/// - The name is empty, the price is negative or the opening stock is negative
/// - The database insert fails
pub async fn create_product(
    db: &DatabaseConnection,
    actor: &Actor,
    new_product: NewProduct,
) -> Result<product::Model> {
    guard::ensure_permitted(actor, Action::ProductManage)?;
    let branch_id = target_branch(actor, Action::ProductManage, new_product.branch_id)?;

    let txn = db.begin().await?;
    let product = insert_product(
        &txn,
        &NewProduct {
            branch_id: Some(branch_id),
            ..new_product
        },
        actor.id,
    )
    .await?;
    txn.commit().await?;

    info!(product_id = product.id, branch_id, "Product created");
    Ok(product)
}

/// Marks a product active or inactive. Inactive products cannot be ordered.
pub async fn set_product_status(
    db: &DatabaseConnection,
    actor: &Actor,
    product_id: i64,
    status: ProductStatus,
) -> Result<product::Model> {
    guard::ensure_permitted(actor, Action::ProductManage)?;

    let product = stock::find_product(db, product_id).await?;
    guard::ensure_in_scope(actor, Action::ProductManage, product.branch_id)?;

    let mut active: product::ActiveModel = product.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

/// Edits a product's name, price, status or branch.
///
/// ADMIN edits products of their own branch and cannot move them; MANAGER edits
/// any product and may move it to another branch. Stock is only changed through
/// the stock ledger.
///
/// # Errors
/// Returns an error if:
/// - The caller may not manage products, or the product is outside their branch
/// - A non-MANAGER asks to move the product to another branch
/// - The new name is empty or the new price is negative or above [`MAX_PRICE`]
/// - The product does not exist
#[instrument(skip(db, changes), fields(user_id = actor.id))]
pub async fn update_product(
    db: &DatabaseConnection,
    actor: &Actor,
    product_id: i64,
    changes: ProductUpdate,
) -> Result<product::Model> {
    guard::ensure_permitted(actor, Action::ProductManage)?;
    if let Some(price) = changes.price {
        validate_price(price)?;
    }
    let name = match changes.name.as_deref().map(str::trim) {
        Some("") => {
            return Err(Error::Validation {
                message: "Product name cannot be empty".to_string(),
            });
        }
        other => other.map(str::to_string),
    };

    let txn = db.begin().await?;
    let product = stock::find_product(&txn, product_id).await?;
    guard::ensure_in_scope(actor, Action::ProductManage, product.branch_id)?;

    let target_branch = match changes.branch_id {
        Some(branch_id) if Some(branch_id) != product.branch_id => {
            if !actor.has_global_scope() {
                return Err(Error::OutOfScope {
                    action: Action::ProductManage,
                    caller_branch: actor.branch_id,
                    resource_branch: Some(branch_id),
                });
            }
            Some(branch_id)
        }
        _ => product.branch_id,
    };

    let mut active: product::ActiveModel = product.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(price) = changes.price {
        active.price = Set(price.round_dp(2));
    }
    if let Some(status) = changes.status {
        active.status = Set(status.as_str().to_string());
    }
    active.branch_id = Set(target_branch);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!(product_id, branch_id = ?updated.branch_id, "Product updated");
    Ok(updated)
}

/// Lists products newest first. MANAGER sees every branch, ADMIN only their own.
pub async fn list_products(db: &DatabaseConnection, actor: &Actor) -> Result<Vec<product::Model>> {
    guard::ensure_permitted(actor, Action::ProductView)?;
    let branch = guard::visible_branch(actor, Action::ProductView)?;

    let mut query = Product::find();
    if let Some(branch_id) = branch {
        query = query.filter(product::Column::BranchId.eq(branch_id));
    }
    query
        .order_by_desc(product::Column::CreatedAt)
        .order_by_desc(product::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a dining table in the caller's branch (or the requested one, for MANAGER).
///
/// # Errors
/// Returns an error if:
/// - The caller may not manage tables, or has no branch to create it in
/// - The number is not positive or already used in that branch
pub async fn create_table(
    db: &DatabaseConnection,
    actor: &Actor,
    number: i32,
    branch_id: Option<i64>,
) -> Result<table::Model> {
    guard::ensure_permitted(actor, Action::TableManage)?;
    let branch_id = target_branch(actor, Action::TableManage, branch_id)?;

    let table = insert_table(db, number, Some(branch_id)).await?;
    info!(table_id = table.id, number, branch_id, "Table created");
    Ok(table)
}

/// Seeds tables and products from configuration, skipping entries that already exist.
///
/// A table is identified by `(number, branch_id)` and a product by `(name, branch_id)`.
pub async fn seed_catalog(db: &DatabaseConnection, config: &CatalogConfig) -> Result<SeedReport> {
    info!(
        "Seeding catalog: {} tables and {} products configured.",
        config.tables.len(),
        config.products.len()
    );
    let txn = db.begin().await?;
    let mut report = SeedReport::default();

    for seed in &config.tables {
        let exists = DiningTable::find()
            .filter(table::Column::Number.eq(seed.number))
            .filter(table::Column::BranchId.eq(seed.branch_id))
            .one(&txn)
            .await?
            .is_some();
        if exists {
            debug!(
                "Table {} in branch {} already exists. Skipping.",
                seed.number, seed.branch_id
            );
            continue;
        }
        insert_table(&txn, seed.number, Some(seed.branch_id)).await?;
        report.tables_created += 1;
    }

    for seed in &config.products {
        let exists = Product::find()
            .filter(product::Column::Name.eq(seed.name.trim()))
            .filter(product::Column::BranchId.eq(seed.branch_id))
            .one(&txn)
            .await?
            .is_some();
        if exists {
            debug!(
                "Product '{}' in branch {} already exists. Skipping.",
                seed.name, seed.branch_id
            );
            continue;
        }
        let new_product = NewProduct {
            name: seed.name.clone(),
            price: seed.price,
            stock_qty: seed.stock_qty,
            branch_id: Some(seed.branch_id),
        };
        insert_product(&txn, &new_product, SYSTEM_USER_ID).await?;
        report.products_created += 1;
    }

    txn.commit().await?;
    info!(
        tables_created = report.tables_created,
        products_created = report.products_created,
        "Catalog seeded."
    );
    Ok(report)
}

/// Validates and inserts a product, recording any opening stock.
pub(crate) async fn insert_product<C>(
    db: &C,
    new_product: &NewProduct,
    created_by_id: i64,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    let name = new_product.name.trim();
    if name.is_empty() {
        return Err(Error::Validation {
            message: "Product name cannot be empty".to_string(),
        });
    }
    validate_price(new_product.price)?;
    if new_product.stock_qty < 0 {
        return Err(Error::Validation {
            message: format!("Opening stock cannot be negative ({})", new_product.stock_qty),
        });
    }

    let now = Utc::now();
    let product = product::ActiveModel {
        name: Set(name.to_string()),
        price: Set(new_product.price.round_dp(2)),
        stock_qty: Set(new_product.stock_qty),
        branch_id: Set(new_product.branch_id),
        status: Set(ProductStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    if product.stock_qty > 0 {
        stock::record_movement(
            db,
            &product,
            MovementType::In,
            product.stock_qty,
            StockContext::manual(created_by_id, "opening stock"),
        )
        .await?;
    }

    Ok(product)
}

/// Validates and inserts an available dining table.
pub(crate) async fn insert_table<C>(
    db: &C,
    number: i32,
    branch_id: Option<i64>,
) -> Result<table::Model>
where
    C: ConnectionTrait,
{
    if number <= 0 {
        return Err(Error::Validation {
            message: format!("Table number must be positive ({number})"),
        });
    }

    let mut duplicate = DiningTable::find().filter(table::Column::Number.eq(number));
    duplicate = match branch_id {
        Some(branch_id) => duplicate.filter(table::Column::BranchId.eq(branch_id)),
        None => duplicate.filter(table::Column::BranchId.is_null()),
    };
    if duplicate.one(db).await?.is_some() {
        return Err(Error::Validation {
            message: format!("Table {number} already exists in branch {branch_id:?}"),
        });
    }

    table::ActiveModel {
        number: Set(number),
        branch_id: Set(branch_id),
        status: Set(TableStatus::Available.as_str().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

fn validate_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() || price > MAX_PRICE {
        return Err(Error::InvalidPrice { price });
    }
    Ok(())
}

/// Branch a catalog write lands in: MANAGER picks, everyone else gets their own.
fn target_branch(actor: &Actor, action: Action, requested: Option<i64>) -> Result<i64> {
    match actor.role {
        Role::Manager => requested.ok_or_else(|| Error::Validation {
            message: "branch_id is required for MANAGER".to_string(),
        }),
        _ => actor.branch_id.ok_or(Error::OutOfScope {
            action,
            caller_branch: None,
            resource_branch: requested,
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::catalog::parse_config;
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn lomo(branch_id: Option<i64>) -> NewProduct {
        NewProduct {
            name: "  Lomo Saltado ".to_string(),
            price: dec!(32.50),
            stock_qty: 12,
            branch_id,
        }
    }

    #[tokio::test]
    async fn test_manager_creates_product_in_requested_branch() -> Result<()> {
        let db = setup_test_db().await?;

        let product = create_product(&db, &manager(), lomo(Some(4))).await?;

        assert_eq!(product.name, "Lomo Saltado");
        assert_eq!(product.price, dec!(32.50));
        assert_eq!(product.branch_id, Some(4));
        assert_eq!(product.status, "ACTIVE");

        let movements = movements_for_product(&db, product.id).await?;
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, "IN");
        assert_eq!(movements[0].quantity, 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_product_lands_in_own_branch() -> Result<()> {
        let db = setup_test_db().await?;

        let product = create_product(&db, &admin(2), lomo(Some(9))).await?;
        assert_eq!(product.branch_id, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_product_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_product(&db, &waiter(1), lomo(None)).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let result = create_product(&db, &manager(), lomo(None)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let floating_admin = Actor::new(5, Role::Admin, None);
        let result = create_product(&db, &floating_admin, lomo(Some(1))).await;
        assert!(matches!(result, Err(Error::OutOfScope { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_product_rejects_bad_input() -> Result<()> {
        let db = setup_test_db().await?;

        let blank = NewProduct {
            name: "   ".to_string(),
            ..lomo(Some(1))
        };
        assert!(matches!(
            insert_product(&db, &blank, 1).await,
            Err(Error::Validation { .. })
        ));

        let negative_price = NewProduct {
            price: dec!(-1.00),
            ..lomo(Some(1))
        };
        assert!(matches!(
            insert_product(&db, &negative_price, 1).await,
            Err(Error::InvalidPrice { .. })
        ));

        let negative_stock = NewProduct {
            stock_qty: -1,
            ..lomo(Some(1))
        };
        assert!(matches!(
            insert_product(&db, &negative_stock, 1).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_product_status_is_scoped() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Rocoto Relleno", dec!(18.00), 3, Some(1)).await?;

        let result = set_product_status(&db, &admin(2), product.id, ProductStatus::Inactive).await;
        assert!(matches!(result, Err(Error::OutOfScope { .. })));

        let retired =
            set_product_status(&db, &admin(1), product.id, ProductStatus::Inactive).await?;
        assert_eq!(retired.status, "INACTIVE");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_table_rejects_duplicates() -> Result<()> {
        let db = setup_test_db().await?;

        let first = create_table(&db, &admin(1), 7, None).await?;
        assert_eq!(first.branch_id, Some(1));
        assert_eq!(first.status, "AVAILABLE");

        let result = create_table(&db, &admin(1), 7, None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        // Same number in another branch is fine
        let other = create_table(&db, &manager(), 7, Some(2)).await?;
        assert_eq!(other.branch_id, Some(2));

        let result = create_table(&db, &cashier(1), 8, None).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_catalog_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let config = parse_config(
            r#"
            [[tables]]
            number = 1
            branch_id = 1

            [[tables]]
            number = 2
            branch_id = 1

            [[products]]
            name = "Aji de Gallina"
            price = "24.00"
            stock_qty = 8
            branch_id = 1
            "#,
        )?;

        let first = seed_catalog(&db, &config).await?;
        assert_eq!(
            first,
            SeedReport {
                tables_created: 2,
                products_created: 1
            }
        );

        let second = seed_catalog(&db, &config).await?;
        assert_eq!(second, SeedReport::default());

        let products = Product::find().all(&db).await?;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].stock_qty, 8);
        let movements = movements_for_product(&db, products[0].id).await?;
        assert_eq!(movements[0].created_by_id, SYSTEM_USER_ID);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_id() -> Result<()> {
        let db = setup_test_db().await?;
        let table = create_test_table(&db, 3, Some(1)).await?;

        assert_eq!(get_table_by_id(&db, table.id).await?.unwrap().number, 3);
        assert!(get_table_by_id(&db, 999).await?.is_none());
        assert!(get_product_by_id(&db, 999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_product_fields_and_branch_rules() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Juane", dec!(12.50), 6, Some(1)).await?;

        let edited = update_product(
            &db,
            &admin(1),
            product.id,
            ProductUpdate {
                name: Some(" Juane de Gallina ".to_string()),
                price: Some(dec!(14.00)),
                status: Some(ProductStatus::Inactive),
                branch_id: Some(1),
            },
        )
        .await?;
        assert_eq!(edited.name, "Juane de Gallina");
        assert_eq!(edited.price, dec!(14.00));
        assert_eq!(edited.status, "INACTIVE");
        assert_eq!(edited.stock_qty, 6);

        let result = update_product(
            &db,
            &admin(1),
            product.id,
            ProductUpdate {
                branch_id: Some(2),
                ..ProductUpdate::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::OutOfScope { .. })));

        let result = update_product(&db, &admin(2), product.id, ProductUpdate::default()).await;
        assert!(matches!(result, Err(Error::OutOfScope { .. })));

        let moved = update_product(
            &db,
            &manager(),
            product.id,
            ProductUpdate {
                branch_id: Some(2),
                ..ProductUpdate::default()
            },
        )
        .await?;
        assert_eq!(moved.branch_id, Some(2));
        assert_eq!(moved.name, "Juane de Gallina");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_product_rejects_bad_input() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let blank = ProductUpdate {
            name: Some("  ".to_string()),
            ..ProductUpdate::default()
        };
        assert!(matches!(
            update_product(&db, &manager(), 1, blank).await,
            Err(Error::Validation { .. })
        ));

        let too_expensive = ProductUpdate {
            price: Some(MAX_PRICE + dec!(0.01)),
            ..ProductUpdate::default()
        };
        assert!(matches!(
            update_product(&db, &manager(), 1, too_expensive).await,
            Err(Error::InvalidPrice { .. })
        ));

        assert!(matches!(
            update_product(&db, &waiter(1), 1, ProductUpdate::default()).await,
            Err(Error::Forbidden { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_product_price_ceiling() -> Result<()> {
        let db = setup_test_db().await?;

        let at_ceiling = NewProduct {
            price: MAX_PRICE,
            ..lomo(Some(1))
        };
        assert_eq!(insert_product(&db, &at_ceiling, 1).await?.price, MAX_PRICE);

        let above = NewProduct {
            name: "Banquete".to_string(),
            price: MAX_PRICE + dec!(0.01),
            ..lomo(Some(1))
        };
        assert!(matches!(
            insert_product(&db, &above, 1).await,
            Err(Error::InvalidPrice { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_products_is_scoped() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_product(&db, "Causa", dec!(9.00), 2, Some(1)).await?;
        create_test_product(&db, "Tiradito", dec!(12.00), 1, Some(2)).await?;
        let second = create_test_product(&db, "Chicharron", dec!(15.00), 3, Some(1)).await?;

        let own = list_products(&db, &admin(1)).await?;
        let ids: Vec<i64> = own.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert_eq!(list_products(&db, &manager()).await?.len(), 3);

        let result = list_products(&db, &waiter(1)).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        Ok(())
    }
}
