use branch_pos::{
    config,
    core::{
        catalog,
        guard::{Actor, Role},
        stock,
    },
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the catalog configuration
    let catalog_config = config::catalog::load_default_config()
        .inspect_err(|e| error!("Failed to load catalog configuration: {}", e))?;

    // 4. Connect and create the schema
    let db = config::database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&db)
        .await
        .inspect(|_| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed tables and products
    let report = catalog::seed_catalog(&db, &catalog_config)
        .await
        .inspect_err(|e| error!("Failed to seed catalog: {}", e))?;
    info!(
        tables = report.tables_created,
        products = report.products_created,
        "Catalog seeded."
    );

    // 6. Report stock health across all branches
    let system = Actor::new(catalog::SYSTEM_USER_ID, Role::Manager, None);
    let summary =
        stock::stock_summary(&db, &system, catalog_config.stock.low_stock_threshold).await?;
    info!(
        active_products = summary.active_products,
        total_units = summary.total_units,
        "Stock summary"
    );
    for entry in &summary.low_stock {
        warn!(
            product_id = entry.product_id,
            name = %entry.name,
            stock_qty = entry.stock_qty,
            branch_id = ?entry.branch_id,
            "Low stock"
        );
    }

    Ok(())
}
