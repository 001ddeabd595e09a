//! Stock movement entity - Append-only audit log of inventory changes.
//!
//! Rows are inserted in the same database transaction as the stock change they
//! describe and are never updated or deleted afterwards.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stock movement database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    /// Unique identifier for the movement
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `"IN"`, `"OUT"` or `"ADJUST"`
    pub movement_type: String,
    /// Units moved. Positive for `IN`/`OUT`, the signed delta for `ADJUST`
    pub quantity: i32,
    /// Why the stock moved
    pub reason: Option<String>,
    /// Product whose stock moved
    pub product_id: i64,
    /// Branch of the product at the time of the movement
    pub branch_id: Option<i64>,
    /// User whose operation caused the movement
    pub created_by_id: i64,
    /// Order event that caused the movement, if any
    pub order_id: Option<i64>,
    /// When the movement was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between a stock movement and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each movement belongs to one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
