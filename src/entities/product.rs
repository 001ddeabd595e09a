//! Product entity - Represents a catalog item sold at one branch.
//!
//! Each product carries its current catalog price and the on-hand stock quantity.
//! The price here is live; order lines snapshot it at the moment they are added.
//! `stock_qty` never goes below zero.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Name of the product (e.g., "Lomo Saltado", "Chicha Morada")
    pub name: String,
    /// Current catalog price per unit
    pub price: Decimal,
    /// Units on hand
    pub stock_qty: i32,
    /// Branch that sells and stocks this product
    pub branch_id: Option<i64>,
    /// `"ACTIVE"` or `"INACTIVE"`
    pub status: String,
    /// When the product was created
    pub created_at: DateTimeUtc,
    /// When the product (including its stock) was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One product appears on many order lines
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    /// One product has many stock movements
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
