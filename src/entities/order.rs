//! Order entity - One customer order placed at a dining table.
//!
//! The `total` column is derived: it always equals the sum of the order's line
//! subtotals and is rewritten after every line mutation. The `status` column moves
//! from `"PENDING"` to either `"PAID"` or `"CANCELLED"` and never back.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Table the order was placed at
    pub table_id: i64,
    /// Branch inherited from the table when the order was created
    pub branch_id: Option<i64>,
    /// `"PENDING"`, `"PAID"` or `"CANCELLED"`
    pub status: String,
    /// Sum of all line subtotals
    pub total: Decimal,
    /// Free-form notes from the waiter
    pub notes: Option<String>,
    /// User who opened the order
    pub created_by_id: i64,
    /// When the order was opened
    pub created_at: DateTimeUtc,
    /// When the order was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order is placed at one table
    #[sea_orm(
        belongs_to = "super::table::Entity",
        from = "Column::TableId",
        to = "super::table::Column::Id"
    )]
    Table,
    /// One order owns many line items
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
}

impl Related<super::table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Table.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
