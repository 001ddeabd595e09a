//! Dining table entity.
//!
//! A table is `"OCCUPIED"` while it has a pending order and `"AVAILABLE"` otherwise.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Dining table database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dining_tables")]
pub struct Model {
    /// Unique identifier for the table
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Number shown on the floor plan, unique per branch
    pub number: i32,
    /// Branch the table belongs to
    pub branch_id: Option<i64>,
    /// `"AVAILABLE"` or `"OCCUPIED"`
    pub status: String,
    /// When the table was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between a dining table and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One table hosts many orders over time
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
