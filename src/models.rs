//! Domain types layered over the raw entity rows.
//!
//! Status columns are stored as text; the enums here are the typed view the core
//! logic works with.

use crate::entities::{order, order_item};
use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Text stored in the database column
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::InvalidStatus {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Order state machine: `PENDING -> PAID | CANCELLED`
    OrderStatus, "order status" {
        /// Open; lines may still change
        Pending => "PENDING",
        /// Settled (terminal)
        Paid => "PAID",
        /// Abandoned, stock returned (terminal)
        Cancelled => "CANCELLED",
    }
);

text_enum!(
    /// Dining table occupancy
    TableStatus, "table status" {
        /// Free for a new order
        Available => "AVAILABLE",
        /// Hosts a pending order
        Occupied => "OCCUPIED",
    }
);

text_enum!(
    /// Whether a product can be ordered
    ProductStatus, "product status" {
        /// On sale
        Active => "ACTIVE",
        /// Withdrawn from sale
        Inactive => "INACTIVE",
    }
);

text_enum!(
    /// Direction of a stock movement
    MovementType, "movement type" {
        /// Units returned to stock
        In => "IN",
        /// Units taken from stock
        Out => "OUT",
        /// Manual correction
        Adjust => "ADJUST",
    }
);

impl OrderStatus {
    /// `PAID` and `CANCELLED` are final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

/// One requested line when opening an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product to sell
    pub product_id: i64,
    /// Units, must be positive
    pub qty: i32,
}

/// Input for opening an order at a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    /// Table the order is placed at
    pub table_id: i64,
    /// Initial lines, must not be empty
    pub items: Vec<OrderLine>,
    /// Optional notes
    pub notes: Option<String>,
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    /// The order row
    pub order: order::Model,
    /// Its lines, in insertion order
    pub items: Vec<order_item::Model>,
}

impl OrderDetails {
    /// Typed order status.
    pub fn status(&self) -> Result<OrderStatus> {
        self.order.status.parse()
    }

    /// Sum of the line subtotals; equals `order.total` after every committed mutation.
    #[must_use]
    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.subtotal).sum()
    }
}

/// Filters for listing orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    /// Only orders placed at this table
    pub table_id: Option<i64>,
    /// Only orders in this status
    pub status: Option<OrderStatus>,
}

/// A product running low on stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockEntry {
    /// Product id
    pub product_id: i64,
    /// Product name
    pub name: String,
    /// Units on hand
    pub stock_qty: i32,
    /// Branch of the product
    pub branch_id: Option<i64>,
}

/// Stock on hand for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    /// Product id
    pub product_id: i64,
    /// Product name
    pub name: String,
    /// Units on hand
    pub stock_qty: i32,
    /// `"ACTIVE"` or `"INACTIVE"`
    pub status: String,
}

/// Every product of one branch with its stock, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchStock {
    /// Branch the products belong to
    pub branch_id: Option<i64>,
    /// Products of that branch
    pub items: Vec<StockLevel>,
}

/// Inventory overview for the caller's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSummary {
    /// `None` for a global view, otherwise the single branch covered
    pub branch_id: Option<i64>,
    /// Number of active products
    pub active_products: usize,
    /// Units on hand across all products in scope
    pub total_units: i64,
    /// Active products strictly below the threshold, lowest stock first
    pub low_stock: Vec<LowStockEntry>,
}
