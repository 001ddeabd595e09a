//! Unified error types for the order and stock core.
//!
//! Every failure names the resource it concerns (order, line, product, table) so a
//! caller can report exactly what went wrong. [`Error::kind`] folds the variants into
//! the coarse classes an outer transport layer maps onto status codes.

use crate::core::guard::{Action, Role};
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, detected before any mutation
    Validation,
    /// Order, line, product or table absent
    NotFound,
    /// Role or branch scope denies the action
    Authorization,
    /// Resource not in the state the operation requires
    StateConflict,
    /// The operation would drive stock below zero
    InsufficientStock,
    /// Unexpected persistence or environment failure
    Server,
}

/// Application error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Generic malformed input
    #[error("Invalid input: {message}")]
    Validation {
        /// What went wrong
        message: String,
    },

    /// A quantity that must be positive was not
    #[error("Invalid quantity {quantity}: must be greater than zero")]
    InvalidQuantity {
        /// The rejected quantity
        quantity: i32,
    },

    /// The item list given to order creation is unusable
    #[error("Invalid order items: {message}")]
    InvalidItems {
        /// Which entry is wrong and why
        message: String,
    },

    /// A stored status string is not one we know
    #[error("Unknown {field} value '{value}'")]
    InvalidStatus {
        /// Which status column
        field: &'static str,
        /// The offending value
        value: String,
    },

    /// Order does not exist
    #[error("Order {id} not found")]
    OrderNotFound {
        /// Requested order id
        id: i64,
    },

    /// Line does not exist on the given order
    #[error("Item {item_id} not found on order {order_id}")]
    ItemNotFound {
        /// Order that was searched
        order_id: i64,
        /// Requested line id
        item_id: i64,
    },

    /// Product does not exist
    #[error("Product {id} not found")]
    ProductNotFound {
        /// Requested product id
        id: i64,
    },

    /// Table does not exist
    #[error("Table {id} not found")]
    TableNotFound {
        /// Requested table id
        id: i64,
    },

    /// The caller's role may not perform the action at all
    #[error("Role {role} is not allowed to {action}")]
    Forbidden {
        /// Caller role
        role: Role,
        /// Denied action
        action: Action,
    },

    /// The caller's role may perform the action, but not on this branch
    #[error("Branch {resource_branch:?} is outside the caller's scope (branch {caller_branch:?}) for {action}")]
    OutOfScope {
        /// Denied action
        action: Action,
        /// Branch the caller is bound to
        caller_branch: Option<i64>,
        /// Branch the resource lives in
        resource_branch: Option<i64>,
    },

    /// Table already hosts an order
    #[error("Table {id} is not available")]
    TableNotAvailable {
        /// Requested table id
        id: i64,
    },

    /// Lines can only change while the order is pending
    #[error("Order {id} is {status} and can no longer be edited")]
    OrderNotEditable {
        /// Order id
        id: i64,
        /// Current status
        status: String,
    },

    /// Pay and cancel require a pending order
    #[error("Order {id} is {status}, expected PENDING")]
    NotPending {
        /// Order id
        id: i64,
        /// Current status
        status: String,
    },

    /// Requested status change is not an edge of the order state machine
    #[error("Order {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Order id
        id: i64,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Product is sold by a different branch than the order
    #[error("Product {product_id} does not belong to branch {order_branch:?}")]
    ProductBranchMismatch {
        /// Product id
        product_id: i64,
        /// Branch of the order
        order_branch: Option<i64>,
    },

    /// Product is not currently sold
    #[error("Product {id} ('{name}') is inactive")]
    ProductInactive {
        /// Product id
        id: i64,
        /// Product name
        name: String,
    },

    /// Not enough units on hand
    #[error("Insufficient stock for product {product_id} ('{name}'): {available} available, {requested} requested")]
    InsufficientStock {
        /// Product id
        product_id: i64,
        /// Product name
        name: String,
        /// Units on hand
        available: i32,
        /// Units the operation needs
        requested: i32,
    },

    /// A manual adjustment would leave negative stock
    #[error("Adjusting product {product_id} by {delta} would leave negative stock (current {current})")]
    NegativeStock {
        /// Product id
        product_id: i64,
        /// Units on hand
        current: i32,
        /// Requested delta
        delta: i32,
    },

    /// A price that must not be negative was
    #[error("Invalid price {price}")]
    InvalidPrice {
        /// The rejected price
        price: Decimal,
    },

    /// Persistence layer failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::InvalidQuantity { .. }
            | Self::InvalidItems { .. }
            | Self::InvalidPrice { .. }
            | Self::ProductInactive { .. } => ErrorKind::Validation,
            Self::OrderNotFound { .. }
            | Self::ItemNotFound { .. }
            | Self::ProductNotFound { .. }
            | Self::TableNotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } | Self::OutOfScope { .. } => ErrorKind::Authorization,
            Self::TableNotAvailable { .. }
            | Self::OrderNotEditable { .. }
            | Self::NotPending { .. }
            | Self::InvalidTransition { .. }
            | Self::ProductBranchMismatch { .. } => ErrorKind::StateConflict,
            Self::InsufficientStock { .. } | Self::NegativeStock { .. } => {
                ErrorKind::InsufficientStock
            }
            Self::Config { .. } | Self::InvalidStatus { .. } | Self::Database(_) => ErrorKind::Server,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::InvalidItems {
                message: "empty".to_string()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::OrderNotFound { id: 1 }.kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::Forbidden {
                role: Role::Waiter,
                action: Action::OrderPay
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            Error::OrderNotEditable {
                id: 1,
                status: "PAID".to_string()
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            Error::NegativeStock {
                product_id: 1,
                current: 2,
                delta: -3
            }
            .kind(),
            ErrorKind::InsufficientStock
        );
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".to_string())).kind(),
            ErrorKind::Server
        );
    }

    #[test]
    fn test_insufficient_stock_names_product() {
        let err = Error::InsufficientStock {
            product_id: 2,
            name: "Pisco Sour".to_string(),
            available: 3,
            requested: 100,
        };
        let message = err.to_string();
        assert!(message.contains("Pisco Sour"));
        assert!(message.contains("3 available"));
        assert!(message.contains("100 requested"));
    }
}
