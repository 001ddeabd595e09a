//! Authorization guard - role permissions and branch scoping.
//!
//! Every mutating entry point asks the guard twice: once with only the caller's role,
//! before anything is read, and once with the branch of the resource it loaded.
//! Both questions are pure functions of their arguments; the permission matrix lives
//! in a single table so the policy can be read and tested in one place.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Staff role, as resolved by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Takes orders at the tables of one branch
    Waiter,
    /// Settles and cancels orders at one branch
    Cashier,
    /// Runs one branch
    Admin,
    /// Oversees every branch
    Manager,
}

impl Role {
    /// Upper-case role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiter => "WAITER",
            Self::Cashier => "CASHIER",
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITER" => Ok(Self::Waiter),
            "CASHIER" => Ok(Self::Cashier),
            "ADMIN" => Ok(Self::Admin),
            "MANAGER" => Ok(Self::Manager),
            other => Err(Error::Validation {
                message: format!("Unknown role '{other}'"),
            }),
        }
    }
}

/// Operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Open an order at a table
    OrderCreate,
    /// Read orders
    OrderView,
    /// Add a line to a pending order
    OrderItemAdd,
    /// Change a line's quantity
    OrderItemUpdate,
    /// Remove a line
    OrderItemRemove,
    /// Settle an order
    OrderPay,
    /// Cancel an order
    OrderCancel,
    /// Generic status change entry point
    OrderStatusSet,
    /// Manual stock correction
    StockAdjust,
    /// Read stock movements and summaries
    StockView,
    /// List products
    ProductView,
    /// Create, edit or retire products
    ProductManage,
    /// Create dining tables
    TableManage,
}

impl Action {
    /// Upper-case action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreate => "ORDER_CREATE",
            Self::OrderView => "ORDER_VIEW",
            Self::OrderItemAdd => "ORDER_ITEM_ADD",
            Self::OrderItemUpdate => "ORDER_ITEM_UPDATE",
            Self::OrderItemRemove => "ORDER_ITEM_REMOVE",
            Self::OrderPay => "ORDER_PAY",
            Self::OrderCancel => "ORDER_CANCEL",
            Self::OrderStatusSet => "ORDER_STATUS_SET",
            Self::StockAdjust => "STOCK_ADJUST",
            Self::StockView => "STOCK_VIEW",
            Self::ProductView => "PRODUCT_VIEW",
            Self::ProductManage => "PRODUCT_MANAGE",
            Self::TableManage => "TABLE_MANAGE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALL_ROLES: &[Role] = &[Role::Waiter, Role::Cashier, Role::Admin, Role::Manager];
const SETTLEMENT_ROLES: &[Role] = &[Role::Cashier, Role::Admin, Role::Manager];
const BACK_OFFICE_ROLES: &[Role] = &[Role::Admin, Role::Manager];

/// Who may do what. Branch scoping is applied separately by [`in_scope`].
const PERMISSIONS: &[(Action, &[Role])] = &[
    (Action::OrderCreate, &[Role::Waiter, Role::Admin, Role::Manager]),
    (Action::OrderView, ALL_ROLES),
    (Action::OrderItemAdd, ALL_ROLES),
    (Action::OrderItemUpdate, ALL_ROLES),
    (Action::OrderItemRemove, ALL_ROLES),
    (Action::OrderPay, SETTLEMENT_ROLES),
    (Action::OrderCancel, SETTLEMENT_ROLES),
    (Action::OrderStatusSet, SETTLEMENT_ROLES),
    (Action::StockAdjust, SETTLEMENT_ROLES),
    (Action::StockView, BACK_OFFICE_ROLES),
    (Action::ProductView, BACK_OFFICE_ROLES),
    (Action::ProductManage, BACK_OFFICE_ROLES),
    (Action::TableManage, BACK_OFFICE_ROLES),
];

/// Verified caller identity handed in by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User id
    pub id: i64,
    /// Role
    pub role: Role,
    /// Home branch; `None` for users not bound to a branch
    pub branch_id: Option<i64>,
}

impl Actor {
    /// Creates a caller identity.
    #[must_use]
    pub const fn new(id: i64, role: Role, branch_id: Option<i64>) -> Self {
        Self {
            id,
            role,
            branch_id,
        }
    }

    /// Managers act on every branch.
    #[must_use]
    pub const fn has_global_scope(&self) -> bool {
        matches!(self.role, Role::Manager)
    }
}

/// Whether `role` may perform `action` at all.
#[must_use]
pub fn can_perform(role: Role, action: Action) -> bool {
    PERMISSIONS
        .iter()
        .find(|(entry, _)| *entry == action)
        .is_some_and(|(_, roles)| roles.contains(&role))
}

/// Whether `actor` may touch a resource living in `resource_branch`.
///
/// Managers are always in scope. Everyone else needs a home branch equal to the
/// resource's branch; a resource without a branch is out of scope for them.
#[must_use]
pub fn in_scope(actor: &Actor, resource_branch: Option<i64>) -> bool {
    if actor.has_global_scope() {
        return true;
    }
    match (actor.branch_id, resource_branch) {
        (Some(own), Some(target)) => own == target,
        _ => false,
    }
}

/// Role check, run before any database access.
pub fn ensure_permitted(actor: &Actor, action: Action) -> Result<()> {
    if can_perform(actor.role, action) {
        Ok(())
    } else {
        warn!(user_id = actor.id, role = %actor.role, %action, "Action denied by role");
        Err(Error::Forbidden {
            role: actor.role,
            action,
        })
    }
}

/// Branch check against a resource that has already been read.
pub fn ensure_in_scope(actor: &Actor, action: Action, resource_branch: Option<i64>) -> Result<()> {
    if in_scope(actor, resource_branch) {
        Ok(())
    } else {
        warn!(
            user_id = actor.id,
            caller_branch = ?actor.branch_id,
            resource_branch = ?resource_branch,
            %action,
            "Action denied by branch scope"
        );
        Err(Error::OutOfScope {
            action,
            caller_branch: actor.branch_id,
            resource_branch,
        })
    }
}

/// Role and branch check in one call.
pub fn authorize(actor: &Actor, action: Action, resource_branch: Option<i64>) -> Result<()> {
    ensure_permitted(actor, action)?;
    ensure_in_scope(actor, action, resource_branch)
}

/// Branch filter for list queries: `None` means every branch.
///
/// Callers without global scope must have a home branch.
pub fn visible_branch(actor: &Actor, action: Action) -> Result<Option<i64>> {
    if actor.has_global_scope() {
        return Ok(None);
    }
    actor.branch_id.map(Some).ok_or(Error::OutOfScope {
        action,
        caller_branch: None,
        resource_branch: None,
    })
}
