//! Business logic for the order lifecycle and stock ledger.
//!
//! Nothing here knows about transports; callers pass an [`guard::Actor`] and a
//! database connection.

/// Products and dining tables, plus catalog seeding
pub mod catalog;
/// Roles, permissions and branch scope
pub mod guard;
/// Order creation, line edits, payment and cancellation
pub mod lifecycle;
/// Order rows, lines and totals
pub mod order;
/// Stock quantities and the movement ledger
pub mod stock;
