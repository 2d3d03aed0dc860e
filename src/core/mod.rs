//! Business logic, independent of the HTTP layer.
//!
//! Functions take a connection (generic over `ConnectionTrait` where they are
//! meant to run inside a caller's transaction) and return crate errors.

/// Audit trail of writes
pub mod audit;
/// Passwords, tokens, users and permissions
pub mod auth;
/// Expense categories and subcategories
pub mod category;
/// Wall-clock abstraction
pub mod clock;
/// Canteen dishes
pub mod dish;
/// CSV exports
pub mod export;
/// Meals served outside the ordering flow
pub mod extra;
/// Monthly budget forecasts
pub mod forecast;
/// Allocation of operations to forecasts
pub mod imputation;
/// CSV imports
pub mod import;
/// Daily canteen invoices
pub mod invoice;
/// Daily menus
pub mod menu;
/// Bounds on monetary inputs
pub mod money;
/// Order confirmation messages
pub mod notify;
/// Expense operations
pub mod operation;
/// Canteen orders
pub mod order;
/// Same-day ordering cutoffs
pub mod order_window;
/// Order pricing and subsidy arithmetic
pub mod pricing;
/// Budget and canteen reports
pub mod report;
/// Subsidy rules
pub mod subsidy;
