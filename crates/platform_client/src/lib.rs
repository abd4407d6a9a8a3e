//! Ad-platform API client library.
//!
//! Read access to enabled ads and performance reports, mutation of
//! budgets and ad status, and the budget-cap resolver queries.

pub mod rest;

pub use rest::{BudgetCap, PlatformClient};
