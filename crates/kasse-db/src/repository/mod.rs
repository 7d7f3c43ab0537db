//! # Repository Module
//!
//! Row-level access to the store. Balance and stock mutations do NOT live
//! here: those go through [`crate::Ledger`], which owns the invariants.
//!
//! ## Available Repositories
//!
//! - [`account::AccountRepository`] - Account CRUD, token lookup, cash-sink bootstrap
//! - [`product::ProductRepository`] - Catalog CRUD with page-capacity checks
//! - [`log::LogRepository`] - Newest-first views of transactions, top-ups, restocks

pub mod account;
pub mod log;
pub mod product;

/// Column list shared by every account query.
pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, name, token, balance_cents, category, active, valid_from, valid_until, visible";

/// Column list shared by every product query.
pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, image, stock, min_stock, page, active";
