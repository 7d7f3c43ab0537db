//! # kasse-core: Pure Domain Logic for the Kasse Kiosk
//!
//! This crate holds everything about the kiosk that can be decided without
//! touching a disk, a socket, or a card reader.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasse Architecture                               │
//! │                                                                         │
//! │  ┌──────────────────────────┐        ┌──────────────────────────┐      │
//! │  │   apps/terminal          │        │   apps/back-office       │      │
//! │  │   payment state machine  │        │   HTTP/JSON staff API    │      │
//! │  └────────────┬─────────────┘        └────────────┬─────────────┘      │
//! │               │                                   │                     │
//! │  ┌────────────▼───────────────────────────────────▼─────────────┐      │
//! │  │        kasse-db (ledger, repositories)   kasse-sync (markers) │      │
//! │  └────────────┬─────────────────────────────────────────────────┘      │
//! │               │                                                         │
//! │  ┌────────────▼─────────────────────────────────────────────────┐      │
//! │  │               ★ kasse-core (THIS CRATE) ★                    │      │
//! │  │                                                               │      │
//! │  │   ┌─────────┐  ┌─────────┐  ┌────────────┐  ┌─────────────┐  │      │
//! │  │   │  types  │  │  money  │  │ validation │  │    wager    │  │      │
//! │  │   │ Account │  │  Money  │  │   rules    │  │ Board, Game │  │      │
//! │  │   │ Product │  │         │  │            │  │  opponent   │  │      │
//! │  │   └─────────┘  └─────────┘  └────────────┘  └─────────────┘  │      │
//! │  │                                                               │      │
//! │  │   NO I/O • NO DATABASE • NO FILES • PURE FUNCTIONS            │      │
//! │  └───────────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Account, Product, log rows, settings keys)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for staff edits and purchases
//! - [`wager`] - The post-purchase board game and its opponent
//! - [`seams`] - Clock and change-notification traits injected by callers
//!
//! ## Example Usage
//!
//! ```rust
//! use kasse_core::money::Money;
//!
//! let price = Money::from_cents(150);
//! let total = price.checked_times(3).unwrap();
//! assert_eq!(total.cents(), 450);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod seams;
pub mod types;
pub mod validation;
pub mod wager;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use seams::{ChangeNotifier, Clock, FixedClock, NoopNotifier, SystemClock};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of transaction rows retained; older rows are trimmed by id.
pub const TRANSACTION_RETENTION: i64 = 10_000;

/// Number of top-up rows retained; older rows are trimmed by id.
pub const TOPUP_RETENTION: i64 = 50;

/// Largest quantity a patron can pick for one purchase.
pub const MAX_PURCHASE_QUANTITY: i64 = 10;

/// Active products allowed on a single catalog page.
///
/// Enforced by staff-side validation only; the ledger never looks at pages.
pub const PAGE_CAPACITY: i64 = 9;

/// Upper bound on event accounts offered at method selection.
pub const MAX_EVENT_CHOICES: usize = 8;

/// Display name of the reserved cash-sink account.
pub const CASH_ACCOUNT_NAME: &str = "BARZAHLUNG";
