//! # kasse-db: Persistent Store and Ledger Engine
//!
//! This crate provides all access to the SQLite file shared by the terminal
//! and the back office.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasse Data Flow                                  │
//! │                                                                         │
//! │  Payment flow (terminal)          Staff handlers (back office)         │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasse-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────────┐  ┌──────────┐  ┌───────────┐  │   │
//! │  │   │ Database │  │ Repositories │  │  Ledger  │  │  Access   │  │   │
//! │  │   │ (pool)   │  │ account      │  │ balance  │  │ secret    │  │   │
//! │  │   │          │  │ product, log │  │ stock    │  │ PIN/token │  │   │
//! │  │   │ Settings │  │              │  │ logs     │  │           │  │   │
//! │  │   └──────────┘  └──────────────┘  └──────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   <data_dir>/kasse.db  (WAL, busy timeout, foreign keys)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasse_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("data/kasse.db")).await?;
//! let cash_account_id = db.bootstrap().await?;
//!
//! let ledger = db.ledger(clock, notifier);
//! ledger.adjust_balance(account_id, Money::from_cents(-150)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod settings;

// =============================================================================
// Re-exports
// =============================================================================

pub use access::{AccessError, AdminAccess, AdminSecret};
pub use error::{DbError, DbResult};
pub use ledger::{BalanceChange, Ledger, LedgerError, LedgerResult, Retention};
pub use pool::{Database, DbConfig};
pub use settings::Settings;

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::log::{LogRepository, RestockEntry, TopupEntry, TransactionEntry};
pub use repository::product::ProductRepository;
