//! # Ledger Engine
//!
//! Atomic balance and stock mutation plus the capped purchase and top-up
//! logs. Everything that moves money or goods goes through here.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_balance(account, delta)                                         │
//! │                                                                         │
//! │   BEGIN                                                                 │
//! │     UPDATE accounts SET balance = balance  ◄── takes the write lock     │
//! │     SELECT account, overdraft_limit           first, so the other       │
//! │     check active / window / floor             process queues behind us  │
//! │     UPDATE accounts SET balance = new                                   │
//! │   COMMIT                                                                │
//! │                                                                         │
//! │  No transaction ever spans a wait for the patron.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics
//! Every public operation returns a [`LedgerError`]; nothing is applied
//! partially. Storage failures are logged at `error`, business declines at
//! `info`.

use std::sync::Arc;

use kasse_core::validation::validate_positive;
use kasse_core::{
    Account, ChangeNotifier, Clock, Money, ValidationError, TOPUP_RETENTION, TRANSACTION_RETENTION,
};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::DbError;
use crate::repository::ACCOUNT_COLUMNS;
use crate::settings::overdraft_limit_in;

// =============================================================================
// Errors
// =============================================================================

/// Typed ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing row, or an account that is inactive or outside its window.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// The change would take a floor-enforced account below `-overdraft_limit`.
    #[error("Insufficient funds on account {account_id}: balance {balance}, change {delta}, floor {floor}")]
    InsufficientFunds {
        account_id: i64,
        balance: Money,
        delta: Money,
        floor: Money,
    },

    /// Amount or quantity rejected before touching the store.
    #[error("Invalid amount: {0}")]
    Invalid(#[from] ValidationError),

    /// The store itself failed.
    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(DbError::from(err))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Types
// =============================================================================

/// Balance before and after a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub account_id: i64,
    pub old: Money,
    pub new: Money,
}

/// How many log rows survive trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub transactions: i64,
    pub topups: i64,
}

impl Default for Retention {
    fn default() -> Self {
        Retention {
            transactions: TRANSACTION_RETENTION,
            topups: TOPUP_RETENTION,
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// The Ledger Engine.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = db.ledger(Arc::new(SystemClock), markers.clone());
///
/// match ledger.adjust_balance(account_id, -total).await {
///     Ok(change) => println!("new balance {}", change.new),
///     Err(LedgerError::InsufficientFunds { .. }) => println!("limit exceeded"),
///     Err(e) => println!("try again: {}", e),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ChangeNotifier>,
    retention: Retention,
}

impl Ledger {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Ledger {
            pool,
            clock,
            notifier,
            retention: Retention::default(),
        }
    }

    /// Overrides the log caps.
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // =========================================================================
    // Balance
    // =========================================================================

    /// Applies `delta` to an account's balance atomically.
    ///
    /// ## Returns
    /// * `Ok(BalanceChange)` - Committed
    /// * `Err(NotFound)` - No such account, inactive, or outside its window
    /// * `Err(InsufficientFunds)` - A debit would breach the overdraft floor
    /// * `Err(Storage)` - Store failure; nothing written
    pub async fn adjust_balance(&self, account_id: i64, delta: Money) -> LedgerResult<BalanceChange> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let change = apply_balance(&mut tx, account_id, delta, self.clock.today()).await?;
            tx.commit().await?;
            Ok(change)
        }
        .await;

        observe("adjust_balance", result.map(|change| {
            debug!(account_id, old = %change.old, new = %change.new, "Balance adjusted");
            change
        }))
    }

    /// Credits an account and logs the top-up in one unit of work.
    ///
    /// `amount` must be positive.
    pub async fn top_up(&self, account_id: i64, amount: Money) -> LedgerResult<BalanceChange> {
        let result = async {
            validate_positive("amount", amount.cents())?;
            let mut tx = self.pool.begin().await?;
            let change = apply_balance(&mut tx, account_id, amount, self.clock.today()).await?;
            insert_topup(&mut tx, account_id, amount, self.clock.as_ref(), self.retention.topups).await?;
            tx.commit().await?;
            Ok(change)
        }
        .await;

        observe("top_up", result.map(|change| {
            info!(account_id, amount = %amount, new = %change.new, "Account topped up");
            change
        }))
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Applies a signed stock delta. Stock may go negative.
    ///
    /// Raises the change notifier after commit.
    ///
    /// ## Returns
    /// The new stock level.
    pub async fn adjust_stock(&self, product_id: i64, delta: i64) -> LedgerResult<i64> {
        let result = async {
            let stock: Option<i64> =
                sqlx::query_scalar("UPDATE products SET stock = stock + ?2 WHERE id = ?1 RETURNING stock")
                    .bind(product_id)
                    .bind(delta)
                    .fetch_optional(&self.pool)
                    .await?;
            stock.ok_or(LedgerError::NotFound {
                entity: "Product",
                id: product_id,
            })
        }
        .await;

        let stock = observe("adjust_stock", result)?;
        debug!(product_id, delta, stock, "Stock adjusted");
        self.notifier.content_changed();
        Ok(stock)
    }

    /// Adds a delivery to stock and logs it in one unit of work.
    ///
    /// `quantity` must be positive. Restock rows are never trimmed.
    pub async fn record_restock(&self, product_id: i64, quantity: i64) -> LedgerResult<i64> {
        let result = async {
            validate_positive("quantity", quantity)?;
            let mut tx = self.pool.begin().await?;

            let stock: Option<i64> =
                sqlx::query_scalar("UPDATE products SET stock = stock + ?2 WHERE id = ?1 RETURNING stock")
                    .bind(product_id)
                    .bind(quantity)
                    .fetch_optional(&mut *tx)
                    .await?;
            let stock = stock.ok_or(LedgerError::NotFound {
                entity: "Product",
                id: product_id,
            })?;

            sqlx::query("INSERT INTO restocks (product_id, quantity, created_at) VALUES (?1, ?2, ?3)")
                .bind(product_id)
                .bind(quantity)
                .bind(self.clock.now())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(stock)
        }
        .await;

        let stock = observe("record_restock", result)?;
        info!(product_id, quantity, stock, "Product restocked");
        self.notifier.content_changed();
        Ok(stock)
    }

    // =========================================================================
    // Logs
    // =========================================================================

    /// Appends a purchase row, then trims to the retention cap.
    ///
    /// ## Returns
    /// The new row id.
    pub async fn record_transaction(&self, account_id: i64, product_id: i64, quantity: i64) -> LedgerResult<i64> {
        let result = async {
            validate_positive("quantity", quantity)?;
            let mut tx = self.pool.begin().await?;

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO transactions (account_id, product_id, quantity, created_at)
                VALUES (?1, ?2, ?3, ?4)
                RETURNING id
                "#,
            )
            .bind(account_id)
            .bind(product_id)
            .bind(quantity)
            .bind(self.clock.now())
            .fetch_one(&mut *tx)
            .await?;

            let trimmed = sqlx::query(
                r#"
                DELETE FROM transactions
                WHERE id <= (SELECT id FROM transactions ORDER BY id DESC LIMIT 1 OFFSET ?1)
                "#,
            )
            .bind(self.retention.transactions)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;
            if trimmed > 0 {
                debug!(trimmed, "Trimmed transaction log");
            }
            Ok(id)
        }
        .await;

        observe("record_transaction", result)
    }

    /// Appends a top-up row, then trims to the retention cap.
    ///
    /// Does not touch the balance; see [`Ledger::top_up`].
    pub async fn record_topup(&self, account_id: i64, amount: Money) -> LedgerResult<i64> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let id = insert_topup(&mut tx, account_id, amount, self.clock.as_ref(), self.retention.topups).await?;
            tx.commit().await?;
            Ok(id)
        }
        .await;

        observe("record_topup", result)
    }
}

// =============================================================================
// Transaction-Scoped Steps
// =============================================================================

async fn apply_balance(
    conn: &mut SqliteConnection,
    account_id: i64,
    delta: Money,
    today: chrono::NaiveDate,
) -> LedgerResult<BalanceChange> {
    let touched = sqlx::query("UPDATE accounts SET balance_cents = balance_cents WHERE id = ?1")
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

    let not_found = LedgerError::NotFound {
        entity: "Account",
        id: account_id,
    };
    if touched.rows_affected() == 0 {
        return Err(not_found);
    }

    let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
    let account: Account = sqlx::query_as(&sql)
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;

    if !account.is_usable_on(today) {
        return Err(not_found);
    }

    let old = account.balance();
    let new = old.checked_add(delta).ok_or_else(|| ValidationError::OutOfRange {
        field: "amount".to_string(),
        min: i64::MIN,
        max: i64::MAX,
    })?;

    if account.category.enforces_overdraft_floor() && delta.is_negative() {
        let floor = -overdraft_limit_in(conn).await?;
        if new < floor {
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance: old,
                delta,
                floor,
            });
        }
    }

    sqlx::query("UPDATE accounts SET balance_cents = ?2 WHERE id = ?1")
        .bind(account_id)
        .bind(new.cents())
        .execute(&mut *conn)
        .await?;

    Ok(BalanceChange { account_id, old, new })
}

async fn insert_topup(
    conn: &mut SqliteConnection,
    account_id: i64,
    amount: Money,
    clock: &dyn Clock,
    retention: i64,
) -> LedgerResult<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO topups (account_id, amount_cents, created_at) VALUES (?1, ?2, ?3) RETURNING id",
    )
    .bind(account_id)
    .bind(amount.cents())
    .bind(clock.now())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM topups WHERE id <= (SELECT id FROM topups ORDER BY id DESC LIMIT 1 OFFSET ?1)")
        .bind(retention)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

/// Logs a failed ledger operation at the level its kind deserves.
fn observe<T>(operation: &'static str, result: LedgerResult<T>) -> LedgerResult<T> {
    if let Err(err) = &result {
        match err {
            LedgerError::Storage(e) => error!(operation, error = %e, "Ledger storage failure"),
            LedgerError::InsufficientFunds { account_id, .. } => {
                info!(operation, account_id, "Declined: overdraft floor")
            }
            LedgerError::NotFound { entity, id } => warn!(operation, entity, id, "Ledger target not found"),
            LedgerError::Invalid(e) => warn!(operation, error = %e, "Ledger input rejected"),
        }
    }
    result
}

// =============================================================================
// Unit Tests
// =============================================================================
