//! # Log Views
//!
//! Newest-first reads of the append-only tables. Joins are LEFT joins so a
//! row keeps rendering after its account or product was deactivated.
//!
//! Inserts and trimming live in [`crate::Ledger`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// A transaction row with display names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TransactionEntry {
    pub id: i64,
    pub account_id: i64,
    pub account_name: Option<String>,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity: i64,
    /// Current unit price times quantity; prices may have changed since.
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A top-up row with the account name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopupEntry {
    pub id: i64,
    pub account_id: i64,
    pub account_name: Option<String>,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// A restock row with the product name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RestockEntry {
    pub id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// Read-only access to the log tables.
#[derive(Debug, Clone)]
pub struct LogRepository {
    pool: SqlitePool,
}

impl LogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LogRepository { pool }
    }

    /// Most recent transactions, newest first.
    pub async fn recent_transactions(&self, limit: i64) -> DbResult<Vec<TransactionEntry>> {
        let rows = sqlx::query_as::<_, TransactionEntry>(
            r#"
            SELECT t.id, t.account_id, a.name AS account_name,
                   t.product_id, p.name AS product_name,
                   t.quantity, p.price_cents * t.quantity AS amount_cents,
                   t.created_at
            FROM transactions t
            LEFT JOIN accounts a ON a.id = t.account_id
            LEFT JOIN products p ON p.id = t.product_id
            ORDER BY t.id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Most recent top-ups, newest first.
    pub async fn recent_topups(&self, limit: i64) -> DbResult<Vec<TopupEntry>> {
        let rows = sqlx::query_as::<_, TopupEntry>(
            r#"
            SELECT u.id, u.account_id, a.name AS account_name, u.amount_cents, u.created_at
            FROM topups u
            LEFT JOIN accounts a ON a.id = u.account_id
            ORDER BY u.id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Most recent restocks, newest first.
    pub async fn recent_restocks(&self, limit: i64) -> DbResult<Vec<RestockEntry>> {
        let rows = sqlx::query_as::<_, RestockEntry>(
            r#"
            SELECT r.id, r.product_id, p.name AS product_name, r.quantity, r.created_at
            FROM restocks r
            LEFT JOIN products p ON p.id = r.product_id
            ORDER BY r.id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Transactions recorded for one account, newest first.
    pub async fn transactions_for_account(&self, account_id: i64, limit: i64) -> DbResult<Vec<TransactionEntry>> {
        let rows = sqlx::query_as::<_, TransactionEntry>(
            r#"
            SELECT t.id, t.account_id, a.name AS account_name,
                   t.product_id, p.name AS product_name,
                   t.quantity, p.price_cents * t.quantity AS amount_cents,
                   t.created_at
            FROM transactions t
            LEFT JOIN accounts a ON a.id = t.account_id
            LEFT JOIN products p ON p.id = t.product_id
            WHERE t.account_id = ?1
            ORDER BY t.id DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Row counts `(transactions, topups, restocks)`.
    pub async fn counts(&self) -> DbResult<(i64, i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT (SELECT COUNT(*) FROM transactions),
                   (SELECT COUNT(*) FROM topups),
                   (SELECT COUNT(*) FROM restocks)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}
