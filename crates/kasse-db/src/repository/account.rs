//! # Account Repository
//!
//! Database operations for accounts.
//!
//! ## Key Operations
//! - Token lookup for card payments and admin entry
//! - Event-account list for quick pay
//! - Staff CRUD (soft delete only)
//! - Idempotent cash-sink bootstrap
//!
//! Balances are never written here; see [`crate::Ledger`].

use chrono::NaiveDate;
use kasse_core::validation::validate_account_draft;
use kasse_core::{Account, AccountCategory, AccountDraft, ValidationError, CASH_ACCOUNT_NAME};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::ACCOUNT_COLUMNS;
use crate::error::{DbError, DbResult};

/// Repository for account database operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists accounts ordered by name.
    ///
    /// ## Arguments
    /// * `include_inactive` - Also return soft-deleted accounts
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE active = 1 OR ?1 ORDER BY name COLLATE NOCASE, id",
            ACCOUNT_COLUMNS
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(accounts)
    }

    /// Gets an account by id, active or not.
    ///
    /// ## Returns
    /// * `Ok(Some(Account))` - Account found
    /// * `Ok(None)` - No such id
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    /// Finds the account bound to an identity token.
    ///
    /// Returns the row whatever its state; callers decide whether it may
    /// pay (see [`Account::can_pay_by_token_on`]).
    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<Account>> {
        let token = token.trim();
        debug!(token_len = token.len(), "Looking up account by token");

        let sql = format!("SELECT {} FROM accounts WHERE token = ?1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    /// Event accounts that may be offered for quick pay on `today`.
    ///
    /// ## Filter
    /// category = event, active, visible, `today` inside the validity window.
    /// ISO dates compare correctly as TEXT.
    pub async fn list_selectable_events(&self, today: NaiveDate, limit: usize) -> DbResult<Vec<Account>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM accounts
            WHERE category = 'event'
              AND active = 1
              AND visible = 1
              AND (valid_from IS NULL OR valid_from <= ?1)
              AND (valid_until IS NULL OR valid_until >= ?1)
            ORDER BY name COLLATE NOCASE, id
            LIMIT ?2
            "#,
            ACCOUNT_COLUMNS
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(today)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(accounts)
    }

    /// The reserved cash-sink account, if bootstrapped.
    pub async fn cash_account(&self) -> DbResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE category = 'cash_sink' LIMIT 1",
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Returns the cash-sink account id, creating the row if absent.
    ///
    /// ## Concurrency
    /// ```text
    /// terminal bootstrap ──┐
    ///                      ├──► INSERT .. ON CONFLICT DO NOTHING
    /// back-office boot   ──┘        (partial unique index on cash_sink)
    ///                                     │
    ///                                     ▼
    ///                          both SELECT the same row
    /// ```
    pub async fn ensure_cash_account(&self) -> DbResult<i64> {
        if let Some(existing) = self.cash_account().await? {
            return Ok(existing.id);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (name, token, balance_cents, category, active, visible)
            VALUES (?1, NULL, 0, 'cash_sink', 1, 0)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(CASH_ACCOUNT_NAME)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            info!(name = CASH_ACCOUNT_NAME, "Created cash-sink account");
        }

        self.cash_account()
            .await?
            .map(|account| account.id)
            .ok_or_else(|| DbError::Internal("cash-sink account missing after insert".to_string()))
    }

    // =========================================================================
    // Staff Writes
    // =========================================================================

    /// Creates an account with a zero balance.
    ///
    /// ## Returns
    /// * `Ok(Account)` - The stored row
    /// * `Err(DbError::Invalid)` - Draft failed validation
    /// * `Err(DbError::UniqueViolation)` - Token already bound
    pub async fn insert(&self, draft: &AccountDraft) -> DbResult<Account> {
        validate_account_draft(draft)?;
        let token = normalized_token(draft);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (name, token, balance_cents, category, active, valid_from, valid_until, visible)
            VALUES (?1, ?2, 0, ?3, 1, ?4, ?5, ?6)
            RETURNING id
            "#,
        )
        .bind(draft.name.trim())
        .bind(&token)
        .bind(draft.category)
        .bind(draft.valid_from)
        .bind(draft.valid_until)
        .bind(draft.visible)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| token_conflict(e.into(), token.as_deref()))?;

        info!(account_id = id, category = draft.category.as_str(), "Account created");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Account", id))
    }

    /// Updates an active account's descriptive fields. Balance is untouched.
    pub async fn update(&self, id: i64, draft: &AccountDraft) -> DbResult<Account> {
        validate_account_draft(draft)?;
        let token = normalized_token(draft);

        let current = self.get_active(id).await?;
        if current.category == AccountCategory::CashSink {
            return Err(protected_cash_sink());
        }

        sqlx::query(
            r#"
            UPDATE accounts
            SET name = ?2, token = ?3, category = ?4, valid_from = ?5, valid_until = ?6, visible = ?7
            WHERE id = ?1 AND active = 1
            "#,
        )
        .bind(id)
        .bind(draft.name.trim())
        .bind(&token)
        .bind(draft.category)
        .bind(draft.valid_from)
        .bind(draft.valid_until)
        .bind(draft.visible)
        .execute(&self.pool)
        .await
        .map_err(|e| token_conflict(e.into(), token.as_deref()))?;

        debug!(account_id = id, "Account updated");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Account", id))
    }

    /// Soft-deletes an account and releases its token.
    ///
    /// Historical transactions and top-ups keep pointing at the row.
    pub async fn soft_delete(&self, id: i64) -> DbResult<()> {
        let current = self.get_active(id).await?;
        if current.category == AccountCategory::CashSink {
            return Err(protected_cash_sink());
        }

        sqlx::query("UPDATE accounts SET active = 0, token = NULL WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(account_id = id, "Account deactivated");
        Ok(())
    }

    async fn get_active(&self, id: i64) -> DbResult<Account> {
        match self.get_by_id(id).await? {
            Some(account) if account.active => Ok(account),
            _ => Err(DbError::not_found("Account", id)),
        }
    }
}

fn normalized_token(draft: &AccountDraft) -> Option<String> {
    draft
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn token_conflict(err: DbError, token: Option<&str>) -> DbError {
    match (err, token) {
        (DbError::UniqueViolation { .. }, Some(token)) => DbError::duplicate("token", token),
        (err, _) => err,
    }
}

fn protected_cash_sink() -> DbError {
    DbError::Invalid(ValidationError::NotAllowed {
        field: "account".to_string(),
        allowed: vec!["standard".to_string(), "event".to_string(), "admin".to_string()],
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn repo() -> AccountRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.bootstrap().await.unwrap();
        db.accounts()
    }

    #[tokio::test]
    async fn test_insert_and_find_by_token() {
        let repo = repo().await;
        let alice = repo
            .insert(&AccountDraft::standard("Alice").with_token(" TESTCARD123 "))
            .await
            .unwrap();

        assert_eq!(alice.balance_cents, 0);
        assert_eq!(alice.token.as_deref(), Some("TESTCARD123"));

        let found = repo.find_by_token("TESTCARD123").await.unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert!(repo.find_by_token("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_is_reported() {
        let repo = repo().await;
        repo.insert(&AccountDraft::standard("Alice").with_token("CARD1"))
            .await
            .unwrap();
        let err = repo
            .insert(&AccountDraft::standard("Mallory").with_token("CARD1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "CARD1"));
    }

    #[tokio::test]
    async fn test_ensure_cash_account_returns_same_id() {
        let repo = repo().await;
        let first = repo.ensure_cash_account().await.unwrap();
        let second = repo.ensure_cash_account().await.unwrap();
        assert_eq!(first, second);

        let cash = repo.cash_account().await.unwrap().unwrap();
        assert_eq!(cash.name, CASH_ACCOUNT_NAME);
        assert_eq!(cash.category, AccountCategory::CashSink);
        assert!(!cash.visible);
        assert_eq!(cash.token, None);
    }

    #[tokio::test]
    async fn test_cash_sink_is_protected() {
        let repo = repo().await;
        let cash_id = repo.ensure_cash_account().await.unwrap();
        assert!(matches!(repo.soft_delete(cash_id).await, Err(DbError::Invalid(_))));
        assert!(matches!(
            repo.update(cash_id, &AccountDraft::standard("Renamed")).await,
            Err(DbError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_releases_token() {
        let repo = repo().await;
        let bob = repo
            .insert(&AccountDraft::standard("Bob").with_token("TESTCARD456"))
            .await
            .unwrap();

        repo.soft_delete(bob.id).await.unwrap();

        let stored = repo.get_by_id(bob.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.token, None);
        assert!(repo.find_by_token("TESTCARD456").await.unwrap().is_none());

        // The token can be handed to someone else
        repo.insert(&AccountDraft::standard("Bobby").with_token("TESTCARD456"))
            .await
            .unwrap();

        let listed = repo.list(false).await.unwrap();
        assert!(listed.iter().all(|a| a.id != bob.id));
        assert!(repo.list(true).await.unwrap().iter().any(|a| a.id == bob.id));

        assert!(matches!(repo.soft_delete(bob.id).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_selectable_events_filter() {
        let repo = repo().await;
        let today = date(2026, 5, 2);

        let open = AccountDraft::standard("Open Fest").with_category(AccountCategory::Event);
        let window = AccountDraft::standard("Weekend")
            .with_category(AccountCategory::Event)
            .with_window(Some(date(2026, 5, 1)), Some(date(2026, 5, 2)));
        let expired = AccountDraft::standard("Yesterday")
            .with_category(AccountCategory::Event)
            .with_window(None, Some(date(2026, 5, 1)));
        let future = AccountDraft::standard("Later")
            .with_category(AccountCategory::Event)
            .with_window(Some(date(2026, 5, 3)), None);
        let mut hidden = AccountDraft::standard("Hidden").with_category(AccountCategory::Event);
        hidden.visible = false;

        for draft in [&open, &window, &expired, &future, &hidden] {
            repo.insert(draft).await.unwrap();
        }
        repo.insert(&AccountDraft::standard("Alice")).await.unwrap();

        let names: Vec<String> = repo
            .list_selectable_events(today, 8)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Open Fest".to_string(), "Weekend".to_string()]);

        assert_eq!(repo.list_selectable_events(today, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_balance() {
        let repo = repo().await;
        let acc = repo.insert(&AccountDraft::standard("Alice")).await.unwrap();
        sqlx::query("UPDATE accounts SET balance_cents = 700 WHERE id = ?1")
            .bind(acc.id)
            .execute(&repo.pool)
            .await
            .unwrap();

        let updated = repo
            .update(acc.id, &AccountDraft::standard("Alice B.").with_token("NEW"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Alice B.");
        assert_eq!(updated.balance_cents, 700);
        assert_eq!(updated.token.as_deref(), Some("NEW"));
    }
}
