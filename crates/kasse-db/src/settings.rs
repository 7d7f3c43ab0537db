//! # Settings Service
//!
//! Typed access to the `settings` key/value table.
//!
//! Components receive a [`Settings`] handle instead of reading the table ad
//! hoc. Missing rows fall back to [`SettingKey::default_value`]; malformed
//! numeric values fall back to the default with a warning.
//!
//! The `*_in` functions read through a caller-supplied connection so the
//! ledger can consult the overdraft limit inside its own transaction.

use kasse_core::validation::validate_setting;
use kasse_core::{Money, SettingKey};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::DbResult;

/// Key/value configuration service.
#[derive(Debug, Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    pub fn new(pool: SqlitePool) -> Self {
        Settings { pool }
    }

    // =========================================================================
    // Generic Accessors
    // =========================================================================

    /// Raw string value, or the key's default when the row is missing.
    pub async fn get_string(&self, key: SettingKey) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        get_string_in(&mut *conn, key).await
    }

    /// Integer value, or the key's default when missing or malformed.
    pub async fn get_int(&self, key: SettingKey) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        get_int_in(&mut *conn, key).await
    }

    /// Boolean value (`"1"`/`"true"`), or the key's default.
    pub async fn get_bool(&self, key: SettingKey) -> DbResult<bool> {
        let raw = self.get_string(key).await?;
        Ok(parse_bool(&raw))
    }

    /// Validates and upserts a value.
    pub async fn set(&self, key: SettingKey, value: &str) -> DbResult<()> {
        validate_setting(key, value)?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;

        // Never log the PIN or messaging credentials
        info!(key = key.as_str(), "Setting updated");
        Ok(())
    }

    /// Every known key with its effective value, in display order.
    pub async fn all(&self) -> DbResult<Vec<(SettingKey, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(SettingKey::ALL
            .into_iter()
            .map(|key| {
                let value = rows
                    .iter()
                    .find(|(k, _)| k == key.as_str())
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| key.default_value().to_string());
                (key, value)
            })
            .collect())
    }

    // =========================================================================
    // Typed Accessors
    // =========================================================================

    /// Maximum negative balance for floor-enforced accounts.
    pub async fn overdraft_limit(&self) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        overdraft_limit_in(&mut *conn).await
    }

    /// PIN for on-device admin entry.
    pub async fn admin_pin(&self) -> DbResult<String> {
        self.get_string(SettingKey::AdminPin).await
    }

    /// Token authorizing terminal top-ups, `None` when unset.
    pub async fn auto_topup_token(&self) -> DbResult<Option<String>> {
        let raw = self.get_string(SettingKey::AutoTopupToken).await?;
        let trimmed = raw.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    /// Whether the post-purchase wager is offered.
    pub async fn wager_enabled(&self) -> DbResult<bool> {
        self.get_bool(SettingKey::WagerEnabled).await
    }
}

// =============================================================================
// Connection-Scoped Reads
// =============================================================================

/// Reads a value through an existing connection or transaction.
pub async fn get_string_in(conn: &mut SqliteConnection, key: SettingKey) -> DbResult<String> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
        .bind(key.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(value.unwrap_or_else(|| key.default_value().to_string()))
}

/// Integer read through an existing connection or transaction.
pub async fn get_int_in(conn: &mut SqliteConnection, key: SettingKey) -> DbResult<i64> {
    let raw = get_string_in(conn, key).await?;
    match raw.trim().parse::<i64>() {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!(key = key.as_str(), value = %raw, "Malformed integer setting, using default");
            Ok(key.default_value().parse().unwrap_or(0))
        }
    }
}

/// Overdraft limit read through an existing connection or transaction.
///
/// A negative stored value is treated as zero.
pub async fn overdraft_limit_in(conn: &mut SqliteConnection) -> DbResult<Money> {
    let limit = get_int_in(conn, SettingKey::OverdraftLimit).await?;
    debug!(limit, "Overdraft limit read");
    Ok(Money::from_cents(limit.max(0)))
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// =============================================================================
// Unit Tests
// =============================================================================
