//! # Domain Types
//!
//! Core domain types shared by the terminal, the back office and the store.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Account      │   │    Product      │   │  Settings keys  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  token (opt)    │   │  price_cents    │   │  overdraft_limit│       │
//! │  │  balance_cents  │   │  stock (signed) │   │  admin_pin      │       │
//! │  │  category       │   │  min_stock      │   │  auto_topup_... │       │
//! │  │  valid window   │   │  page           │   │  wager_enabled  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ TransactionRec. │   │     Topup       │   │    Restock      │       │
//! │  │  capped 10,000  │   │   capped 50     │   │   untrimmed     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are store-assigned integers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Account Category
// =============================================================================

/// What kind of balance holder an account is.
///
/// ## Overdraft Floor
/// ```text
/// ┌──────────────┬──────────────────────────────────────────────────────┐
/// │ Standard     │ balance ≥ -overdraft_limit after every mutation      │
/// │ Admin        │ same floor as Standard; token also unlocks admin mode│
/// │ Event        │ exempt: may go arbitrarily negative                  │
/// │ CashSink     │ exempt: records cash sales, balance never touched    │
/// └──────────────┴──────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    Standard,
    CashSink,
    Event,
    Admin,
}

impl AccountCategory {
    /// Whether committed balances must stay at or above `-overdraft_limit`.
    pub const fn enforces_overdraft_floor(&self) -> bool {
        matches!(self, AccountCategory::Standard | AccountCategory::Admin)
    }

    /// The lowercase name stored in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AccountCategory::Standard => "standard",
            AccountCategory::CashSink => "cash_sink",
            AccountCategory::Event => "event",
            AccountCategory::Admin => "admin",
        }
    }
}

impl Default for AccountCategory {
    fn default() -> Self {
        AccountCategory::Standard
    }
}

// =============================================================================
// Account
// =============================================================================

/// A balance-holding entity, optionally bound to an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: i64,

    /// Display name shown on the terminal after a purchase.
    pub name: String,

    /// Identity token (card UID). Unique among accounts when present.
    pub token: Option<String>,

    /// Balance in minor units.
    pub balance_cents: i64,

    pub category: AccountCategory,

    /// Soft-delete flag; inactive accounts can neither pay nor be listed.
    pub active: bool,

    /// First day the account can be used (inclusive).
    pub valid_from: Option<NaiveDate>,

    /// Last day the account can be used (inclusive).
    pub valid_until: Option<NaiveDate>,

    /// Offered in the event-account quick-pay list.
    pub visible: bool,
}

impl Account {
    /// Returns the balance as [`Money`].
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// Whether `date` falls inside the optional validity window.
    pub fn within_window(&self, date: NaiveDate) -> bool {
        self.valid_from.map_or(true, |from| date >= from)
            && self.valid_until.map_or(true, |until| date <= until)
    }

    /// Active and inside the validity window on `date`.
    pub fn is_usable_on(&self, date: NaiveDate) -> bool {
        self.active && self.within_window(date)
    }

    /// Whether a tapped token for this account may pay for a purchase.
    ///
    /// The cash sink never pays by token; bootstrap creates it without one.
    pub fn can_pay_by_token_on(&self, date: NaiveDate) -> bool {
        self.category != AccountCategory::CashSink && self.is_usable_on(date)
    }

    /// Offered (and accepted) as an event-account payment on `date`.
    pub fn is_selectable_event_on(&self, date: NaiveDate) -> bool {
        self.category == AccountCategory::Event && self.visible && self.is_usable_on(date)
    }

    /// Whether this account's token unlocks admin mode on `date`.
    pub fn grants_admin_on(&self, date: NaiveDate) -> bool {
        self.category == AccountCategory::Admin && self.is_usable_on(date)
    }
}

/// Fields staff supply when creating or editing an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDraft {
    pub name: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub category: AccountCategory,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl AccountDraft {
    /// A visible standard account with no token and no window.
    pub fn standard(name: impl Into<String>) -> Self {
        AccountDraft {
            name: name.into(),
            token: None,
            category: AccountCategory::Standard,
            valid_from: None,
            valid_until: None,
            visible: true,
        }
    }

    /// Builder-style token binding.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builder-style category.
    pub fn with_category(mut self, category: AccountCategory) -> Self {
        self.category = category;
        self
    }

    /// Builder-style validity window.
    pub fn with_window(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Product
// =============================================================================

/// A product available for purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,

    pub name: String,

    /// Unit price in minor units.
    pub price_cents: i64,

    /// Image reference, opaque to the ledger.
    pub image: Option<String>,

    /// Current stock. Negative means a physical deficit.
    pub stock: i64,

    /// Threshold under which staff views flag the product.
    pub min_stock: i64,

    /// Catalog page (display grouping).
    pub page: i64,

    /// Soft-delete flag.
    pub active: bool,
}

impl Product {
    /// Returns the unit price as [`Money`].
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Whether stock has dropped below the minimum threshold.
    pub fn is_low_on_stock(&self) -> bool {
        self.stock < self.min_stock
    }
}

/// Fields staff supply when creating or editing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default = "default_page")]
    pub page: i64,
}

impl ProductDraft {
    /// A product on page 1 with no stock.
    pub fn new(name: impl Into<String>, price_cents: i64) -> Self {
        ProductDraft {
            name: name.into(),
            price_cents,
            image: None,
            stock: 0,
            min_stock: 0,
            page: 1,
        }
    }

    /// Builder-style opening stock.
    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    /// Builder-style page.
    pub fn on_page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }
}

fn default_page() -> i64 {
    1
}

// =============================================================================
// Log Rows
// =============================================================================

/// One purchase line. Append-only, trimmed to the most recent rows by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// One balance top-up. Append-only, trimmed to the most recent rows by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Topup {
    pub id: i64,
    pub account_id: i64,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// One stock delivery. Append-only, never trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Restock {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Settings Keys
// =============================================================================

/// Keys of the store's key/value settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    /// Maximum negative balance for floor-enforced accounts (minor units).
    OverdraftLimit,
    /// Numeric PIN for on-device admin entry.
    AdminPin,
    /// Token that authorizes a terminal top-up.
    AutoTopupToken,
    /// Whether the post-purchase wager is offered ("1"/"0").
    WagerEnabled,
    /// Credential for the external summary messaging integration.
    MessagingToken,
    /// Destination of the external summary messages.
    MessagingChat,
}

impl SettingKey {
    /// Every known key, in display order.
    pub const ALL: [SettingKey; 6] = [
        SettingKey::OverdraftLimit,
        SettingKey::AdminPin,
        SettingKey::AutoTopupToken,
        SettingKey::WagerEnabled,
        SettingKey::MessagingToken,
        SettingKey::MessagingChat,
    ];

    /// The key as stored in the `settings` table.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SettingKey::OverdraftLimit => "overdraft_limit",
            SettingKey::AdminPin => "admin_pin",
            SettingKey::AutoTopupToken => "auto_topup_token",
            SettingKey::WagerEnabled => "wager_enabled",
            SettingKey::MessagingToken => "messaging_token",
            SettingKey::MessagingChat => "messaging_chat",
        }
    }

    /// Value used when the row is missing.
    pub const fn default_value(&self) -> &'static str {
        match self {
            SettingKey::OverdraftLimit => "0",
            SettingKey::AdminPin => "1234",
            SettingKey::AutoTopupToken => "",
            SettingKey::WagerEnabled => "0",
            SettingKey::MessagingToken => "",
            SettingKey::MessagingChat => "",
        }
    }

    /// Parses a stored key name.
    pub fn parse(key: &str) -> Option<SettingKey> {
        SettingKey::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account(category: AccountCategory) -> Account {
        Account {
            id: 1,
            name: "Alice".to_string(),
            token: Some("TESTCARD123".to_string()),
            balance_cents: 1000,
            category,
            active: true,
            valid_from: None,
            valid_until: None,
            visible: true,
        }
    }

    #[test]
    fn test_overdraft_floor_by_category() {
        assert!(AccountCategory::Standard.enforces_overdraft_floor());
        assert!(AccountCategory::Admin.enforces_overdraft_floor());
        assert!(!AccountCategory::Event.enforces_overdraft_floor());
        assert!(!AccountCategory::CashSink.enforces_overdraft_floor());
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let mut acc = account(AccountCategory::Event);
        acc.valid_from = Some(date(2026, 5, 1));
        acc.valid_until = Some(date(2026, 5, 3));

        assert!(!acc.is_usable_on(date(2026, 4, 30)));
        assert!(acc.is_usable_on(date(2026, 5, 1)));
        assert!(acc.is_usable_on(date(2026, 5, 3)));
        assert!(!acc.is_usable_on(date(2026, 5, 4)));
    }

    #[test]
    fn test_event_selectability() {
        let mut acc = account(AccountCategory::Event);
        let today = date(2026, 5, 2);
        assert!(acc.is_selectable_event_on(today));

        acc.visible = false;
        assert!(!acc.is_selectable_event_on(today));

        acc.visible = true;
        acc.valid_until = Some(date(2026, 5, 1));
        assert!(!acc.is_selectable_event_on(today));

        assert!(!account(AccountCategory::Standard).is_selectable_event_on(today));
    }

    #[test]
    fn test_cash_sink_never_pays_by_token() {
        let today = date(2026, 5, 2);
        assert!(!account(AccountCategory::CashSink).can_pay_by_token_on(today));
        assert!(account(AccountCategory::Standard).can_pay_by_token_on(today));

        let mut inactive = account(AccountCategory::Standard);
        inactive.active = false;
        assert!(!inactive.can_pay_by_token_on(today));
    }

    #[test]
    fn test_setting_key_lookup() {
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(SettingKey::parse("telegram"), None);
        assert_eq!(SettingKey::AdminPin.default_value(), "1234");
        assert_eq!(SettingKey::OverdraftLimit.default_value(), "0");
    }

    #[test]
    fn test_account_draft_defaults_from_json() {
        let draft: AccountDraft = serde_json::from_str(r#"{"name":"Bob"}"#).unwrap();
        assert_eq!(draft, AccountDraft::standard("Bob"));

        let draft: AccountDraft =
            serde_json::from_str(r#"{"name":"Fest","category":"event","valid_until":"2026-05-03"}"#)
                .unwrap();
        assert_eq!(draft.category, AccountCategory::Event);
        assert_eq!(draft.valid_until, Some(date(2026, 5, 3)));
    }
}
