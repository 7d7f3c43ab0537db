//! # Payment Resolution
//!
//! Turns "this product, this quantity, paid like this" into ledger calls.
//!
//! ## Settlement Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Card / Event                          Cash                             │
//! │  ────────────                          ────                             │
//! │  1. AdjustBalance(-total) ──declined──► stop, nothing else runs         │
//! │  2. AdjustStock(-quantity)             1. AdjustStock(-quantity)        │
//! │  3. RecordTransaction                  2. RecordTransaction (cash sink) │
//! │                                                                         │
//! │  A failure in step 2 or 3 undoes the earlier steps with compensating    │
//! │  ledger calls; each step is its own short unit of work.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wager settlement happens after the purchase is committed and never
//! touches it.

use chrono::NaiveDate;
use kasse_core::validation::validate_quantity;
use kasse_core::wager::Outcome;
use kasse_core::{Account, Money, Product};
use kasse_db::{AccountRepository, DbError, Ledger, LedgerError, ProductRepository};
use thiserror::Error;
use tracing::{error, info, warn};

// =============================================================================
// Errors
// =============================================================================

/// Why a purchase did not happen. Each variant maps to a distinct message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Identity token could not be read")]
    IdentityUnreadable,

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Limit exceeded: balance {balance}, total {total}")]
    InsufficientFunds { balance: Money, total: Money },

    #[error("{0} is no longer available")]
    NotFound(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<DbError> for PaymentError {
    fn from(err: DbError) -> Self {
        error!(error = %err, "Store failure during payment");
        PaymentError::Storage(err.to_string())
    }
}

// =============================================================================
// Types
// =============================================================================

/// How the patron chose to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Card,
    Cash,
    Event,
}

/// Who paid for a settled purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payer {
    /// A balance-holding account (card or event).
    Account { id: i64, name: String },
    /// Cash into the box; recorded against the cash sink.
    Cash,
}

/// A committed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledPurchase {
    pub kind: PaymentKind,
    pub payer: Payer,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub total: Money,
    /// Payer balance after the debit; `None` for cash.
    pub balance: Option<Money>,
    pub stock: i64,
    pub transaction_id: i64,
}

impl SettledPurchase {
    /// What a wager on this purchase is about.
    pub fn stake(&self) -> WagerStake {
        WagerStake {
            payer: self.payer.clone(),
            product_id: self.product_id,
            quantity: self.quantity,
            total: self.total,
        }
    }
}

/// Everything wager settlement needs, fixed at purchase time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerStake {
    pub payer: Payer,
    pub product_id: i64,
    pub quantity: i64,
    pub total: Money,
}

/// Financial effect of a finished wager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WagerSettlement {
    /// Win on an account: `total` refunded.
    Refunded { balance: Money },
    /// Win on cash: the patron need not pay. Message only.
    CashForgiven { total: Money },
    /// Lose on an account: another `total` charged.
    Charged { balance: Money },
    /// Lose on an account that cannot cover the extra charge.
    /// The base purchase stands.
    ChargeDeclined { total: Money },
    /// Lose on cash: the patron owes the amount again. Message only.
    CashExtraDue { total: Money },
    /// Draw.
    NoEffect,
    /// The account could not be adjusted; the base purchase stands.
    Failed { reason: String },
}

// =============================================================================
// Resolver
// =============================================================================

/// Settles purchases and wagers against the ledger.
#[derive(Debug, Clone)]
pub struct PaymentResolver {
    accounts: AccountRepository,
    products: ProductRepository,
    ledger: Ledger,
    cash_account_id: i64,
}

impl PaymentResolver {
    pub fn new(accounts: AccountRepository, products: ProductRepository, ledger: Ledger, cash_account_id: i64) -> Self {
        PaymentResolver {
            accounts,
            products,
            ledger,
            cash_account_id,
        }
    }

    fn today(&self) -> NaiveDate {
        self.ledger.clock().today()
    }

    /// Active event accounts that may be offered right now.
    pub async fn selectable_events(&self, limit: usize) -> Result<Vec<Account>, PaymentError> {
        Ok(self.accounts.list_selectable_events(self.today(), limit).await?)
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Card payment with a token already read (`None` when the read failed).
    pub async fn pay_by_token(
        &self,
        product_id: i64,
        quantity: i64,
        token: Option<&str>,
    ) -> Result<SettledPurchase, PaymentError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(PaymentError::IdentityUnreadable),
        };

        let account = self
            .accounts
            .find_by_token(token)
            .await?
            .filter(|a| a.can_pay_by_token_on(self.today()))
            .ok_or(PaymentError::UnknownCredential)?;

        self.settle_account(PaymentKind::Card, &account, product_id, quantity).await
    }

    /// Event-account payment. The account was chosen from a list rendered
    /// earlier, so its eligibility is checked again here.
    pub async fn pay_by_event(
        &self,
        product_id: i64,
        quantity: i64,
        account_id: i64,
    ) -> Result<SettledPurchase, PaymentError> {
        let account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .filter(|a| a.is_selectable_event_on(self.today()))
            .ok_or(PaymentError::UnknownCredential)?;

        self.settle_account(PaymentKind::Event, &account, product_id, quantity).await
    }

    /// Cash payment. No balance is involved.
    pub async fn pay_cash(&self, product_id: i64, quantity: i64) -> Result<SettledPurchase, PaymentError> {
        let (product, total) = self.priced(product_id, quantity).await?;

        let stock = self
            .ledger
            .adjust_stock(product.id, -quantity)
            .await
            .map_err(|e| ledger_failure(e, &product))?;

        let transaction_id = match self
            .ledger
            .record_transaction(self.cash_account_id, product.id, quantity)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.restore_stock(product.id, quantity).await;
                return Err(ledger_failure(e, &product));
            }
        };

        info!(product_id = product.id, quantity, total = %total, "Cash purchase");
        Ok(SettledPurchase {
            kind: PaymentKind::Cash,
            payer: Payer::Cash,
            product_id: product.id,
            product_name: product.name,
            quantity,
            total,
            balance: None,
            stock,
            transaction_id,
        })
    }

    async fn settle_account(
        &self,
        kind: PaymentKind,
        account: &Account,
        product_id: i64,
        quantity: i64,
    ) -> Result<SettledPurchase, PaymentError> {
        let (product, total) = self.priced(product_id, quantity).await?;

        let change = self
            .ledger
            .adjust_balance(account.id, -total)
            .await
            .map_err(|e| match e {
                LedgerError::InsufficientFunds { balance, .. } => PaymentError::InsufficientFunds { balance, total },
                LedgerError::NotFound { .. } => PaymentError::UnknownCredential,
                other => ledger_failure(other, &product),
            })?;

        let stock = match self.ledger.adjust_stock(product.id, -quantity).await {
            Ok(stock) => stock,
            Err(e) => {
                self.refund(account.id, total).await;
                return Err(ledger_failure(e, &product));
            }
        };

        let transaction_id = match self.ledger.record_transaction(account.id, product.id, quantity).await {
            Ok(id) => id,
            Err(e) => {
                self.restore_stock(product.id, quantity).await;
                self.refund(account.id, total).await;
                return Err(ledger_failure(e, &product));
            }
        };

        info!(
            account_id = account.id,
            product_id = product.id,
            quantity,
            total = %total,
            balance = %change.new,
            "Account purchase"
        );

        Ok(SettledPurchase {
            kind,
            payer: Payer::Account {
                id: account.id,
                name: account.name.clone(),
            },
            product_id: product.id,
            product_name: product.name,
            quantity,
            total,
            balance: Some(change.new),
            stock,
            transaction_id,
        })
    }

    /// Loads the product fresh and prices the line.
    async fn priced(&self, product_id: i64, quantity: i64) -> Result<(Product, Money), PaymentError> {
        validate_quantity(quantity).map_err(|e| PaymentError::InvalidSelection(e.to_string()))?;

        let product = self
            .products
            .get_by_id(product_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| PaymentError::NotFound(format!("Product {}", product_id)))?;

        let total = product
            .price()
            .checked_times(quantity)
            .ok_or_else(|| PaymentError::InvalidSelection("total out of range".to_string()))?;

        Ok((product, total))
    }

    async fn refund(&self, account_id: i64, total: Money) {
        if let Err(e) = self.ledger.adjust_balance(account_id, total).await {
            error!(account_id, total = %total, error = %e, "Refund after failed purchase did not apply");
        }
    }

    async fn restore_stock(&self, product_id: i64, quantity: i64) {
        if let Err(e) = self.ledger.adjust_stock(product_id, quantity).await {
            error!(product_id, quantity, error = %e, "Stock restore after failed purchase did not apply");
        }
    }

    // =========================================================================
    // Wager
    // =========================================================================

    /// Applies the financial effect of a finished wager.
    ///
    /// Never touches the base purchase: its stock change and transaction row
    /// stay whatever happens here.
    pub async fn settle_wager(&self, stake: &WagerStake, outcome: Outcome) -> WagerSettlement {
        let settlement = match (outcome, &stake.payer) {
            (Outcome::Draw, _) => WagerSettlement::NoEffect,
            (Outcome::Win, Payer::Cash) => WagerSettlement::CashForgiven { total: stake.total },
            (Outcome::Lose, Payer::Cash) => WagerSettlement::CashExtraDue { total: stake.total },
            (Outcome::Win, Payer::Account { id, .. }) => match self.ledger.adjust_balance(*id, stake.total).await {
                Ok(change) => WagerSettlement::Refunded { balance: change.new },
                Err(e) => WagerSettlement::Failed { reason: e.to_string() },
            },
            (Outcome::Lose, Payer::Account { id, .. }) => match self.ledger.adjust_balance(*id, -stake.total).await {
                Ok(change) => WagerSettlement::Charged { balance: change.new },
                Err(LedgerError::InsufficientFunds { .. }) => WagerSettlement::ChargeDeclined { total: stake.total },
                Err(e) => WagerSettlement::Failed { reason: e.to_string() },
            },
        };

        match &settlement {
            WagerSettlement::Failed { reason } => warn!(product_id = stake.product_id, %reason, "Wager settlement failed"),
            other => info!(product_id = stake.product_id, ?outcome, settlement = ?other, "Wager settled"),
        }
        settlement
    }
}

fn ledger_failure(err: LedgerError, product: &Product) -> PaymentError {
    match err {
        LedgerError::NotFound { .. } => PaymentError::NotFound(product.name.clone()),
        LedgerError::InsufficientFunds { balance, delta, .. } => PaymentError::InsufficientFunds { balance, total: -delta },
        LedgerError::Invalid(e) => PaymentError::InvalidSelection(e.to_string()),
        LedgerError::Storage(e) => PaymentError::Storage(e.to_string()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use kasse_core::{AccountCategory, AccountDraft, FixedClock, NoopNotifier, ProductDraft, SettingKey};
    use kasse_db::{Database, DbConfig};
    use std::sync::Arc;

    struct Fixture {
        db: Database,
        resolver: PaymentResolver,
        ledger: Ledger,
        clock: FixedClock,
        cash_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cash_id = db.bootstrap().await.unwrap();
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 5, 2, 18, 0, 0).unwrap());
        let ledger = db.ledger(Arc::new(clock.clone()), Arc::new(NoopNotifier));
        let resolver = PaymentResolver::new(db.accounts(), db.products(), ledger.clone(), cash_id);
        Fixture {
            db,
            resolver,
            ledger,
            clock,
            cash_id,
        }
    }

    async fn alice(f: &Fixture, cents: i64) -> i64 {
        let acc = f
            .db
            .accounts()
            .insert(&AccountDraft::standard("Alice").with_token("TESTCARD123"))
            .await
            .unwrap();
        if cents > 0 {
            f.ledger.top_up(acc.id, Money::from_cents(cents)).await.unwrap();
        }
        acc.id
    }

    async fn product(f: &Fixture, price: i64, stock: i64) -> i64 {
        f.db
            .products()
            .insert(&ProductDraft::new("Cola", price).with_stock(stock))
            .await
            .unwrap()
            .id
    }

    async fn balance(f: &Fixture, id: i64) -> i64 {
        f.db.accounts().get_by_id(id).await.unwrap().unwrap().balance_cents
    }

    async fn stock(f: &Fixture, id: i64) -> i64 {
        f.db.products().get_by_id(id).await.unwrap().unwrap().stock
    }

    async fn transactions(f: &Fixture) -> i64 {
        f.db.logs().counts().await.unwrap().0
    }

    #[tokio::test]
    async fn test_declined_card_purchase_changes_nothing() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 600, 10).await;

        let err = f.resolver.pay_by_token(cola, 2, Some("TESTCARD123")).await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::InsufficientFunds {
                balance: Money::from_cents(1000),
                total: Money::from_cents(1200)
            }
        );
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 10);
        assert_eq!(transactions(&f).await, 0);
    }

    #[tokio::test]
    async fn test_failed_transaction_log_refunds_and_restores_stock() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 10).await;
        sqlx::query("DROP TABLE transactions").execute(f.db.pool()).await.unwrap();

        let err = f.resolver.pay_by_token(cola, 2, Some("TESTCARD123")).await.unwrap_err();
        assert!(matches!(err, PaymentError::Storage(_)));
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 10);
    }

    #[tokio::test]
    async fn test_failed_stock_update_refunds() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 10).await;
        sqlx::query(
            "CREATE TRIGGER freeze_stock BEFORE UPDATE OF stock ON products BEGIN SELECT RAISE(ABORT, 'stock frozen'); END",
        )
        .execute(f.db.pool())
        .await
        .unwrap();

        let err = f.resolver.pay_by_token(cola, 2, Some("TESTCARD123")).await.unwrap_err();
        assert!(matches!(err, PaymentError::Storage(_)));
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 10);
        assert_eq!(transactions(&f).await, 0);
    }

    #[tokio::test]
    async fn test_card_purchase_within_overdraft() {
        let f = fixture().await;
        f.db.settings().set(SettingKey::OverdraftLimit, "500").await.unwrap();
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 600, 10).await;

        let settled = f.resolver.pay_by_token(cola, 2, Some(" TESTCARD123 ")).await.unwrap();
        assert_eq!(settled.total, Money::from_cents(1200));
        assert_eq!(settled.balance, Some(Money::from_cents(-200)));
        assert_eq!(settled.stock, 8);
        assert_eq!(settled.payer, Payer::Account { id: acc, name: "Alice".into() });
        assert_eq!(balance(&f, acc).await, -200);
        assert_eq!(transactions(&f).await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_and_unknown_tokens() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 10).await;

        assert_eq!(
            f.resolver.pay_by_token(cola, 1, None).await.unwrap_err(),
            PaymentError::IdentityUnreadable
        );
        assert_eq!(
            f.resolver.pay_by_token(cola, 1, Some("   ")).await.unwrap_err(),
            PaymentError::IdentityUnreadable
        );
        assert_eq!(
            f.resolver.pay_by_token(cola, 1, Some("NOPE")).await.unwrap_err(),
            PaymentError::UnknownCredential
        );

        f.db.accounts().soft_delete(acc).await.unwrap();
        assert_eq!(
            f.resolver.pay_by_token(cola, 1, Some("TESTCARD123")).await.unwrap_err(),
            PaymentError::UnknownCredential
        );
        assert_eq!(stock(&f, cola).await, 10);
        assert_eq!(transactions(&f).await, 0);
    }

    #[tokio::test]
    async fn test_cash_purchase_leaves_balances_alone() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 1).await;

        let settled = f.resolver.pay_cash(cola, 3).await.unwrap();
        assert_eq!(settled.payer, Payer::Cash);
        assert_eq!(settled.total, Money::from_cents(600));
        assert_eq!(settled.stock, -2);
        assert_eq!(settled.balance, None);

        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(balance(&f, f.cash_id).await, 0);
        let entry = &f.db.logs().recent_transactions(1).await.unwrap()[0];
        assert_eq!(entry.account_id, f.cash_id);
        assert_eq!(entry.quantity, 3);
    }

    #[tokio::test]
    async fn test_stale_event_choice_is_rejected() {
        let f = fixture().await;
        let cola = product(&f, 200, 10).await;
        let until = Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 0).unwrap().date_naive();
        let fest = f
            .db
            .accounts()
            .insert(
                &AccountDraft::standard("Sommerfest")
                    .with_category(AccountCategory::Event)
                    .with_window(None, Some(until)),
            )
            .await
            .unwrap();

        let offered = f.resolver.selectable_events(8).await.unwrap();
        assert_eq!(offered.len(), 1);

        f.clock.advance(Duration::days(1));
        assert_eq!(
            f.resolver.pay_by_event(cola, 1, offered[0].id).await.unwrap_err(),
            PaymentError::UnknownCredential
        );
        assert_eq!(balance(&f, fest.id).await, 0);
        assert_eq!(transactions(&f).await, 0);
    }

    #[tokio::test]
    async fn test_event_purchase_may_go_negative() {
        let f = fixture().await;
        let cola = product(&f, 200, 10).await;
        let fest = f
            .db
            .accounts()
            .insert(&AccountDraft::standard("Sommerfest").with_category(AccountCategory::Event))
            .await
            .unwrap();

        let settled = f.resolver.pay_by_event(cola, 5, fest.id).await.unwrap();
        assert_eq!(settled.kind, PaymentKind::Event);
        assert_eq!(settled.balance, Some(Money::from_cents(-1000)));

        // Standard accounts cannot be used through the event path
        let std_acc = alice(&f, 1000).await;
        assert_eq!(
            f.resolver.pay_by_event(cola, 1, std_acc).await.unwrap_err(),
            PaymentError::UnknownCredential
        );
    }

    #[tokio::test]
    async fn test_cash_sink_is_not_an_event_account() {
        let f = fixture().await;
        let cola = product(&f, 200, 10).await;
        assert_eq!(
            f.resolver.pay_by_event(cola, 1, f.cash_id).await.unwrap_err(),
            PaymentError::UnknownCredential
        );
    }

    #[tokio::test]
    async fn test_unavailable_product_and_bad_quantity() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 10).await;
        f.db.products().soft_delete(cola).await.unwrap();

        assert!(matches!(
            f.resolver.pay_by_token(cola, 1, Some("TESTCARD123")).await,
            Err(PaymentError::NotFound(_))
        ));
        assert!(matches!(f.resolver.pay_cash(cola, 11).await, Err(PaymentError::InvalidSelection(_))));
        assert_eq!(balance(&f, acc).await, 1000);
    }

    #[tokio::test]
    async fn test_wager_lose_declined_keeps_base_purchase() {
        let f = fixture().await;
        let acc = alice(&f, 400).await;
        let cola = product(&f, 400, 5).await;

        let settled = f.resolver.pay_by_token(cola, 1, Some("TESTCARD123")).await.unwrap();
        assert_eq!(settled.balance, Some(Money::zero()));

        let settlement = f.resolver.settle_wager(&settled.stake(), Outcome::Lose).await;
        assert_eq!(settlement, WagerSettlement::ChargeDeclined { total: Money::from_cents(400) });

        assert_eq!(balance(&f, acc).await, 0);
        assert_eq!(stock(&f, cola).await, 4);
        assert_eq!(transactions(&f).await, 1);
    }

    #[tokio::test]
    async fn test_wager_settlements() {
        let f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = product(&f, 200, 5).await;

        let settled = f.resolver.pay_by_token(cola, 1, Some("TESTCARD123")).await.unwrap();
        let stake = settled.stake();

        assert_eq!(
            f.resolver.settle_wager(&stake, Outcome::Win).await,
            WagerSettlement::Refunded { balance: Money::from_cents(1000) }
        );
        assert_eq!(
            f.resolver.settle_wager(&stake, Outcome::Lose).await,
            WagerSettlement::Charged { balance: Money::from_cents(800) }
        );
        assert_eq!(f.resolver.settle_wager(&stake, Outcome::Draw).await, WagerSettlement::NoEffect);
        assert_eq!(balance(&f, acc).await, 800);

        let cash = f.resolver.pay_cash(cola, 2).await.unwrap().stake();
        assert_eq!(
            f.resolver.settle_wager(&cash, Outcome::Win).await,
            WagerSettlement::CashForgiven { total: Money::from_cents(400) }
        );
        assert_eq!(
            f.resolver.settle_wager(&cash, Outcome::Lose).await,
            WagerSettlement::CashExtraDue { total: Money::from_cents(400) }
        );
        assert_eq!(balance(&f, f.cash_id).await, 0);
        assert_eq!(transactions(&f).await, 2);
    }
}
