//! # Kiosk Flow
//!
//! The payment state machine. [`Kiosk::handle`] consumes one [`Input`] and
//! returns what to tell the patron; [`Kiosk::pending`] tells the event loop
//! what the current screen is waiting for.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Catalog ──product──► Quantity ──n──► Method ─┬─card──► AwaitIdentity ─┐│
//! │     ▲                                         ├─event─► EventChoice ───┤│
//! │     │                                         └─cash───────────────────┤│
//! │     │                                                                  ▼│
//! │     │◄──────────── wager off / declined / expired ─────────────── Settle│
//! │     │                                                                  ││
//! │     │◄── finished ── WagerPlaying ◄──accept── WagerOffer ◄──wager on───┘│
//! │                                                                         │
//! │  Catalog ──pin / admin token──► Admin ──restock / topup / quit / exit   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No store transaction is open while a screen waits for the patron.

use std::time::Duration;

use kasse_core::validation::{validate_positive, validate_quantity};
use kasse_core::wager::{Board, GameState, Outcome, WagerGame};
use kasse_core::{Money, Product, MAX_EVENT_CHOICES};
use kasse_db::{AccountRepository, AdminAccess, Database, DbResult, Ledger, ProductRepository, Settings};
use kasse_sync::{TerminalSettings, MAX_TERMINAL_TIMEOUT_SECS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::payment::{PaymentError, PaymentKind, PaymentResolver, SettledPurchase, WagerSettlement, WagerStake};

// =============================================================================
// Inputs and Notices
// =============================================================================

/// One thing the patron (or the loop) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    ShowPage(i64),
    ChooseProduct(i64),
    Quantity(i64),
    Method(PaymentKind),
    /// 1-based position in the offered event list.
    ChooseEvent(usize),
    /// Result of an identity read; `None` when nothing was read in time.
    Token(Option<String>),
    AcceptWager,
    DeclineWager,
    /// 0-based board cell.
    Cell(usize),
    /// The wager deadline passed.
    Expired,
    Cancel,
    Topup(Money),
    AdminPin(String),
    AdminToken,
    Restock { product_id: i64, quantity: i64 },
    LeaveAdmin,
    Shutdown,
}

/// Something to show the patron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Purchased(SettledPurchase),
    PaymentFailed(PaymentError),
    TapCard { total: Money },
    TapAuthorization,
    TapRecipient { amount: Money },
    TapAdmin,
    NoEventAccounts,
    WagerOffered { total: Money, seconds: u64 },
    WagerBoard { board: Board },
    WagerFinished { outcome: Outcome, board: Board, settlement: WagerSettlement },
    WagerDeclined,
    WagerExpired,
    ToppedUp { name: String, amount: Money, balance: Money },
    AdminEntered,
    AdminLeft,
    AccessDenied,
    Restocked { product_id: i64, stock: i64 },
    Cancelled,
    InvalidInput(String),
    TryAgain(String),
    ShuttingDown,
}

// =============================================================================
// Screens
// =============================================================================

/// Why an identity token is awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPurpose {
    Purchase { product: Product, quantity: i64 },
    /// The designated top-up token must be tapped first.
    TopupAuthorization { amount: Money },
    TopupRecipient { amount: Money },
    AdminLogin,
}

#[derive(Debug, Clone)]
pub enum Screen {
    Catalog { page: i64 },
    Quantity { product: Product },
    Method { product: Product, quantity: i64 },
    EventChoice { product: Product, quantity: i64, choices: Vec<kasse_core::Account> },
    AwaitIdentity { purpose: IdentityPurpose, since: Instant, deadline: Instant },
    WagerOffer { stake: WagerStake, deadline: Instant },
    WagerPlaying { stake: WagerStake, game: WagerGame, deadline: Instant },
    Admin,
}

/// What the current screen waits for besides patron input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Idle,
    Identity { since: Instant, deadline: Instant },
    Deadline(Instant),
}

/// Time limits taken from the terminal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub read_timeout: Duration,
    pub wager_prompt: Duration,
}

/// Longest wait any prompt may have.
const MAX_WAIT: Duration = Duration::from_secs(MAX_TERMINAL_TIMEOUT_SECS);

impl From<&TerminalSettings> for Timing {
    fn from(settings: &TerminalSettings) -> Self {
        Timing {
            read_timeout: settings.read_timeout().min(MAX_WAIT),
            wager_prompt: settings.wager_prompt().min(MAX_WAIT),
        }
    }
}

/// `start + wait`, capped at `MAX_WAIT` past `start`.
fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start.checked_add(wait.min(MAX_WAIT)).unwrap_or(start)
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            read_timeout: Duration::from_secs(10),
            wager_prompt: Duration::from_secs(15),
        }
    }
}

// =============================================================================
// Kiosk
// =============================================================================

/// The purchase front-end state machine.
pub struct Kiosk {
    resolver: PaymentResolver,
    ledger: Ledger,
    accounts: AccountRepository,
    products: ProductRepository,
    settings: Settings,
    access: AdminAccess,
    timing: Timing,
    catalog: Vec<Product>,
    pages: Vec<i64>,
    page: i64,
    screen: Screen,
    admin: bool,
    exit: bool,
    rng: StdRng,
}

impl Kiosk {
    pub fn new(db: &Database, ledger: Ledger, cash_account_id: i64, timing: Timing) -> Self {
        let resolver = PaymentResolver::new(db.accounts(), db.products(), ledger.clone(), cash_account_id);
        let access = AdminAccess::new(db.settings(), db.accounts(), ledger.clock().clone());
        Kiosk {
            resolver,
            ledger,
            accounts: db.accounts(),
            products: db.products(),
            settings: db.settings(),
            access,
            timing,
            catalog: Vec::new(),
            pages: Vec::new(),
            page: 1,
            screen: Screen::Catalog { page: 1 },
            admin: false,
            exit: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replaces the opponent's tie-break source.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn should_exit(&self) -> bool {
        self.exit
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn pages(&self) -> &[i64] {
        &self.pages
    }

    /// Cached products on the current page.
    pub fn page_products(&self) -> Vec<&Product> {
        self.catalog.iter().filter(|p| p.page == self.page).collect()
    }

    pub fn pending(&self) -> Pending {
        match &self.screen {
            Screen::AwaitIdentity { since, deadline, .. } => Pending::Identity {
                since: *since,
                deadline: *deadline,
            },
            Screen::WagerOffer { deadline, .. } | Screen::WagerPlaying { deadline, .. } => Pending::Deadline(*deadline),
            _ => Pending::Idle,
        }
    }

    /// Reloads the cached catalog.
    pub async fn reload(&mut self) -> DbResult<()> {
        self.catalog = self.products.list_active().await?;
        self.pages = self.products.pages().await?;
        if !self.pages.contains(&self.page) {
            self.page = self.pages.first().copied().unwrap_or(1);
            if let Screen::Catalog { page } = &mut self.screen {
                *page = self.page;
            }
        }
        debug!(products = self.catalog.len(), pages = self.pages.len(), "Catalog reloaded");
        Ok(())
    }

    fn home(&self) -> Screen {
        if self.admin {
            Screen::Admin
        } else {
            Screen::Catalog { page: self.page }
        }
    }

    fn await_identity(&self, purpose: IdentityPurpose) -> Screen {
        let since = Instant::now();
        Screen::AwaitIdentity {
            purpose,
            since,
            deadline: deadline_after(since, self.timing.read_timeout),
        }
    }

    fn wager_deadline(&self) -> Instant {
        deadline_after(Instant::now(), self.timing.wager_prompt)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Applies one input.
    pub async fn handle(&mut self, input: Input) -> Vec<Notice> {
        let home = self.home();
        let screen = std::mem::replace(&mut self.screen, home);

        match (screen, input) {
            // Global
            (Screen::Admin, Input::Shutdown) => {
                info!("Shutdown requested from admin mode");
                self.exit = true;
                vec![Notice::ShuttingDown]
            }
            (_, Input::Shutdown) => vec![Notice::AccessDenied],
            (Screen::WagerOffer { .. }, Input::Cancel | Input::DeclineWager) => vec![Notice::WagerDeclined],
            (Screen::Catalog { .. } | Screen::Admin, Input::Cancel) => vec![],
            (_, Input::Cancel) => vec![Notice::Cancelled],

            // Catalog
            (Screen::Catalog { .. }, Input::ShowPage(page)) => {
                if self.pages.contains(&page) {
                    self.page = page;
                    self.screen = Screen::Catalog { page };
                    vec![]
                } else {
                    vec![Notice::InvalidInput(format!("No page {}", page))]
                }
            }
            (Screen::Catalog { .. }, Input::ChooseProduct(id)) => {
                match self.catalog.iter().find(|p| p.id == id).cloned() {
                    Some(product) => {
                        self.screen = Screen::Quantity { product };
                        vec![]
                    }
                    None => vec![Notice::InvalidInput(format!("No product {}", id))],
                }
            }
            (Screen::Catalog { .. }, Input::AdminPin(pin)) => self.enter_admin_by_pin(&pin).await,
            (Screen::Catalog { .. }, Input::AdminToken) => {
                self.screen = self.await_identity(IdentityPurpose::AdminLogin);
                vec![Notice::TapAdmin]
            }
            (Screen::Catalog { .. }, Input::Topup(amount)) => self.start_topup(amount, false),

            // Purchase
            (Screen::Quantity { product }, Input::Quantity(quantity)) => match validate_quantity(quantity) {
                Ok(()) => {
                    self.screen = Screen::Method { product, quantity };
                    vec![]
                }
                Err(e) => {
                    self.screen = Screen::Quantity { product };
                    vec![Notice::InvalidInput(e.to_string())]
                }
            },
            (Screen::Method { product, quantity }, Input::Method(kind)) => self.choose_method(product, quantity, kind).await,
            (Screen::EventChoice { product, quantity, choices }, Input::ChooseEvent(n)) => {
                let picked = n.checked_sub(1).and_then(|i| choices.get(i)).map(|a| a.id);
                match picked {
                    Some(account_id) => {
                        let result = self.resolver.pay_by_event(product.id, quantity, account_id).await;
                        self.purchase_done(result).await
                    }
                    None => {
                        self.screen = Screen::EventChoice { product, quantity, choices };
                        vec![Notice::InvalidInput(format!("No event account {}", n))]
                    }
                }
            }
            (Screen::AwaitIdentity { purpose, .. }, Input::Token(token)) => self.identity_read(purpose, token).await,

            // Wager
            (Screen::WagerOffer { stake, .. }, Input::AcceptWager) => {
                let game = WagerGame::new();
                let board = *game.board();
                self.screen = Screen::WagerPlaying {
                    stake,
                    game,
                    deadline: self.wager_deadline(),
                };
                vec![Notice::WagerBoard { board }]
            }
            (Screen::WagerOffer { .. } | Screen::WagerPlaying { .. }, Input::Expired) => {
                info!("Wager expired without effect");
                vec![Notice::WagerExpired]
            }
            (Screen::WagerPlaying { stake, game, deadline }, Input::Cell(cell)) => self.play(stake, game, deadline, cell).await,

            // Admin
            (Screen::Admin, Input::Restock { product_id, quantity }) => self.restock(product_id, quantity).await,
            (Screen::Admin, Input::Topup(amount)) => self.start_topup(amount, true),
            (Screen::Admin, Input::LeaveAdmin) => {
                self.admin = false;
                self.screen = self.home();
                info!("Left admin mode");
                vec![Notice::AdminLeft]
            }

            (screen, input) => {
                debug!(?input, "Input not expected on this screen");
                self.screen = screen;
                vec![Notice::InvalidInput("Not available here".to_string())]
            }
        }
    }

    // =========================================================================
    // Purchase Steps
    // =========================================================================

    async fn choose_method(&mut self, product: Product, quantity: i64, kind: PaymentKind) -> Vec<Notice> {
        match kind {
            PaymentKind::Card => {
                let total = product.price().checked_times(quantity).unwrap_or(Money::zero());
                self.screen = self.await_identity(IdentityPurpose::Purchase { product, quantity });
                vec![Notice::TapCard { total }]
            }
            PaymentKind::Cash => {
                let result = self.resolver.pay_cash(product.id, quantity).await;
                self.purchase_done(result).await
            }
            PaymentKind::Event => match self.resolver.selectable_events(MAX_EVENT_CHOICES).await {
                Ok(choices) if choices.is_empty() => {
                    self.screen = Screen::Method { product, quantity };
                    vec![Notice::NoEventAccounts]
                }
                Ok(choices) => {
                    self.screen = Screen::EventChoice {
                        product,
                        quantity,
                        choices,
                    };
                    vec![]
                }
                Err(e) => vec![Notice::PaymentFailed(e)],
            },
        }
    }

    async fn purchase_done(&mut self, result: Result<SettledPurchase, PaymentError>) -> Vec<Notice> {
        let settled = match result {
            Ok(settled) => settled,
            Err(e) => {
                info!(error = %e, "Purchase not completed");
                return vec![Notice::PaymentFailed(e)];
            }
        };

        let mut notices = vec![Notice::Purchased(settled.clone())];

        if settled.total.is_positive() && self.wager_enabled().await {
            self.screen = Screen::WagerOffer {
                stake: settled.stake(),
                deadline: self.wager_deadline(),
            };
            notices.push(Notice::WagerOffered {
                total: settled.total,
                seconds: self.timing.wager_prompt.as_secs(),
            });
        }
        notices
    }

    async fn wager_enabled(&self) -> bool {
        match self.settings.wager_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(error = %e, "Could not read wager flag; wager off");
                false
            }
        }
    }

    async fn play(&mut self, stake: WagerStake, mut game: WagerGame, deadline: Instant, cell: usize) -> Vec<Notice> {
        match game.play(cell, &mut self.rng) {
            Ok(GameState::InProgress { .. }) => {
                let board = *game.board();
                self.screen = Screen::WagerPlaying {
                    stake,
                    game,
                    deadline: self.wager_deadline(),
                };
                vec![Notice::WagerBoard { board }]
            }
            Ok(GameState::Finished { outcome, .. }) => {
                let settlement = self.resolver.settle_wager(&stake, outcome).await;
                vec![Notice::WagerFinished {
                    outcome,
                    board: *game.board(),
                    settlement,
                }]
            }
            Err(e) => {
                self.screen = Screen::WagerPlaying { stake, game, deadline };
                vec![Notice::InvalidInput(e.to_string())]
            }
        }
    }

    // =========================================================================
    // Identity Results
    // =========================================================================

    async fn identity_read(&mut self, purpose: IdentityPurpose, token: Option<String>) -> Vec<Notice> {
        match purpose {
            IdentityPurpose::Purchase { product, quantity } => {
                let result = self.resolver.pay_by_token(product.id, quantity, token.as_deref()).await;
                self.purchase_done(result).await
            }
            IdentityPurpose::TopupAuthorization { amount } => {
                let Some(token) = token else {
                    return vec![Notice::PaymentFailed(PaymentError::IdentityUnreadable)];
                };
                match self.settings.auto_topup_token().await {
                    Ok(Some(expected)) if expected.trim() == token.trim() => {
                        self.screen = self.await_identity(IdentityPurpose::TopupRecipient { amount });
                        vec![Notice::TapRecipient { amount }]
                    }
                    Ok(_) => {
                        info!("Top-up authorization token rejected");
                        vec![Notice::AccessDenied]
                    }
                    Err(e) => vec![Notice::TryAgain(e.to_string())],
                }
            }
            IdentityPurpose::TopupRecipient { amount } => self.credit(token, amount).await,
            IdentityPurpose::AdminLogin => {
                let Some(token) = token else {
                    return vec![Notice::PaymentFailed(PaymentError::IdentityUnreadable)];
                };
                match self.access.check_admin_token(&token).await {
                    Ok(Some(account)) => {
                        info!(account_id = account.id, "Admin mode entered by token");
                        self.admin = true;
                        self.screen = Screen::Admin;
                        vec![Notice::AdminEntered]
                    }
                    Ok(None) => vec![Notice::AccessDenied],
                    Err(e) => vec![Notice::TryAgain(e.to_string())],
                }
            }
        }
    }

    // =========================================================================
    // Top-ups and Admin
    // =========================================================================

    fn start_topup(&mut self, amount: Money, admin: bool) -> Vec<Notice> {
        if let Err(e) = validate_positive("amount", amount.cents()) {
            self.screen = self.home();
            return vec![Notice::InvalidInput(e.to_string())];
        }

        if admin {
            self.screen = self.await_identity(IdentityPurpose::TopupRecipient { amount });
            vec![Notice::TapRecipient { amount }]
        } else {
            self.screen = self.await_identity(IdentityPurpose::TopupAuthorization { amount });
            vec![Notice::TapAuthorization]
        }
    }

    async fn credit(&mut self, token: Option<String>, amount: Money) -> Vec<Notice> {
        let Some(token) = token else {
            return vec![Notice::PaymentFailed(PaymentError::IdentityUnreadable)];
        };

        let today = self.ledger.clock().today();
        let account = match self.accounts.find_by_token(&token).await {
            Ok(found) => found.filter(|a| a.can_pay_by_token_on(today)),
            Err(e) => return vec![Notice::TryAgain(e.to_string())],
        };
        let Some(account) = account else {
            return vec![Notice::PaymentFailed(PaymentError::UnknownCredential)];
        };

        match self.ledger.top_up(account.id, amount).await {
            Ok(change) => vec![Notice::ToppedUp {
                name: account.name,
                amount,
                balance: change.new,
            }],
            Err(e) => vec![Notice::TryAgain(e.to_string())],
        }
    }

    async fn enter_admin_by_pin(&mut self, pin: &str) -> Vec<Notice> {
        match self.access.check_pin(pin).await {
            Ok(true) => {
                info!("Admin mode entered by PIN");
                self.admin = true;
                self.screen = Screen::Admin;
                vec![Notice::AdminEntered]
            }
            Ok(false) => vec![Notice::AccessDenied],
            Err(e) => vec![Notice::TryAgain(e.to_string())],
        }
    }

    async fn restock(&mut self, product_id: i64, quantity: i64) -> Vec<Notice> {
        match self.ledger.record_restock(product_id, quantity).await {
            Ok(stock) => {
                if let Err(e) = self.reload().await {
                    warn!(error = %e, "Catalog reload after restock failed");
                }
                vec![Notice::Restocked { product_id, stock }]
            }
            Err(e) => vec![Notice::TryAgain(e.to_string())],
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as Days, TimeZone, Utc};
    use kasse_core::wager::Mark;
    use kasse_core::{AccountCategory, AccountDraft, Clock, FixedClock, NoopNotifier, ProductDraft, SettingKey};
    use kasse_db::DbConfig;
    use std::sync::Arc;

    struct Fixture {
        db: Database,
        kiosk: Kiosk,
        clock: FixedClock,
        cash_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cash_id = db.bootstrap().await.unwrap();
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 5, 2, 18, 0, 0).unwrap());
        let ledger = db.ledger(Arc::new(clock.clone()), Arc::new(NoopNotifier));
        let kiosk = Kiosk::new(&db, ledger, cash_id, Timing::default()).with_rng(StdRng::seed_from_u64(7));
        Fixture {
            db,
            kiosk,
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
            let ledger = f.db.ledger(Arc::new(f.clock.clone()), Arc::new(NoopNotifier));
            ledger.top_up(acc.id, Money::from_cents(cents)).await.unwrap();
        }
        acc.id
    }

    async fn cola(f: &mut Fixture, price: i64) -> i64 {
        let id = f
            .db
            .products()
            .insert(&ProductDraft::new("Cola", price).with_stock(10))
            .await
            .unwrap()
            .id;
        f.kiosk.reload().await.unwrap();
        id
    }

    async fn balance(f: &Fixture, id: i64) -> i64 {
        f.db.accounts().get_by_id(id).await.unwrap().unwrap().balance_cents
    }

    async fn stock(f: &Fixture, id: i64) -> i64 {
        f.db.products().get_by_id(id).await.unwrap().unwrap().stock
    }

    async fn select(f: &mut Fixture, product: i64, quantity: i64, kind: PaymentKind) -> Vec<Notice> {
        assert!(f.kiosk.handle(Input::ChooseProduct(product)).await.is_empty());
        assert!(f.kiosk.handle(Input::Quantity(quantity)).await.is_empty());
        f.kiosk.handle(Input::Method(kind)).await
    }

    fn is_home(kiosk: &Kiosk) -> bool {
        matches!(kiosk.screen(), Screen::Catalog { .. })
    }

    #[tokio::test]
    async fn test_oversized_timeouts_are_capped() {
        let start = Instant::now();
        assert_eq!(deadline_after(start, Duration::MAX), start + MAX_WAIT);
        assert_eq!(deadline_after(start, Duration::from_secs(10)), start + Duration::from_secs(10));

        let settings = TerminalSettings {
            read_timeout_secs: u64::MAX,
            ..TerminalSettings::default()
        };
        assert_eq!(Timing::from(&settings).read_timeout, MAX_WAIT);

        let mut f = fixture().await;
        f.kiosk.timing = Timing {
            read_timeout: Duration::MAX,
            wager_prompt: Duration::MAX,
        };
        let cola = cola(&mut f, 200).await;
        let notices = select(&mut f, cola, 1, PaymentKind::Card).await;
        assert_eq!(notices, vec![Notice::TapCard { total: Money::from_cents(200) }]);
        assert!(matches!(f.kiosk.screen(), Screen::AwaitIdentity { .. }));
    }

    #[tokio::test]
    async fn test_card_purchase_happy_path() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;

        let notices = select(&mut f, cola, 2, PaymentKind::Card).await;
        assert_eq!(notices, vec![Notice::TapCard { total: Money::from_cents(400) }]);
        assert!(matches!(f.kiosk.pending(), Pending::Identity { .. }));

        let notices = f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await;
        assert!(matches!(&notices[..], [Notice::Purchased(p)] if p.balance == Some(Money::from_cents(600))));
        assert!(is_home(&f.kiosk));
        assert_eq!(balance(&f, acc).await, 600);
        assert_eq!(stock(&f, cola).await, 8);
    }

    #[tokio::test]
    async fn test_limit_exceeded_is_distinct_and_leaves_stock() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 600).await;

        select(&mut f, cola, 2, PaymentKind::Card).await;
        let notices = f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await;
        assert!(matches!(
            &notices[..],
            [Notice::PaymentFailed(PaymentError::InsufficientFunds { .. })]
        ));
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 10);
        assert_eq!(f.db.logs().counts().await.unwrap().0, 0);
    }

    #[tokio::test]
    async fn test_no_token_read_aborts() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;

        select(&mut f, cola, 1, PaymentKind::Card).await;
        let notices = f.kiosk.handle(Input::Token(None)).await;
        assert_eq!(notices, vec![Notice::PaymentFailed(PaymentError::IdentityUnreadable)]);
        assert!(is_home(&f.kiosk));
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 10);
    }

    #[tokio::test]
    async fn test_cash_purchase_needs_no_identity() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;

        let notices = select(&mut f, cola, 3, PaymentKind::Cash).await;
        assert!(matches!(&notices[..], [Notice::Purchased(p)] if p.total == Money::from_cents(600)));
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(balance(&f, f.cash_id).await, 0);
        assert_eq!(stock(&f, cola).await, 7);
    }

    #[tokio::test]
    async fn test_event_list_goes_stale() {
        let mut f = fixture().await;
        let cola = cola(&mut f, 200).await;
        let until = f.clock.today();
        f.db.accounts()
            .insert(
                &AccountDraft::standard("Sommerfest")
                    .with_category(AccountCategory::Event)
                    .with_window(None, Some(until)),
            )
            .await
            .unwrap();

        let notices = select(&mut f, cola, 1, PaymentKind::Event).await;
        assert!(notices.is_empty());
        assert!(matches!(f.kiosk.screen(), Screen::EventChoice { choices, .. } if choices.len() == 1));

        f.clock.advance(Days::days(1));
        let notices = f.kiosk.handle(Input::ChooseEvent(1)).await;
        assert_eq!(notices, vec![Notice::PaymentFailed(PaymentError::UnknownCredential)]);
        assert_eq!(stock(&f, cola).await, 10);
    }

    #[tokio::test]
    async fn test_event_choice_without_accounts() {
        let mut f = fixture().await;
        let cola = cola(&mut f, 200).await;
        let notices = select(&mut f, cola, 1, PaymentKind::Event).await;
        assert_eq!(notices, vec![Notice::NoEventAccounts]);
        assert!(matches!(f.kiosk.screen(), Screen::Method { .. }));
    }

    #[tokio::test]
    async fn test_invalid_inputs_keep_screen() {
        let mut f = fixture().await;
        let cola = cola(&mut f, 200).await;

        assert!(matches!(
            &f.kiosk.handle(Input::ChooseProduct(999)).await[..],
            [Notice::InvalidInput(_)]
        ));
        f.kiosk.handle(Input::ChooseProduct(cola)).await;
        assert!(matches!(&f.kiosk.handle(Input::Quantity(11)).await[..], [Notice::InvalidInput(_)]));
        assert!(matches!(f.kiosk.screen(), Screen::Quantity { .. }));
        assert_eq!(f.kiosk.handle(Input::Cancel).await, vec![Notice::Cancelled]);
        assert!(is_home(&f.kiosk));
        assert_eq!(f.kiosk.handle(Input::Shutdown).await, vec![Notice::AccessDenied]);
        assert!(!f.kiosk.should_exit());
    }

    /// Wins if possible, else blocks, else takes the first free preferred cell.
    fn patron_pick(board: &Board) -> usize {
        let free = board.free_cells();
        for mark in [Mark::Patron, Mark::House] {
            for &cell in &free {
                let mut probe = *board;
                probe.place(cell, mark).unwrap();
                if probe.winner() == Some(mark) {
                    return cell;
                }
            }
        }
        [0, 8, 2, 6, 1, 3, 5, 7, 4]
            .into_iter()
            .find(|c| board.is_free(*c))
            .unwrap()
    }

    async fn play_out(f: &mut Fixture, mut next: impl FnMut(&Board) -> usize) -> (Outcome, WagerSettlement) {
        for _ in 0..5 {
            let board = match f.kiosk.screen() {
                Screen::WagerPlaying { game, .. } => *game.board(),
                other => panic!("not playing: {:?}", other),
            };
            let notices = f.kiosk.handle(Input::Cell(next(&board))).await;
            if let [Notice::WagerFinished { outcome, settlement, .. }] = &notices[..] {
                return (*outcome, settlement.clone());
            }
        }
        panic!("game did not finish");
    }

    async fn buy_and_accept_wager(f: &mut Fixture, product: i64, kind: PaymentKind) {
        f.db.settings().set(SettingKey::WagerEnabled, "1").await.unwrap();
        let notices = select(f, product, 1, kind).await;
        let notices = if kind == PaymentKind::Card {
            f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await
        } else {
            notices
        };
        assert!(matches!(notices.last(), Some(Notice::WagerOffered { .. })));
        assert!(matches!(f.kiosk.pending(), Pending::Deadline(_)));
        assert!(matches!(&f.kiosk.handle(Input::AcceptWager).await[..], [Notice::WagerBoard { .. }]));
    }

    #[tokio::test]
    async fn test_wager_win_refunds() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;
        buy_and_accept_wager(&mut f, cola, PaymentKind::Card).await;
        assert_eq!(balance(&f, acc).await, 800);

        let (outcome, settlement) = play_out(&mut f, patron_pick).await;
        assert_eq!(outcome, Outcome::Win);
        assert_eq!(settlement, WagerSettlement::Refunded { balance: Money::from_cents(1000) });
        assert_eq!(balance(&f, acc).await, 1000);
        assert_eq!(stock(&f, cola).await, 9);
        assert!(is_home(&f.kiosk));
    }

    #[tokio::test]
    async fn test_wager_lose_without_cover_keeps_purchase() {
        let mut f = fixture().await;
        let acc = alice(&f, 200).await;
        let cola = cola(&mut f, 200).await;
        buy_and_accept_wager(&mut f, cola, PaymentKind::Card).await;

        let mut script = [0usize, 1, 8].into_iter();
        let (outcome, settlement) = play_out(&mut f, move |_| script.next().unwrap()).await;
        assert_eq!(outcome, Outcome::Lose);
        assert_eq!(settlement, WagerSettlement::ChargeDeclined { total: Money::from_cents(200) });
        assert_eq!(balance(&f, acc).await, 0);
        assert_eq!(stock(&f, cola).await, 9);
        assert_eq!(f.db.logs().counts().await.unwrap().0, 1);
    }

    #[tokio::test]
    async fn test_wager_on_cash_is_message_only() {
        let mut f = fixture().await;
        let cola = cola(&mut f, 200).await;
        buy_and_accept_wager(&mut f, cola, PaymentKind::Cash).await;

        let (outcome, settlement) = play_out(&mut f, patron_pick).await;
        assert_eq!(outcome, Outcome::Win);
        assert_eq!(settlement, WagerSettlement::CashForgiven { total: Money::from_cents(200) });
        assert_eq!(balance(&f, f.cash_id).await, 0);
    }

    #[tokio::test]
    async fn test_wager_expiry_has_no_effect() {
        let mut f = fixture().await;
        let acc = alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;
        buy_and_accept_wager(&mut f, cola, PaymentKind::Card).await;

        f.kiosk.handle(Input::Cell(0)).await;
        assert_eq!(f.kiosk.handle(Input::Expired).await, vec![Notice::WagerExpired]);
        assert!(is_home(&f.kiosk));
        assert_eq!(balance(&f, acc).await, 800);

        // An ignored offer expires the same way
        select(&mut f, cola, 1, PaymentKind::Card).await;
        f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await;
        assert_eq!(f.kiosk.handle(Input::Expired).await, vec![Notice::WagerExpired]);
        assert_eq!(balance(&f, acc).await, 600);
    }

    #[tokio::test]
    async fn test_occupied_cell_is_rejected() {
        let mut f = fixture().await;
        alice(&f, 1000).await;
        let cola = cola(&mut f, 200).await;
        buy_and_accept_wager(&mut f, cola, PaymentKind::Card).await;

        f.kiosk.handle(Input::Cell(0)).await;
        let notices = f.kiosk.handle(Input::Cell(0)).await;
        assert!(matches!(&notices[..], [Notice::InvalidInput(_)]));
        assert!(matches!(f.kiosk.screen(), Screen::WagerPlaying { .. }));
    }

    #[tokio::test]
    async fn test_topup_requires_designated_token() {
        let mut f = fixture().await;
        let acc = alice(&f, 0).await;
        f.db.settings().set(SettingKey::AutoTopupToken, "TOPUPCARD").await.unwrap();

        assert_eq!(
            f.kiosk.handle(Input::Topup(Money::from_cents(500))).await,
            vec![Notice::TapAuthorization]
        );
        assert_eq!(
            f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await,
            vec![Notice::AccessDenied]
        );
        assert_eq!(balance(&f, acc).await, 0);

        f.kiosk.handle(Input::Topup(Money::from_cents(500))).await;
        assert_eq!(
            f.kiosk.handle(Input::Token(Some("TOPUPCARD".into()))).await,
            vec![Notice::TapRecipient { amount: Money::from_cents(500) }]
        );
        let notices = f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await;
        assert_eq!(
            notices,
            vec![Notice::ToppedUp {
                name: "Alice".into(),
                amount: Money::from_cents(500),
                balance: Money::from_cents(500)
            }]
        );
        assert_eq!(f.db.logs().counts().await.unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_admin_mode_by_pin() {
        let mut f = fixture().await;
        let acc = alice(&f, 0).await;
        let cola = cola(&mut f, 200).await;

        assert_eq!(f.kiosk.handle(Input::AdminPin("0000".into())).await, vec![Notice::AccessDenied]);
        assert_eq!(f.kiosk.handle(Input::AdminPin("1234".into())).await, vec![Notice::AdminEntered]);
        assert!(f.kiosk.is_admin());

        assert_eq!(
            f.kiosk.handle(Input::Restock { product_id: cola, quantity: 6 }).await,
            vec![Notice::Restocked { product_id: cola, stock: 16 }]
        );

        // Admin top-up skips the designated token
        f.kiosk.handle(Input::Topup(Money::from_cents(300))).await;
        f.kiosk.handle(Input::Token(Some("TESTCARD123".into()))).await;
        assert_eq!(balance(&f, acc).await, 300);
        assert!(matches!(f.kiosk.screen(), Screen::Admin));

        assert_eq!(f.kiosk.handle(Input::LeaveAdmin).await, vec![Notice::AdminLeft]);
        assert!(is_home(&f.kiosk));
    }

    #[tokio::test]
    async fn test_admin_mode_by_token_and_shutdown() {
        let mut f = fixture().await;
        f.db.accounts()
            .insert(
                &AccountDraft::standard("Staff")
                    .with_token("ADMINCARD1")
                    .with_category(AccountCategory::Admin),
            )
            .await
            .unwrap();

        assert_eq!(f.kiosk.handle(Input::AdminToken).await, vec![Notice::TapAdmin]);
        assert_eq!(
            f.kiosk.handle(Input::Token(Some("ADMINCARD1".into()))).await,
            vec![Notice::AdminEntered]
        );
        assert_eq!(f.kiosk.handle(Input::Shutdown).await, vec![Notice::ShuttingDown]);
        assert!(f.kiosk.should_exit());
    }

    #[tokio::test]
    async fn test_pages() {
        let mut f = fixture().await;
        f.db.products().insert(&ProductDraft::new("Wasser", 150)).await.unwrap();
        f.db.products().insert(&ProductDraft::new("Mate", 250).on_page(2)).await.unwrap();
        f.kiosk.reload().await.unwrap();

        assert_eq!(f.kiosk.pages(), &[1, 2]);
        assert_eq!(f.kiosk.page_products().len(), 1);
        f.kiosk.handle(Input::ShowPage(2)).await;
        assert_eq!(f.kiosk.page_products()[0].name, "Mate");
        assert!(matches!(&f.kiosk.handle(Input::ShowPage(5)).await[..], [Notice::InvalidInput(_)]));
    }
}
