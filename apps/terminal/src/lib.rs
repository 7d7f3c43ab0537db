//! # Kasse Terminal
//!
//! The purchase front-end process.
//!
//! ## Module Organization
//! ```text
//! kasse_terminal/
//! ├── lib.rs          ◄─── Module exports, tracing setup
//! ├── app.rs          ◄─── Event loop (poll / console / token / deadline)
//! ├── flow.rs         ◄─── Kiosk state machine
//! ├── payment.rs      ◄─── Payment resolution and wager settlement
//! ├── identity.rs     ◄─── Token reading with deadline
//! └── console.rs      ◄─── Line commands and text rendering
//! ```

pub mod app;
pub mod console;
pub mod flow;
pub mod identity;
pub mod payment;

use tracing_subscriber::EnvFilter;

pub use app::Terminal;
pub use flow::{Input, Kiosk, Notice, Pending, Screen, Timing};
pub use payment::{PaymentError, PaymentKind, PaymentResolver, SettledPurchase, WagerSettlement};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kasse=trace` - Show trace for kasse crates only
/// - Default: INFO, debug for kasse crates
///
/// Logs go to stderr so they do not interleave with the console screen.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kasse=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
