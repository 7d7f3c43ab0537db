//! # Kasse Back Office
//!
//! HTTP/JSON surface for staff: catalog and account maintenance, top-ups,
//! restocks, settings, log views, and terminal control. Runs as its own
//! process against the same store as the terminal.
//!
//! ## Module Organization
//! ```text
//! kasse_back_office/
//! ├── lib.rs          ◄─── Module exports, serve()
//! ├── auth.rs         ◄─── Session tokens, login, password change
//! ├── error.rs        ◄─── ApiError {code, message} + HTTP status
//! ├── state.rs        ◄─── AppState shared by handlers
//! └── routes/
//!     ├── mod.rs      ◄─── Router
//!     ├── products.rs ◄─── Catalog CRUD, restock, stock correction
//!     ├── accounts.rs ◄─── Account CRUD, top-up
//!     └── admin.rs    ◄─── Health, settings, logs, refresh/stop
//! ```

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use auth::SessionKeys;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::router;
pub use state::AppState;

/// Serves the router until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Back office listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// Default: INFO, debug for kasse crates; `RUST_LOG` overrides.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kasse=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
