//! # Routes
//!
//! ```text
//! public     GET  /health                     POST /login
//! session    POST /password
//!            GET|POST /products               GET|PUT|DELETE /products/{id}
//!            POST /products/{id}/restock      POST /products/{id}/stock
//!            GET|POST /accounts               GET|PUT|DELETE /accounts/{id}
//!            POST /accounts/{id}/topup
//!            GET  /settings                   PUT  /settings/{key}
//!            GET  /log/transactions           GET  /log/topups    GET /log/restocks
//!            POST /refresh                    POST /stop
//! ```

pub mod accounts;
pub mod admin;
pub mod products;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::auth;
use crate::state::AppState;

/// Builds the router (separate from `serve` for tests).
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/password", post(auth::change_password))
        .route("/products", get(products::list).post(products::create))
        .route(
            "/products/{id}",
            get(products::get).put(products::update).delete(products::remove),
        )
        .route("/products/{id}/restock", post(products::restock))
        .route("/products/{id}/stock", post(products::correct_stock))
        .route("/accounts", get(accounts::list).post(accounts::create))
        .route(
            "/accounts/{id}",
            get(accounts::get).put(accounts::update).delete(accounts::remove),
        )
        .route("/accounts/{id}/topup", post(accounts::topup))
        .route("/settings", get(admin::settings))
        .route("/settings/{key}", put(admin::put_setting))
        .route("/log/transactions", get(admin::transactions))
        .route("/log/topups", get(admin::topups))
        .route("/log/restocks", get(admin::restocks))
        .route("/refresh", post(admin::refresh))
        .route("/stop", post(admin::stop))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .route("/health", get(admin::health))
        .route("/login", post(auth::login))
        .merge(protected)
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
