//! # kasse-sync: Sync Signal Layer
//!
//! The terminal caches the catalog and account lists; the back office writes
//! the same store from another process. Instead of an IPC channel the two
//! share two marker files next to the database.
//!
//! ## Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Writer (back office, terminal ledger)     Reader (terminal loop)       │
//! │                                                                         │
//! │  commit ─► RefreshNotifier                 every poll_interval:         │
//! │              └─► touch refresh.flag        RefreshWatcher::poll()       │
//! │                                              ├─ Exit    → quit          │
//! │  POST /stop ─► MarkerStore::raise_exit       ├─ Refresh → reload views  │
//! │                                              └─ Idle                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coarse and eventually consistent: a change becomes visible within one
//! poll interval.

pub mod config;
pub mod error;
pub mod markers;
pub mod watcher;

pub use config::{
    BackOfficeSettings, KasseConfig, StoreSettings, SyncSettings, TerminalSettings, MAX_POLL_INTERVAL_SECS,
    MAX_SESSION_LIFETIME_SECS, MAX_TERMINAL_TIMEOUT_SECS,
};
pub use error::{SyncError, SyncResult};
pub use markers::{FsMarkers, MarkerStore, MemoryMarkers, RefreshNotifier};
pub use watcher::{RefreshWatcher, SyncSignal};
