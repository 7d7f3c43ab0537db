//! Shared handler state.

use std::sync::Arc;

use kasse_core::{ChangeNotifier, SystemClock};
use kasse_db::{AdminSecret, Database, Ledger};
use kasse_sync::{MarkerStore, RefreshNotifier};

use crate::auth::SessionKeys;

/// Cloned into every handler; all fields are cheap handles.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub ledger: Ledger,
    pub secret: AdminSecret,
    pub sessions: Arc<SessionKeys>,
    pub markers: Arc<dyn MarkerStore>,
    notifier: RefreshNotifier,
}

impl AppState {
    pub fn new(db: Database, secret: AdminSecret, sessions: SessionKeys, markers: Arc<dyn MarkerStore>) -> Self {
        let notifier = RefreshNotifier::new(markers.clone());
        let ledger = db.ledger(Arc::new(SystemClock), Arc::new(notifier.clone()));
        AppState {
            db,
            ledger,
            secret,
            sessions: Arc::new(sessions),
            markers,
            notifier,
        }
    }

    /// Tells the terminal its cached views are stale.
    pub fn content_changed(&self) {
        self.notifier.content_changed();
    }
}
