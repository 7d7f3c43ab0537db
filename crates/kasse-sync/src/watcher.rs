//! # Refresh Watcher
//!
//! The terminal side of the markers. Call [`RefreshWatcher::poll`] on a
//! fixed interval:
//!
//! ```text
//!   exit marker present?      ──yes──► remove it, SyncSignal::Exit
//!          │ no
//!   refresh stamp newer than
//!   the last one seen?        ──yes──► remember it, SyncSignal::Refresh
//!          │ no
//!          ▼
//!   SyncSignal::Idle
//! ```
//!
//! Delivery is at-least-once and coalescing: several touches between two
//! polls produce one `Refresh`.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::SyncResult;
use crate::markers::MarkerStore;

/// What one poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
    Idle,
    /// Cached views are stale.
    Refresh,
    /// Terminate the process.
    Exit,
}

#[derive(Debug)]
pub struct RefreshWatcher {
    markers: Arc<dyn MarkerStore>,
    last_seen: Option<SystemTime>,
}

impl RefreshWatcher {
    /// Creates a watcher primed with the current stamp, so the first poll
    /// only reports changes made after startup.
    pub fn new(markers: Arc<dyn MarkerStore>) -> SyncResult<Self> {
        let last_seen = markers.refresh_stamp()?;
        Ok(RefreshWatcher { markers, last_seen })
    }

    pub fn poll(&mut self) -> SyncResult<SyncSignal> {
        if self.markers.exit_requested()? {
            self.markers.clear_exit()?;
            info!("Exit marker observed");
            return Ok(SyncSignal::Exit);
        }

        match self.markers.refresh_stamp()? {
            Some(stamp) if self.last_seen.map_or(true, |seen| stamp > seen) => {
                self.last_seen = Some(stamp);
                debug!("Refresh marker advanced");
                Ok(SyncSignal::Refresh)
            }
            _ => Ok(SyncSignal::Idle),
        }
    }
}
