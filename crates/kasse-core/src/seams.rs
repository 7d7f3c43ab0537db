//! # Seams
//!
//! Small traits the I/O crates inject so the ledger and the payment flow can
//! be driven deterministically in tests.
//!
//! - [`Clock`] - current instant and calendar day
//! - [`ChangeNotifier`] - "displayed content changed" hook, implemented by the
//!   refresh marker in kasse-sync

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

// =============================================================================
// Clock
// =============================================================================

/// Source of time for timestamps and validity-window checks.
pub trait Clock: Send + Sync + Debug {
    /// Current instant, stored on log rows.
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for validity windows.
    fn today(&self) -> NaiveDate;
}

/// Wall clock. Validity windows use the kiosk's local calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that only moves when told to.
///
/// ## Usage
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use kasse_core::{Clock, FixedClock};
///
/// let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap());
/// clock.advance(Duration::days(1));
/// assert_eq!(clock.today().to_string(), "2026-05-03");
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Creates a clock frozen at `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        FixedClock {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Moves the clock by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.instant.lock() {
            *guard += by;
        }
    }

    /// Sets the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut guard) = self.instant.lock() {
            *guard = instant;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

// =============================================================================
// Change Notification
// =============================================================================

/// Raised after any committed mutation that changes displayed content.
///
/// Implementations must be cheap and must not fail the caller: the mutation
/// is already committed when this runs.
pub trait ChangeNotifier: Send + Sync + Debug {
    fn content_changed(&self);
}

/// Notifier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn content_changed(&self) {}
}

impl<T: ChangeNotifier + ?Sized> ChangeNotifier for Arc<T> {
    fn content_changed(&self) {
        (**self).content_changed()
    }
}
