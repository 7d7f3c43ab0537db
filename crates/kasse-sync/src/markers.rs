//! # Sync Markers
//!
//! Two sentinels next to the store:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  refresh.flag   meaning lives in its modification time                  │
//! │                 touched after every content-affecting commit            │
//! │                                                                         │
//! │  exit.flag      meaning lives in its presence                           │
//! │                 created by "stop", removed by the process that obeys    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MarkerStore`] is the seam; [`FsMarkers`] is the real thing and
//! [`MemoryMarkers`] drives tests without a filesystem.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kasse_core::ChangeNotifier;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Storage for the refresh and exit markers.
pub trait MarkerStore: Send + Sync + Debug {
    /// Moves the refresh stamp forward.
    fn touch_refresh(&self) -> SyncResult<()>;

    /// Current refresh stamp, `None` if never touched.
    fn refresh_stamp(&self) -> SyncResult<Option<SystemTime>>;

    /// Requests the terminal to exit.
    fn raise_exit(&self) -> SyncResult<()>;

    fn exit_requested(&self) -> SyncResult<bool>;

    /// Removes the exit request. Removing an absent marker is not an error.
    fn clear_exit(&self) -> SyncResult<()>;
}

// =============================================================================
// Filesystem Markers
// =============================================================================

/// Markers as files, usually `<data_dir>/refresh.flag` and `<data_dir>/exit.flag`.
#[derive(Debug, Clone)]
pub struct FsMarkers {
    refresh_path: PathBuf,
    exit_path: PathBuf,
}

impl FsMarkers {
    pub fn new(refresh_path: impl Into<PathBuf>, exit_path: impl Into<PathBuf>) -> Self {
        FsMarkers {
            refresh_path: refresh_path.into(),
            exit_path: exit_path.into(),
        }
    }

    /// Markers under one directory with the default file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        FsMarkers::new(dir.join("refresh.flag"), dir.join("exit.flag"))
    }

    pub fn refresh_path(&self) -> &Path {
        &self.refresh_path
    }

    pub fn exit_path(&self) -> &Path {
        &self.exit_path
    }

    fn ensure_parent(path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SyncError::marker(parent, e))?;
            }
        }
        Ok(())
    }
}

impl MarkerStore for FsMarkers {
    fn touch_refresh(&self) -> SyncResult<()> {
        let path = &self.refresh_path;
        Self::ensure_parent(path)?;

        let previous = self.refresh_stamp()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SyncError::marker(path, e))?;

        // Strictly increasing, even on coarse filesystem clocks
        let mut stamp = SystemTime::now();
        if let Some(prev) = previous {
            if stamp <= prev {
                stamp = prev + Duration::from_millis(1);
            }
        }
        file.set_modified(stamp).map_err(|e| SyncError::marker(path, e))?;

        debug!(path = %path.display(), "Refresh marker touched");
        Ok(())
    }

    fn refresh_stamp(&self) -> SyncResult<Option<SystemTime>> {
        match fs::metadata(&self.refresh_path) {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|e| SyncError::marker(&self.refresh_path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::marker(&self.refresh_path, e)),
        }
    }

    fn raise_exit(&self) -> SyncResult<()> {
        let path = &self.exit_path;
        Self::ensure_parent(path)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SyncError::marker(path, e))?;
        info!(path = %path.display(), "Exit marker raised");
        Ok(())
    }

    fn exit_requested(&self) -> SyncResult<bool> {
        match fs::metadata(&self.exit_path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::marker(&self.exit_path, e)),
        }
    }

    fn clear_exit(&self) -> SyncResult<()> {
        match fs::remove_file(&self.exit_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::marker(&self.exit_path, e)),
        }
    }
}

// =============================================================================
// In-Memory Markers
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    touches: u64,
    exit: bool,
}

/// Markers held in memory. Each touch advances the stamp by one nanosecond.
#[derive(Debug, Clone, Default)]
pub struct MemoryMarkers {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refresh touches so far.
    pub fn touches(&self) -> u64 {
        self.with_state(|s| s.touches)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl MarkerStore for MemoryMarkers {
    fn touch_refresh(&self) -> SyncResult<()> {
        self.with_state(|s| s.touches += 1);
        Ok(())
    }

    fn refresh_stamp(&self) -> SyncResult<Option<SystemTime>> {
        Ok(self.with_state(|s| {
            (s.touches > 0).then(|| UNIX_EPOCH + Duration::from_nanos(s.touches))
        }))
    }

    fn raise_exit(&self) -> SyncResult<()> {
        self.with_state(|s| s.exit = true);
        Ok(())
    }

    fn exit_requested(&self) -> SyncResult<bool> {
        Ok(self.with_state(|s| s.exit))
    }

    fn clear_exit(&self) -> SyncResult<()> {
        self.with_state(|s| s.exit = false);
        Ok(())
    }
}

// =============================================================================
// Change Notifier
// =============================================================================

/// Touches the refresh marker whenever displayed content changed.
///
/// The mutation is already committed when this runs, so a failed touch is
/// logged and swallowed.
#[derive(Debug, Clone)]
pub struct RefreshNotifier {
    markers: Arc<dyn MarkerStore>,
}

impl RefreshNotifier {
    pub fn new(markers: Arc<dyn MarkerStore>) -> Self {
        RefreshNotifier { markers }
    }
}

impl ChangeNotifier for RefreshNotifier {
    fn content_changed(&self) {
        if let Err(e) = self.markers.touch_refresh() {
            warn!(error = %e, "Could not touch refresh marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_refresh_stamp_increases() {
        let dir = tempfile::tempdir().unwrap();
        let markers = FsMarkers::in_dir(dir.path());

        assert_eq!(markers.refresh_stamp().unwrap(), None);
        markers.touch_refresh().unwrap();
        let first = markers.refresh_stamp().unwrap().unwrap();
        markers.touch_refresh().unwrap();
        let second = markers.refresh_stamp().unwrap().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_fs_exit_marker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let markers = FsMarkers::in_dir(dir.path().join("data"));

        assert!(!markers.exit_requested().unwrap());
        markers.clear_exit().unwrap();

        markers.raise_exit().unwrap();
        markers.raise_exit().unwrap();
        assert!(markers.exit_requested().unwrap());
        assert!(markers.exit_path().exists());

        markers.clear_exit().unwrap();
        assert!(!markers.exit_requested().unwrap());
    }

    #[test]
    fn test_refresh_notifier_touches() {
        let markers = MemoryMarkers::new();
        let notifier = RefreshNotifier::new(Arc::new(markers.clone()));
        notifier.content_changed();
        notifier.content_changed();
        assert_eq!(markers.touches(), 2);
        assert!(markers.refresh_stamp().unwrap().is_some());
    }
}
