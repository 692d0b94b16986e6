//! Restart admission: the per-event decision whether a filesystem change
//! should restart the supervised command.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::options::Options;

/// A change reported by the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    path: PathBuf,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.display().fmt(f)
    }
}

/// Admit `event` only if all of the following hold:
///
/// 1. there is an event at all (a disabled watcher yields `None`);
/// 2. lazy mode is off, or the command is not running;
/// 3. the path passes the configured [`crate::PathFilter`];
/// 4. at least one debounce window has elapsed since `last_restart`.
///
/// Rejected events are dropped, not queued.
pub fn should_restart(
    event: Option<&FsEvent>,
    options: &Options,
    child_running: bool,
    last_restart: Instant,
    now: Instant,
) -> bool {
    let Some(event) = event else {
        return false;
    };
    !(options.lazy && child_running)
        && options.filter.allows(event.path())
        && options.debounce.allows(last_restart, now)
}
