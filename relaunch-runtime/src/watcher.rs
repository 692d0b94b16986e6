use std::fs;
use std::path::{Path, PathBuf};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use relaunch_core::FsEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{io_err, RuntimeError};

/// Filesystem change source: a recursive notify watcher over every watch
/// root, forwarding one [`FsEvent`] per changed path.
pub struct ChangeSource {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
    roots: Vec<PathBuf>,
}

impl ChangeSource {
    /// Start watching `roots`. Must be called from inside a tokio runtime.
    pub fn start(roots: &[PathBuf], change_tx: mpsc::Sender<FsEvent>) -> Result<Self, RuntimeError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;

        let mut watched = Vec::with_capacity(roots.len());
        for root in roots {
            // Canonicalize so backends that report real paths (FSEvents on
            // macOS) agree with the ignore prefixes.
            let canonical = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
            watcher.watch(&canonical, RecursiveMode::Recursive)?;
            tracing::debug!(path = %canonical.display(), "watching");
            watched.push(canonical);
        }

        let task = tokio::spawn(forward_events(event_rx, change_tx));
        Ok(Self {
            watcher: Some(watcher),
            task: Some(task),
            roots: watched,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Cancel the watch. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for root in &self.roots {
                let _ = watcher.unwatch(root);
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChangeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn forward_events(
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    change_tx: mpsc::Sender<FsEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "watcher event error");
                continue;
            }
        };
        if !is_relevant_event_kind(&event.kind) {
            continue;
        }
        for path in event.paths {
            if change_tx.send(FsEvent::new(path)).await.is_err() {
                return;
            }
        }
    }
    tracing::warn!("watcher stopped; file changes will no longer trigger restarts");
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// `true` when `path` lies under one of `roots`.
pub fn is_watched(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn access_events_are_ignored() {
        assert!(is_relevant_event_kind(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_event_kind(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_relevant_event_kind(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn missing_root_is_a_setup_error() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let _guard = rt.enter();
        let (tx, _rx) = mpsc::channel(8);
        let err = ChangeSource::start(&[PathBuf::from("/definitely/not/here")], tx)
            .err()
            .expect("missing root must fail");
        assert!(matches!(err, RuntimeError::Io { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn file_write_produces_event_under_root() {
        let dir = TempDir::new().expect("tempdir");
        let (tx, mut rx) = mpsc::channel(64);
        let mut source = ChangeSource::start(&[dir.path().to_path_buf()], tx).expect("watch");
        assert!(source.is_active());

        let target = source.roots()[0].join("main.rs");
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&target, "fn main() {}").expect("write");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert!(is_watched(event.path(), source.roots()), "got: {event}");

        source.stop();
        source.stop();
        assert!(!source.is_active());
    }
}
