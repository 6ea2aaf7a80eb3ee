//! File-watch trigger.
//!
//! The data file's parent directory is watched rather than the file itself,
//! so replace-by-rename (how updates are installed) is seen as well as
//! in-place writes. A burst of events is collapsed into one reload once the
//! directory has been quiet for the debounce window.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::reload::ReloadCoordinator;
use crate::shutdown::{ShutdownCoordinator, ShutdownError, StopSignal, TaskKind};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: String,
        #[source]
        source: notify::Error,
    },

    #[error("Data file {0} has no file name")]
    NoFileName(String),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Whether `event` is a content or name change of `file_name`.
pub fn is_data_file_change(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Start watching the coordinator's data file.
pub fn start(
    shutdown: &ShutdownCoordinator,
    coordinator: Arc<ReloadCoordinator>,
    debounce: Duration,
) -> Result<(), WatchError> {
    let data_file = coordinator.data_file().to_path_buf();
    let file_name = data_file
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| WatchError::NoFileName(data_file.display().to_string()))?;
    let dir = match data_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let (tx, rx) = unbounded_channel();
    let watcher = create_watcher(&dir, file_name, tx)?;
    tracing::info!(dir = %dir.display(), debounce_ms = debounce.as_millis() as u64, "watching data file");

    shutdown.spawn(TaskKind::FileWatcher, move |stop| {
        watch_loop(watcher, rx, coordinator, debounce, stop)
    })?;
    Ok(())
}

fn create_watcher(
    dir: &Path,
    file_name: OsString,
    tx: UnboundedSender<()>,
) -> Result<RecommendedWatcher, WatchError> {
    let notify_err = |source| WatchError::Notify { path: dir.display().to_string(), source };

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) if is_data_file_change(&event, &file_name) => {
                // receiver gone means the loop has exited
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "file watch error"),
        },
        Config::default(),
    )
    .map_err(notify_err)?;

    watcher.watch(dir, RecursiveMode::NonRecursive).map_err(notify_err)?;
    Ok(watcher)
}

async fn watch_loop(
    _watcher: RecommendedWatcher,
    mut events: UnboundedReceiver<()>,
    coordinator: Arc<ReloadCoordinator>,
    debounce: Duration,
    stop: StopSignal,
) {
    loop {
        tokio::select! {
            biased;
            () = stop.requested() => break,
            event = events.recv() => {
                if event.is_none() {
                    tracing::warn!("file watch channel closed");
                    break;
                }
                if !settle(&mut events, debounce, &stop).await || stop.is_requested() {
                    break;
                }
                let count = coordinator.note_external_change();
                tracing::info!(
                    path = %coordinator.data_file().display(),
                    count,
                    "data file changed"
                );
                super::reload_in_background(coordinator.clone(), "file-watch").await;
            }
        }
    }
    tracing::debug!("file watcher stopped");
}

/// Absorb events until none arrives for `debounce`. `false` if a stop came first.
async fn settle(events: &mut UnboundedReceiver<()>, debounce: Duration, stop: &StopSignal) -> bool {
    loop {
        tokio::select! {
            biased;
            () = stop.requested() => return false,
            next = tokio::time::timeout(debounce, events.recv()) => match next {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => return true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RenameMode};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_filters_to_data_file_changes() {
        let name = OsString::from("data.ipi");
        assert!(is_data_file_change(
            &event(EventKind::Modify(ModifyKind::Any), "/srv/data.ipi"),
            &name
        ));
        assert!(is_data_file_change(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/srv/data.ipi"),
            &name
        ));
        assert!(is_data_file_change(
            &event(EventKind::Create(CreateKind::File), "/srv/data.ipi"),
            &name
        ));
        assert!(!is_data_file_change(
            &event(EventKind::Create(CreateKind::File), "/srv/.tmpA1b2"),
            &name
        ));
        assert!(!is_data_file_change(
            &event(EventKind::Access(AccessKind::Read), "/srv/data.ipi"),
            &name
        ));
    }
}
