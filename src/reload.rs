//! Reload coordination: first load, hot reload and teardown of the active dataset.
//!
//! The active [`Generation`] is held as an `Arc` behind a read/write lock.
//! Lookups clone the `Arc` under a brief read lock and run without holding it,
//! so a swap never waits on lookups and a lookup always sees one complete
//! generation. The native handle of a replaced generation is released when the
//! last in-flight lookup drops its reference.
//!
//! Writers (reloads, external-change handling, shutdown) are serialized by a
//! mutex held across the native call.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::native::{Dataset, IpResults, IpiConfig, MatchingBackend, NativeError, PropertySet};
use crate::staging::{StagingArea, StagingError};
use crate::telemetry;

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Initial load from {path} failed: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: NativeError,
    },

    #[error("Reload from {path} failed: {source}")]
    Reload {
        path: PathBuf,
        #[source]
        source: NativeError,
    },
}

/// What a reload attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// First generation created.
    Initialized { generation: u64 },
    /// Active generation replaced.
    Reloaded { generation: u64 },
    /// Engine already stopped; nothing done.
    Skipped,
}

/// One loaded generation of the dataset.
pub struct Generation {
    id: u64,
    source: PathBuf,
    dataset: Box<dyn Dataset>,
}

impl Generation {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// File this generation was built from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn published(&self) -> Option<NaiveDate> {
        self.dataset.published()
    }

    pub fn process(&self, addr: IpAddr) -> Result<IpResults, NativeError> {
        self.dataset.process(addr)
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        tracing::debug!(generation = self.id, "dataset generation released");
    }
}

/// Snapshot of reload counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadStats {
    pub reloads: u64,
    pub failed_reloads: u64,
    pub externally_changed: u64,
    pub last_attempt_failed: bool,
    pub generation: Option<u64>,
    pub current_file: Option<PathBuf>,
    pub published: Option<NaiveDate>,
}

struct WriterState {
    stopped: bool,
    staging: Option<StagingArea>,
}

#[derive(Default)]
struct Counters {
    reloads: AtomicU64,
    failed: AtomicU64,
    externally_changed: AtomicU64,
    next_generation: AtomicU64,
    last_failed: AtomicBool,
}

/// Sole owner of the active dataset generation.
pub struct ReloadCoordinator {
    backend: Arc<dyn MatchingBackend>,
    config: IpiConfig,
    properties: PropertySet,
    data_file: PathBuf,
    staging_dir: Option<PathBuf>,
    active: RwLock<Option<Arc<Generation>>>,
    writer: Mutex<WriterState>,
    counters: Counters,
}

impl ReloadCoordinator {
    /// `staging` enables temp-copy isolation: every external change is loaded
    /// from a fresh snapshot inside it.
    pub fn new(
        backend: Arc<dyn MatchingBackend>,
        config: IpiConfig,
        properties: PropertySet,
        data_file: PathBuf,
        staging: Option<StagingArea>,
    ) -> Self {
        let staging_dir = staging.as_ref().map(|s| s.path().to_path_buf());
        Self {
            backend,
            config,
            properties,
            data_file,
            staging_dir,
            active: RwLock::new(None),
            writer: Mutex::new(WriterState { stopped: false, staging }),
            counters: Counters::default(),
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// The active generation, or `None` once stopped (or before the first load).
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.active.read().clone()
    }

    /// File the active generation was built from.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.active.read().as_ref().map(|g| g.source.clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.writer.lock().stopped
    }

    /// Load `path` as the next generation.
    ///
    /// On failure the active generation is untouched and nothing is deleted.
    /// On success the snapshot behind the replaced generation is removed.
    pub fn reload(&self, path: &Path) -> Result<ReloadOutcome, ReloadError> {
        let mut writer = self.writer.lock();
        self.reload_locked(&mut writer, path)
    }

    /// Handle a change of the canonical data file.
    ///
    /// With isolation the file is staged first and the snapshot loaded;
    /// otherwise the canonical path is loaded directly.
    pub fn process_file_externally_changed(&self) -> Result<ReloadOutcome, ReloadError> {
        let mut writer = self.writer.lock();
        if writer.stopped {
            return Ok(ReloadOutcome::Skipped);
        }

        let staged = writer.staging.as_ref().map(|s| s.stage(&self.data_file));
        match staged {
            None => self.reload_locked(&mut writer, &self.data_file),
            Some(Err(e)) => {
                self.record_failure();
                Err(ReloadError::Staging(e))
            }
            Some(Ok(staged)) => {
                let snapshot = staged.path();
                let result = self.reload_locked(&mut writer, &snapshot);
                if result.is_err() {
                    // never became current, so it is not part of the preserved state
                    remove_snapshot(&writer, &snapshot);
                }
                result
            }
        }
    }

    /// Count one externally detected change of the data file.
    pub fn note_external_change(&self) -> u64 {
        telemetry::record_file_changed();
        self.counters.externally_changed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn stats(&self) -> ReloadStats {
        let current = self.current();
        ReloadStats {
            reloads: self.counters.reloads.load(Ordering::SeqCst),
            failed_reloads: self.counters.failed.load(Ordering::SeqCst),
            externally_changed: self.counters.externally_changed.load(Ordering::SeqCst),
            last_attempt_failed: self.counters.last_failed.load(Ordering::SeqCst),
            generation: current.as_ref().map(|g| g.id),
            current_file: current.as_ref().map(|g| g.source.clone()),
            published: current.as_ref().and_then(|g| g.published()),
        }
    }

    /// Mark stopped, release the active generation and remove the staging directory.
    ///
    /// Later reloads are skipped and [`current`](Self::current) returns `None`.
    /// Lookups already holding the generation finish against it.
    pub fn shutdown(&self) {
        let mut writer = self.writer.lock();
        if writer.stopped {
            return;
        }
        writer.stopped = true;

        let released = self.active.write().take();
        match &released {
            Some(generation) => tracing::info!(
                generation = generation.id,
                in_flight = Arc::strong_count(generation) - 1,
                "releasing active dataset"
            ),
            None => tracing::info!("stopping engine, no dataset loaded"),
        }
        drop(released);

        if let Some(staging) = writer.staging.take() {
            let dir = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staging directory");
            }
        }
    }

    fn reload_locked(&self, writer: &mut WriterState, path: &Path) -> Result<ReloadOutcome, ReloadError> {
        if writer.stopped {
            tracing::debug!(path = %path.display(), "reload skipped, engine stopped");
            return Ok(ReloadOutcome::Skipped);
        }

        let current = self.current();
        let loaded = match &current {
            None => self
                .backend
                .initialize(&self.config, &self.properties, path)
                .map_err(|source| ReloadError::Init { path: path.to_path_buf(), source }),
            Some(active) => self
                .backend
                .reload(active.dataset.as_ref(), path)
                .map_err(|source| ReloadError::Reload { path: path.to_path_buf(), source }),
        };
        let dataset = match loaded {
            Ok(dataset) => dataset,
            Err(e) => {
                self.record_failure();
                return Err(e);
            }
        };

        let id = self.counters.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::new(Generation {
            id,
            source: path.to_path_buf(),
            dataset,
        });
        tracing::info!(
            generation = id,
            path = %path.display(),
            published = ?generation.published(),
            "dataset loaded"
        );

        let previous = self.active.write().replace(generation);
        self.counters.reloads.fetch_add(1, Ordering::SeqCst);
        self.counters.last_failed.store(false, Ordering::SeqCst);
        telemetry::record_reload("success");
        telemetry::set_generation(id);

        let Some(previous) = previous else {
            return Ok(ReloadOutcome::Initialized { generation: id });
        };
        if previous.source != path {
            remove_snapshot(writer, &previous.source);
        }
        Ok(ReloadOutcome::Reloaded { generation: id })
    }

    fn record_failure(&self) {
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
        self.counters.last_failed.store(true, Ordering::SeqCst);
        telemetry::record_reload("failure");
    }
}

/// Remove `path` if it is a snapshot in the staging area. The canonical data
/// file is never touched.
fn remove_snapshot(writer: &WriterState, path: &Path) {
    let Some(staging) = writer.staging.as_ref() else {
        return;
    };
    match staging.remove_snapshot(path) {
        Ok(true) => tracing::debug!(path = %path.display(), "stale snapshot removed"),
        Ok(false) => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale snapshot"),
    }
}
