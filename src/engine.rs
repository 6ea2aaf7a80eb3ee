//! Engine facade.
//!
//! [`Engine::new`] validates the configuration, optionally pulls an update,
//! performs the first load and starts the enabled triggers, so the engine is
//! query-ready when it returns. [`Engine::stop`] waits for the triggers to
//! exit before the dataset and the snapshot directory are released.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{ConfigError, EngineConfig};
use crate::distributor::{fetch_with_retries, DataDistributor, UpdateCheck};
use crate::error::EngineError;
use crate::health::{HealthChecker, HealthConfig, HealthReport};
use crate::native::{IpResults, MatchingBackend};
use crate::reload::{ReloadCoordinator, ReloadOutcome, ReloadStats};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::staging::StagingArea;
use crate::telemetry;
use crate::triggers::{poll, watch};

/// Engine counters and state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub reload: ReloadStats,
    pub background_tasks: usize,
    pub stopped: bool,
    pub uptime: Duration,
}

pub struct Engine {
    coordinator: Arc<ReloadCoordinator>,
    shutdown: ShutdownCoordinator,
    health: HealthChecker,
    started: std::time::Instant,
    stop_report: tokio::sync::Mutex<Option<ShutdownReport>>,
}

impl Engine {
    /// Build an engine without a distributor. Auto update must be disabled.
    pub async fn new(config: EngineConfig, backend: Arc<dyn MatchingBackend>) -> Result<Self, EngineError> {
        Self::with_distributor(config, backend, None).await
    }

    pub async fn with_distributor(
        config: EngineConfig,
        backend: Arc<dyn MatchingBackend>,
        distributor: Option<Arc<dyn DataDistributor>>,
    ) -> Result<Self, EngineError> {
        let data_file = config.validate()?.to_path_buf();
        let distributor = match (config.auto_update, distributor) {
            (true, None) => return Err(ConfigError::MissingDistributor.into()),
            (true, Some(d)) => Some(d),
            (false, _) => None,
        };

        let mut poll_settings = config.poll_settings();
        if let Some(distributor) = distributor.as_deref().filter(|_| config.update_on_start) {
            if update_on_start(distributor, &config, &data_file).await? {
                poll_settings.request.last_updated = Some(SystemTime::now());
            }
        }

        let staging = if config.temp_data_copy {
            Some(StagingArea::create(config.temp_dir.as_deref())?)
        } else {
            None
        };
        let coordinator = Arc::new(ReloadCoordinator::new(
            backend,
            config.ipi.clone(),
            config.properties.clone(),
            data_file,
            staging,
        ));

        if let Err(e) = first_load(coordinator.clone()).await {
            coordinator.shutdown();
            return Err(e);
        }

        let shutdown = ShutdownCoordinator::new();
        if let Err(e) = start_triggers(&shutdown, &coordinator, &config, distributor, poll_settings) {
            shutdown.initiate().await;
            coordinator.shutdown();
            return Err(e);
        }
        let expected_tasks = shutdown.registered_tasks();

        tracing::info!(
            data_file = %coordinator.data_file().display(),
            staging_dir = ?coordinator.staging_dir(),
            profile = config.ipi.profile().as_str(),
            background_tasks = expected_tasks,
            "engine started"
        );

        Ok(Self {
            coordinator,
            shutdown,
            health: HealthChecker::new(HealthConfig { expected_tasks, ..HealthConfig::default() }),
            started: std::time::Instant::now(),
            stop_report: tokio::sync::Mutex::new(None),
        })
    }

    /// Resolve the configured properties for `ip`.
    ///
    /// Fails with [`EngineError::Stopped`] once [`stop`](Self::stop) has run.
    pub fn process(&self, ip: &str) -> Result<IpResults, EngineError> {
        if self.coordinator.current().is_none() {
            return Err(EngineError::Stopped);
        }
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidAddress(ip.to_string()))?;
        self.process_addr(addr)
    }

    pub fn process_addr(&self, addr: IpAddr) -> Result<IpResults, EngineError> {
        let generation = self.coordinator.current().ok_or(EngineError::Stopped)?;
        let result = generation.process(addr).map_err(EngineError::Lookup);
        telemetry::record_lookup(result.is_ok());
        result
    }

    /// Reload from the data file now, as if it had changed on disk.
    pub async fn refresh(&self) -> Result<ReloadOutcome, EngineError> {
        let coordinator = self.coordinator.clone();
        let outcome = tokio::task::spawn_blocking(move || coordinator.process_file_externally_changed())
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;
        Ok(outcome)
    }

    /// Load `path` directly as the next generation, bypassing staging.
    pub async fn reload_from(&self, path: impl Into<PathBuf>) -> Result<ReloadOutcome, EngineError> {
        let coordinator = self.coordinator.clone();
        let path = path.into();
        let outcome = tokio::task::spawn_blocking(move || coordinator.reload(&path))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;
        Ok(outcome)
    }

    pub fn data_file(&self) -> &Path {
        self.coordinator.data_file()
    }

    /// Snapshot directory, when temp-copy isolation is enabled.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.coordinator.staging_dir()
    }

    /// File backing the active generation.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.coordinator.current_file()
    }

    pub fn is_stopped(&self) -> bool {
        self.coordinator.is_stopped()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            reload: self.coordinator.stats(),
            background_tasks: self.shutdown.active_tasks(),
            stopped: self.is_stopped(),
            uptime: self.started.elapsed(),
        }
    }

    pub fn health(&self) -> HealthReport {
        self.health.report(
            self.shutdown.state(),
            &self.coordinator.stats(),
            self.shutdown.active_tasks(),
        )
    }

    /// Stop the triggers, then release the dataset and the snapshot directory.
    ///
    /// Waits for in-flight reloads to finish. Calling it again returns the
    /// first report.
    pub async fn stop(&self) -> ShutdownReport {
        let mut done = self.stop_report.lock().await;
        if let Some(report) = done.as_ref() {
            return report.clone();
        }

        let report = self.shutdown.initiate().await;
        self.coordinator.shutdown();
        tracing::info!(
            requested = report.requested,
            acknowledged = report.acknowledged,
            "engine stopped"
        );
        *done = Some(report.clone());
        report
    }
}

/// Fetch and install an update before the first load. `true` if a newer file was installed.
async fn update_on_start(
    distributor: &dyn DataDistributor,
    config: &EngineConfig,
    data_file: &Path,
) -> Result<bool, EngineError> {
    let request = config.update_request();
    let check = match fetch_with_retries(distributor, &request, config.max_retries).await {
        Ok(check) => check,
        Err(e) => {
            telemetry::record_update_check("failure");
            return Err(e.into());
        }
    };
    let bytes = match check {
        UpdateCheck::NotModified => {
            telemetry::record_update_check("not_modified");
            tracing::debug!("data file up to date at start");
            return Ok(false);
        }
        UpdateCheck::Updated(bytes) => bytes,
    };

    let outcome = poll::install(distributor, data_file.to_path_buf(), bytes).await?;
    let installed = outcome == poll::CheckOutcome::Installed;
    telemetry::record_update_check(if installed { "updated" } else { "not_modified" });
    if installed {
        tracing::info!(path = %data_file.display(), "data file updated at start");
    }
    Ok(installed)
}

async fn first_load(coordinator: Arc<ReloadCoordinator>) -> Result<(), EngineError> {
    let outcome = tokio::task::spawn_blocking(move || coordinator.process_file_externally_changed())
        .await
        .map_err(|e| EngineError::Task(e.to_string()))??;
    tracing::debug!(?outcome, "first load complete");
    Ok(())
}

fn start_triggers(
    shutdown: &ShutdownCoordinator,
    coordinator: &Arc<ReloadCoordinator>,
    config: &EngineConfig,
    distributor: Option<Arc<dyn DataDistributor>>,
    poll_settings: poll::PollSettings,
) -> Result<(), EngineError> {
    if config.file_watch {
        watch::start(shutdown, coordinator.clone(), config.watch_debounce)?;
    }
    if let Some(distributor) = distributor {
        poll::start(shutdown, coordinator.clone(), distributor, poll_settings)?;
    }
    Ok(())
}
