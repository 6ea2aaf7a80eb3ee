//! Health reporting for the host application.
//!
//! Readiness means a dataset generation is loaded and the engine is not
//! shutting down. A failed last reload degrades health without affecting
//! readiness, since lookups keep being served from the previous generation.

use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;

use crate::reload::ReloadStats;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub stopped: bool,
    pub generation: Option<u64>,
    pub current_file: Option<PathBuf>,
    pub published: Option<NaiveDate>,
    pub reloads: u64,
    pub failed_reloads: u64,
    pub externally_changed: u64,
    pub background_tasks: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub degrade_on_failed_reload: bool,
    /// Background tasks expected to be alive; fewer means one exited early.
    pub expected_tasks: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { degrade_on_failed_reload: true, expected_tasks: 0 }
    }
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config, start_time: Instant::now() }
    }

    pub fn is_ready(&self, shutdown_state: ShutdownState, stats: &ReloadStats) -> bool {
        shutdown_state == ShutdownState::Running && stats.generation.is_some()
    }

    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        stats: &ReloadStats,
        background_tasks: usize,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown_state, stats, background_tasks),
            ready: self.is_ready(shutdown_state, stats),
            stopped: shutdown_state != ShutdownState::Running,
            generation: stats.generation,
            current_file: stats.current_file.clone(),
            published: stats.published,
            reloads: stats.reloads,
            failed_reloads: stats.failed_reloads,
            externally_changed: stats.externally_changed,
            background_tasks,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(
        &self,
        shutdown_state: ShutdownState,
        stats: &ReloadStats,
        background_tasks: usize,
    ) -> HealthState {
        if !self.is_ready(shutdown_state, stats) {
            return HealthState::Unhealthy;
        }
        if self.config.degrade_on_failed_reload && stats.last_attempt_failed {
            return HealthState::Degraded;
        }
        if background_tasks < self.config.expected_tasks {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
