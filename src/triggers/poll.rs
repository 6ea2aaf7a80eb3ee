//! Poll-timer trigger: periodic update checks against a distributor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distributor::{digest, install_data_file, DataDistributor, DistributorError, UpdateCheck, UpdateRequest};
use crate::reload::ReloadCoordinator;
use crate::shutdown::{ShutdownCoordinator, ShutdownError, StopSignal, TaskKind};
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound of the random delay added to each cycle.
    pub randomization: Duration,
    pub request: UpdateRequest,
}

/// What one update check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NotModified,
    /// A newer file was installed over the data file.
    Installed,
}

/// `interval` plus a uniform random delay in `0..=randomization`, saturating at `Duration::MAX`.
pub fn jittered_delay<R: Rng>(interval: Duration, randomization: Duration, rng: &mut R) -> Duration {
    let bound = u64::try_from(randomization.as_millis()).unwrap_or(u64::MAX);
    if bound == 0 {
        return interval;
    }
    interval.saturating_add(Duration::from_millis(rng.gen_range(0..=bound)))
}

/// Fetch once and install a newer file when there is one. Does not reload.
pub async fn check_for_update(
    distributor: &dyn DataDistributor,
    request: &UpdateRequest,
    data_file: PathBuf,
) -> Result<CheckOutcome, DistributorError> {
    let bytes = match distributor.fetch(request).await? {
        UpdateCheck::NotModified => return Ok(CheckOutcome::NotModified),
        UpdateCheck::Updated(bytes) => bytes,
    };
    install(distributor, data_file, bytes).await
}

/// Install `bytes` over `data_file` on the blocking pool, then tell the
/// distributor. A failed install is not acknowledged.
pub(crate) async fn install(
    distributor: &dyn DataDistributor,
    data_file: PathBuf,
    bytes: Vec<u8>,
) -> Result<CheckOutcome, DistributorError> {
    let fingerprint = digest(&bytes);
    let written = tokio::task::spawn_blocking(move || install_data_file(&data_file, &bytes))
        .await
        .map_err(|e| DistributorError::Task(e.to_string()))??;
    distributor.installed(&fingerprint);
    Ok(if written { CheckOutcome::Installed } else { CheckOutcome::NotModified })
}

/// Start the poll timer.
pub fn start(
    shutdown: &ShutdownCoordinator,
    coordinator: Arc<ReloadCoordinator>,
    distributor: Arc<dyn DataDistributor>,
    settings: PollSettings,
) -> Result<(), ShutdownError> {
    tracing::info!(
        interval_secs = settings.interval.as_secs(),
        randomization_secs = settings.randomization.as_secs(),
        "update polling enabled"
    );
    shutdown.spawn(TaskKind::UpdatePoller, move |stop| {
        poll_loop(coordinator, distributor, settings, stop)
    })
}

async fn poll_loop(
    coordinator: Arc<ReloadCoordinator>,
    distributor: Arc<dyn DataDistributor>,
    mut settings: PollSettings,
    stop: StopSignal,
) {
    let mut rng = StdRng::from_entropy();
    loop {
        let delay = jittered_delay(settings.interval, settings.randomization, &mut rng);
        tracing::debug!(delay_secs = delay.as_secs(), "next update check scheduled");

        tokio::select! {
            biased;
            () = stop.requested() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let data_file = coordinator.data_file().to_path_buf();
        match check_for_update(distributor.as_ref(), &settings.request, data_file).await {
            Ok(CheckOutcome::NotModified) => {
                telemetry::record_update_check("not_modified");
                tracing::debug!("no newer data file available");
            }
            Ok(CheckOutcome::Installed) => {
                telemetry::record_update_check("updated");
                settings.request.last_updated = Some(SystemTime::now());
                if stop.is_requested() {
                    tracing::debug!("update installed after stop request, reload skipped");
                    break;
                }
                tracing::info!("newer data file installed");
                super::reload_in_background(coordinator.clone(), "update-poll").await;
            }
            Err(e) => {
                telemetry::record_update_check("failure");
                tracing::warn!(error = %e, "update check failed, retrying next cycle");
            }
        }

        if stop.is_requested() {
            break;
        }
    }
    tracing::debug!("update poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let interval = Duration::from_secs(60);
        let randomization = Duration::from_secs(10);
        let mut saw_jitter = false;
        for _ in 0..200 {
            let d = jittered_delay(interval, randomization, &mut rng);
            assert!(d >= interval && d <= interval + randomization);
            saw_jitter |= d > interval;
        }
        assert!(saw_jitter);
    }

    #[test]
    fn test_huge_interval_saturates() {
        let mut rng = StdRng::seed_from_u64(3);
        let interval = Duration::from_secs(u64::MAX);
        for _ in 0..50 {
            let d = jittered_delay(interval, Duration::from_secs(600), &mut rng);
            assert!(d >= interval);
        }
    }

    #[test]
    fn test_zero_randomization_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let interval = Duration::from_millis(1500);
        assert_eq!(jittered_delay(interval, Duration::ZERO, &mut rng), interval);
    }
}
