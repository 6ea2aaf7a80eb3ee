//! Background reload triggers.
//!
//! Both triggers are registered with the [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator)
//! and stop acting once the stop signal fires.

pub mod poll;
pub mod watch;

use std::sync::Arc;

use crate::error::EngineError;
use crate::reload::{ReloadCoordinator, ReloadOutcome};

/// Run the external-change path on the blocking pool.
///
/// Failures are logged; the previous generation keeps serving and the next
/// trigger tries again.
pub(crate) async fn reload_in_background(
    coordinator: Arc<ReloadCoordinator>,
    trigger: &'static str,
) -> Option<ReloadOutcome> {
    match tokio::task::spawn_blocking(move || coordinator.process_file_externally_changed()).await {
        Ok(Ok(outcome)) => {
            tracing::debug!(trigger, ?outcome, "triggered reload finished");
            Some(outcome)
        }
        Ok(Err(e)) => {
            let e = EngineError::from(e);
            if e.is_warning() {
                tracing::warn!(trigger, error = %e, "reload failed, previous dataset still active");
            } else {
                tracing::error!(trigger, error = %e, "reload failed");
            }
            None
        }
        Err(e) => {
            tracing::warn!(trigger, error = %e, "reload task ended abnormally");
            None
        }
    }
}
