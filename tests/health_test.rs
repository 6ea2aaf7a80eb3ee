//! Health reporting through the engine facade.

mod common;

use std::sync::Arc;

use common::{data_file, offline_config};
use ipi_core::health::{HealthChecker, HealthConfig, HealthState};
use ipi_core::reload::ReloadStats;
use ipi_core::shutdown::ShutdownState;
use ipi_core::{Engine, TableBackend};

fn empty_stats() -> ReloadStats {
    ReloadStats {
        reloads: 0,
        failed_reloads: 0,
        externally_changed: 0,
        last_attempt_failed: false,
        generation: None,
        current_file: None,
        published: None,
    }
}

#[test]
fn test_not_ready_without_generation() {
    let checker = HealthChecker::new(HealthConfig::default());
    assert!(!checker.is_ready(ShutdownState::Running, &empty_stats()));
    let report = checker.report(ShutdownState::Running, &empty_stats(), 0);
    assert_eq!(report.state, HealthState::Unhealthy);
}

#[test]
fn test_failed_reload_does_not_degrade_when_disabled() {
    let checker = HealthChecker::new(HealthConfig { degrade_on_failed_reload: false, expected_tasks: 0 });
    let stats = ReloadStats { generation: Some(3), last_attempt_failed: true, ..empty_stats() };
    assert_eq!(checker.report(ShutdownState::Running, &stats, 0).state, HealthState::Healthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_health_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let engine = Engine::new(offline_config(&data, dir.path()), Arc::new(TableBackend::new()))
        .await
        .unwrap();

    let report = engine.health();
    assert_eq!(report.state, HealthState::Healthy);
    assert!(report.ready);
    assert_eq!(report.generation, Some(1));
    assert_eq!(report.published, chrono::NaiveDate::from_ymd_opt(2026, 9, 1));

    std::fs::write(&data, "broken").unwrap();
    assert!(engine.refresh().await.is_err());
    let report = engine.health();
    assert_eq!(report.state, HealthState::Degraded);
    assert!(report.ready);
    assert_eq!(report.failed_reloads, 1);

    engine.stop().await;
    let report = engine.health();
    assert_eq!(report.state, HealthState::Unhealthy);
    assert!(report.stopped);
    assert!(!report.ready);
}
