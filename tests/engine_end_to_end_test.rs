//! End-to-end engine lifecycle: construct, look up, reload, stop.

mod common;

use std::sync::Arc;

use common::{data_file, offline_config, write_table, IPV4_EVIDENCE, IPV4_UNMATCHED, IPV6_EVIDENCE};
use ipi_core::config::ConfigError;
use ipi_core::native::StatusCode;
use ipi_core::{Engine, EngineConfig, EngineError, PropertySet, ReloadOutcome, TableBackend};

fn backend() -> Arc<TableBackend> {
    Arc::new(TableBackend::new())
}

fn country(engine: &Engine, ip: &str) -> String {
    let results = engine.process(ip).unwrap();
    results.value_weight("RegisteredCountry").unwrap().0.to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_reload_stop() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let second = dir.path().join("second.table");
    write_table(&second, "FR");

    let engine = Engine::new(offline_config(&data, dir.path()), backend()).await.unwrap();

    let results = engine.process(IPV4_EVIDENCE).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results.value_weight("RegisteredCountry"), Some(("GB", 1.0)));
    assert_eq!(results.value_weight("Latitude"), Some(("51.5", 0.7)));
    assert_eq!(results.values("Latitude").map(|v| v.len()), Some(2));

    let outcome = engine.reload_from(&second).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Reloaded { generation: 2 });
    assert_eq!(country(&engine, IPV4_EVIDENCE), "FR");
    assert_eq!(engine.current_file().as_deref(), Some(second.as_path()));

    let staging = engine.staging_dir().unwrap().to_path_buf();
    assert!(staging.exists());

    let report = engine.stop().await;
    assert_eq!(report.requested, 0);
    assert!(engine.is_stopped());
    assert!(!staging.exists(), "snapshot directory removed on stop");
    assert!(matches!(engine.process(IPV4_EVIDENCE), Err(EngineError::Stopped)));
    assert!(data.exists() && second.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refresh_picks_up_rewritten_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let engine = Engine::new(offline_config(&data, dir.path()), backend()).await.unwrap();
    let first_snapshot = engine.current_file().unwrap();

    write_table(&data, "DE");
    assert_eq!(engine.refresh().await.unwrap(), ReloadOutcome::Reloaded { generation: 2 });
    assert_eq!(country(&engine, IPV4_EVIDENCE), "DE");
    assert!(!first_snapshot.exists());

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lookups_by_family_and_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let engine = Engine::new(offline_config(&data, dir.path()), backend()).await.unwrap();

    assert_eq!(country(&engine, IPV6_EVIDENCE), "GB");
    assert!(engine.process(IPV4_UNMATCHED).unwrap().is_empty());
    assert!(matches!(
        engine.process("999.1.1.1"),
        Err(EngineError::InvalidAddress(ip)) if ip == "999.1.1.1"
    ));
    // per-call errors leave the engine untouched
    assert_eq!(engine.stats().reload.generation, Some(1));

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_property_subset() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let config = offline_config(&data, dir.path()).with_properties(PropertySet::parse("RegisteredCountry"));
    let engine = Engine::new(config, backend()).await.unwrap();

    let results = engine.process(IPV4_EVIDENCE).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.value_weight("AccuracyRadius").is_none());

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_without_isolation_loads_canonical_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let config = offline_config(&data, dir.path()).with_temp_data_copy(false);
    let engine = Engine::new(config, backend()).await.unwrap();

    assert!(engine.staging_dir().is_none());
    assert_eq!(engine.current_file().as_deref(), Some(data.as_path()));

    write_table(&data, "IE");
    engine.refresh().await.unwrap();
    assert_eq!(country(&engine, IPV4_EVIDENCE), "IE");

    engine.stop().await;
    assert!(data.exists(), "canonical file must survive stop");
}

#[tokio::test]
async fn test_configuration_errors_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");

    let err = Engine::new(EngineConfig::default(), backend()).await.err().unwrap();
    assert!(matches!(err, EngineError::Configuration(ConfigError::MissingDataFile)));
    assert!(err.is_fatal());

    let err = Engine::new(EngineConfig::new(&data).with_file_watch(false), backend())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Configuration(ConfigError::LicenseKeyRequired)));

    let keyed = EngineConfig::new(&data).with_file_watch(false).with_license_key("KEY");
    let err = Engine::new(keyed, backend()).await.err().unwrap();
    assert!(matches!(err, EngineError::Configuration(ConfigError::MissingDistributor)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrupt_first_load_is_fatal_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("ipi-data.table");
    std::fs::write(&data, "# ipi-table v7\n").unwrap();
    let staging_parent = dir.path().join("staging");
    std::fs::create_dir(&staging_parent).unwrap();

    let config = offline_config(&data, &staging_parent);
    let err = Engine::new(config, backend()).await.err().unwrap();
    assert!(matches!(err, EngineError::NativeInit { .. }));
    assert_eq!(err.native_status(), Some(StatusCode::IncorrectVersion));
    assert!(err.is_fatal());
    assert_eq!(std::fs::read_dir(&staging_parent).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let engine = Engine::new(offline_config(&data, dir.path()).with_file_watch(true), backend())
        .await
        .unwrap();
    assert_eq!(engine.stats().background_tasks, 1);

    let first = engine.stop().await;
    assert_eq!((first.requested, first.acknowledged), (1, 1));
    assert_eq!(engine.stop().await, first);
    assert_eq!(engine.refresh().await.unwrap(), ReloadOutcome::Skipped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_during_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_file(dir.path(), "GB");
    let engine = Arc::new(Engine::new(offline_config(&data, dir.path()), backend()).await.unwrap());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..500 {
                    let r = engine.process(IPV4_EVIDENCE).unwrap();
                    let country = r.value_weight("RegisteredCountry").unwrap().0.to_string();
                    let name = r.value_weight("RegisteredName").unwrap().0.to_string();
                    assert_eq!(name, format!("Evidence Net {country}"));
                }
            })
        })
        .collect();

    for country in ["FR", "DE", "GB", "NL", "ES"] {
        write_table(&data, country);
        engine.refresh().await.unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(country(&engine, IPV4_EVIDENCE), "ES");
    engine.stop().await;
}
