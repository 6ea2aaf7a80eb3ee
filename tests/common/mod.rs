//! Shared fixtures: range-table data files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use ipi_core::EngineConfig;

pub const IPV4_EVIDENCE: &str = "185.28.167.77";
pub const IPV6_EVIDENCE: &str = "fdaa:bbcc:ddee:0:995f:d63a:f2a1:f189";
pub const IPV4_UNMATCHED: &str = "145.23.184.233";

/// A valid table whose evidence ranges resolve to `country`.
pub fn table(country: &str) -> String {
    format!(
        "# ipi-table v1\n\
         # published 2026-09-01\n\
         185.28.167.0|185.28.167.255|RegisteredCountry={country}|RegisteredName=Evidence Net {country}|AccuracyRadius=50|Latitude=51.5@0.7|Latitude=52.1@0.3\n\
         fdaa:bbcc:ddee::|fdaa:bbcc:ddee:ffff:ffff:ffff:ffff:ffff|RegisteredCountry={country}\n"
    )
}

pub fn write_table(path: &Path, country: &str) {
    std::fs::write(path, table(country)).unwrap();
}

/// A data file with the canonical name inside `dir`.
pub fn data_file(dir: &Path, country: &str) -> PathBuf {
    let path = dir.join("ipi-data.table");
    write_table(&path, country);
    path
}

/// Offline config: no polling, no watcher, isolation on with snapshots under `dir`.
pub fn offline_config(data_file: &Path, dir: &Path) -> EngineConfig {
    EngineConfig::new(data_file)
        .with_auto_update(false)
        .with_file_watch(false)
        .with_temp_dir(dir)
}

/// Poll `check` every 20ms until it holds or `timeout` passes.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
