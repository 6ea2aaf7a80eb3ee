//! IPI-CORE
//!
//! Host-side lifecycle for an on-premise IP intelligence dataset: first load,
//! hot reload on file change or distributor update, and ordered shutdown.
//! Lookups run concurrently against an immutable dataset generation and are
//! never interrupted by a reload.
//!
//! # Components
//!
//! - [`native`]: matching-backend seam, performance profiles, results
//! - [`staging`]: private snapshots of the data file
//! - [`reload`]: owner of the active generation
//! - [`triggers`]: file watch and update polling
//! - [`shutdown`]: stop signal and task barrier
//! - [`engine`]: the facade applications use
//!
//! ```no_run
//! use std::sync::Arc;
//! use ipi_core::{Engine, EngineConfig, TableBackend};
//!
//! # async fn run() -> Result<(), ipi_core::EngineError> {
//! let config = EngineConfig::new("/srv/ipi/data.ipi").with_auto_update(false);
//! let engine = Engine::new(config, Arc::new(TableBackend::new())).await?;
//! let results = engine.process("185.28.167.77")?;
//! println!("{:?}", results.value_weight("RegisteredCountry"));
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod health;
pub mod native;
pub mod reload;
pub mod shutdown;
pub mod staging;
pub mod telemetry;
pub mod triggers;

pub use config::{ConfigError, EngineConfig};
pub use distributor::{DataDistributor, MirrorDistributor, UpdateCheck, UpdateRequest};
pub use engine::{Engine, EngineStats};
pub use error::EngineError;
pub use health::{HealthReport, HealthState};
pub use native::{IpResults, IpiConfig, MatchingBackend, PerformanceProfile, PropertySet, TableBackend};
pub use reload::{ReloadOutcome, ReloadStats};
pub use shutdown::ShutdownReport;
