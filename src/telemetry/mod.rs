//! Telemetry for the IPI engine host.
//!
//! Structured logging through `tracing` and counters through the `metrics`
//! facade. Exporting metrics is left to whichever recorder the host installs.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_file_changed, record_lookup, record_reload, record_update_check, set_generation,
};
