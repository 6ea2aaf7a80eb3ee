//! Engine-level error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::distributor::DistributorError;
use crate::native::NativeError;
use crate::reload::ReloadError;
use crate::shutdown::ShutdownError;
use crate::staging::StagingError;
use crate::triggers::watch::WatchError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Initial load from {path} failed: {source}")]
    NativeInit {
        path: PathBuf,
        #[source]
        source: NativeError,
    },

    #[error("Reload from {path} failed: {source}")]
    NativeReload {
        path: PathBuf,
        #[source]
        source: NativeError,
    },

    #[error("Update failed: {0}")]
    Update(#[from] DistributorError),

    #[error("File watch failed: {0}")]
    Watch(#[from] WatchError),

    #[error("Invalid IP address: {0:?}")]
    InvalidAddress(String),

    #[error("Lookup failed: {0}")]
    Lookup(#[source] NativeError),

    #[error("Engine stopped")]
    Stopped,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<ReloadError> for EngineError {
    fn from(err: ReloadError) -> Self {
        match err {
            ReloadError::Staging(e) => Self::Staging(e),
            ReloadError::Init { path, source } => Self::NativeInit { path, source },
            ReloadError::Reload { path, source } => Self::NativeReload { path, source },
        }
    }
}

impl From<ShutdownError> for EngineError {
    fn from(err: ShutdownError) -> Self {
        Self::Task(err.to_string())
    }
}

impl EngineError {
    /// Kinds that abort engine construction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::NativeInit { .. } | Self::Watch(_) | Self::Update(_)
        )
    }

    /// Kinds a background trigger logs and retries on its next cycle.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Staging(_) | Self::NativeReload { .. })
    }

    /// Native status of the underlying failure, if any.
    pub fn native_status(&self) -> Option<crate::native::StatusCode> {
        match self {
            Self::NativeInit { source, .. } | Self::NativeReload { source, .. } | Self::Lookup(source) => {
                Some(source.status())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::StatusCode;

    #[test]
    fn test_reload_errors_map_to_engine_kinds() {
        let init: EngineError = ReloadError::Init {
            path: PathBuf::from("/data/a.ipi"),
            source: NativeError::FileNotFound(PathBuf::from("/data/a.ipi")),
        }
        .into();
        assert!(init.is_fatal());
        assert_eq!(init.native_status(), Some(StatusCode::FileNotFound));

        let reload: EngineError = ReloadError::Reload {
            path: PathBuf::from("/data/b.ipi"),
            source: NativeError::NotSet("AccuracyRadius".into()),
        }
        .into();
        assert!(!reload.is_fatal());
        assert!(reload.is_warning());
    }

    #[test]
    fn test_per_call_errors_are_neither() {
        for err in [EngineError::Stopped, EngineError::InvalidAddress("nope".into())] {
            assert!(!err.is_fatal());
            assert!(!err.is_warning());
        }
    }
}
