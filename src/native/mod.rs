//! Boundary to the matching engine.
//!
//! A [`MatchingBackend`] turns a data file into a [`Dataset`], one loaded
//! generation of the IP intelligence data. Dropping the boxed dataset releases
//! the generation. The production engine sits behind these traits; the
//! [`table`] backend is a plain-text stand-in for development and tests.

mod config;
mod properties;
mod results;
pub mod table;

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

pub use config::{CollectionMode, IpiConfig, PerformanceProfile};
pub use properties::{PropertySet, DEFAULT_PROPERTIES};
pub use results::{IpResults, PropertyValues, WeightedValue};
pub use table::TableBackend;

/// Native status codes surfaced by the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InsufficientMemory,
    CorruptData,
    IncorrectVersion,
    FileNotFound,
    FileBusy,
    FileFailure,
    NotSet,
}

#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Insufficient memory to load {0}")]
    InsufficientMemory(PathBuf),

    #[error("Corrupt data in {path}: {detail}")]
    CorruptData { path: PathBuf, detail: String },

    #[error("Incorrect data file version in {path}: found {found}")]
    IncorrectVersion { path: PathBuf, found: String },

    #[error("Data file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Data file busy: {0}")]
    FileBusy(PathBuf),

    #[error("Data file failure for {path}: {source}")]
    FileFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Native status not set: {0}")]
    NotSet(String),
}

impl NativeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InsufficientMemory(_) => StatusCode::InsufficientMemory,
            Self::CorruptData { .. } => StatusCode::CorruptData,
            Self::IncorrectVersion { .. } => StatusCode::IncorrectVersion,
            Self::FileNotFound(_) => StatusCode::FileNotFound,
            Self::FileBusy(_) => StatusCode::FileBusy,
            Self::FileFailure { .. } => StatusCode::FileFailure,
            Self::NotSet(_) => StatusCode::NotSet,
        }
    }

    /// Map an I/O failure on `path` onto the matching status.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::OutOfMemory => Self::InsufficientMemory(path.to_path_buf()),
            std::io::ErrorKind::WouldBlock => Self::FileBusy(path.to_path_buf()),
            _ => Self::FileFailure { path: path.to_path_buf(), source: err },
        }
    }
}

/// One loaded generation of the dataset.
pub trait Dataset: Send + Sync {
    /// Resolve the configured properties for `addr`.
    fn process(&self, addr: IpAddr) -> Result<IpResults, NativeError>;

    fn config(&self) -> &IpiConfig;

    fn properties(&self) -> &PropertySet;

    /// Publication date recorded in the data file, if any.
    fn published(&self) -> Option<NaiveDate> {
        None
    }
}

/// Loads datasets from files.
pub trait MatchingBackend: Send + Sync {
    /// First load: build a dataset from `path`.
    fn initialize(
        &self,
        config: &IpiConfig,
        properties: &PropertySet,
        path: &Path,
    ) -> Result<Box<dyn Dataset>, NativeError>;

    /// Build the next generation from `path` with the settings of `current`.
    /// `current` stays valid whether or not this succeeds.
    fn reload(&self, current: &dyn Dataset, path: &Path) -> Result<Box<dyn Dataset>, NativeError> {
        self.initialize(current.config(), current.properties(), path)
    }
}
