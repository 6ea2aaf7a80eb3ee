//! Update distributor seam.
//!
//! The poll timer asks a [`DataDistributor`] whether a newer data file exists.
//! The transport is the distributor's business; the engine only sees the
//! bytes of a newer file, or "not modified".

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Delay before the first retry; later retries back off linearly.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("Distributor unavailable: {0}")]
    Unavailable(String),

    #[error("Distributor rejected the request: {0}")]
    Rejected(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Too many retries ({attempts}) pulling the data file: {last}")]
    TooManyRetries {
        attempts: u32,
        #[source]
        last: Box<DistributorError>,
    },

    #[error("Update task failed: {0}")]
    Task(String),
}

impl DistributorError {
    /// Rejections (bad license key, unknown product) are not worth retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_) | Self::TooManyRetries { .. })
    }
}

/// Parameters of one update check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Custom source overriding the distributor's default.
    pub url: Option<String>,
    pub license_key: Option<String>,
    pub product: String,
    /// When the currently installed file was last updated by this engine.
    pub last_updated: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    NotModified,
    Updated(Vec<u8>),
}

#[async_trait]
pub trait DataDistributor: Send + Sync {
    async fn fetch(&self, request: &UpdateRequest) -> Result<UpdateCheck, DistributorError>;

    /// Bytes with this [`digest`] are now the installed data file.
    ///
    /// Called only after a fetched update is on disk, so a failed install is
    /// offered again on the next check.
    fn installed(&self, _digest: &str) {}
}

/// Fetch, retrying transient failures up to `max_attempts` times.
pub async fn fetch_with_retries(
    distributor: &dyn DataDistributor,
    request: &UpdateRequest,
    max_attempts: u32,
) -> Result<UpdateCheck, DistributorError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match distributor.fetch(request).await {
            Ok(check) => return Ok(check),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(DistributorError::TooManyRetries { attempts: attempt, last: Box::new(e) });
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "update fetch failed, retrying");
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            }
        }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Atomically replace `path` with `bytes`.
///
/// Returns `false`, writing nothing, when the file already holds exactly
/// these bytes.
pub fn install_data_file(path: &Path, bytes: &[u8]) -> Result<bool, DistributorError> {
    use std::io::Write;

    let io_err = |source: std::io::Error| DistributorError::Io { path: path.to_path_buf(), source };

    match std::fs::read(path) {
        Ok(existing) if digest(&existing) == digest(bytes) => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(true)
}

/// Serves updates from a file mirrored onto a local or mounted path.
pub struct MirrorDistributor {
    source: PathBuf,
    installed_digest: Mutex<Option<String>>,
}

impl MirrorDistributor {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), installed_digest: Mutex::new(None) }
    }

    /// Build from a `file://` URL. Other schemes yield `None`.
    pub fn from_url(url: &str) -> Option<Self> {
        url.strip_prefix("file://")
            .filter(|p| !p.is_empty())
            .map(Self::new)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[async_trait]
impl DataDistributor for MirrorDistributor {
    async fn fetch(&self, request: &UpdateRequest) -> Result<UpdateCheck, DistributorError> {
        let source = request
            .url
            .as_deref()
            .and_then(|u| u.strip_prefix("file://"))
            .map(PathBuf::from)
            .unwrap_or_else(|| self.source.clone());

        let bytes = tokio::fs::read(&source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DistributorError::Unavailable(format!("mirror file {} not found", source.display()))
            }
            _ => DistributorError::Io { path: source.clone(), source: e },
        })?;

        if self.installed_digest.lock().as_deref() == Some(digest(&bytes).as_str()) {
            return Ok(UpdateCheck::NotModified);
        }
        Ok(UpdateCheck::Updated(bytes))
    }

    fn installed(&self, digest: &str) {
        *self.installed_digest.lock() = Some(digest.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        rejected: bool,
    }

    #[async_trait]
    impl DataDistributor for Flaky {
        async fn fetch(&self, _: &UpdateRequest) -> Result<UpdateCheck, DistributorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.rejected {
                return Err(DistributorError::Rejected("license key invalid".into()));
            }
            if call <= self.failures {
                return Err(DistributorError::Unavailable("connection reset".into()));
            }
            Ok(UpdateCheck::NotModified)
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let flaky = Flaky { failures: 2, calls: AtomicU32::new(0), rejected: false };
        let check = fetch_with_retries(&flaky, &UpdateRequest::default(), 3).await.unwrap();
        assert_eq!(check, UpdateCheck::NotModified);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let flaky = Flaky { failures: 5, calls: AtomicU32::new(0), rejected: false };
        let err = fetch_with_retries(&flaky, &UpdateRequest::default(), 2).await.unwrap_err();
        assert!(matches!(err, DistributorError::TooManyRetries { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let flaky = Flaky { failures: 0, calls: AtomicU32::new(0), rejected: true };
        let err = fetch_with_retries(&flaky, &UpdateRequest::default(), 5).await.unwrap_err();
        assert!(matches!(err, DistributorError::Rejected(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mirror_reports_not_modified_for_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let mirror_file = dir.path().join("mirror.ipi");
        std::fs::write(&mirror_file, b"v1").unwrap();

        let mirror = MirrorDistributor::from_url(&format!("file://{}", mirror_file.display())).unwrap();
        let request = UpdateRequest::default();
        assert_eq!(mirror.fetch(&request).await.unwrap(), UpdateCheck::Updated(b"v1".to_vec()));
        mirror.installed(&digest(b"v1"));
        assert_eq!(mirror.fetch(&request).await.unwrap(), UpdateCheck::NotModified);

        std::fs::write(&mirror_file, b"v2").unwrap();
        assert_eq!(mirror.fetch(&request).await.unwrap(), UpdateCheck::Updated(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_mirror_offers_update_until_installed() {
        let dir = tempfile::tempdir().unwrap();
        let mirror_file = dir.path().join("mirror.ipi");
        std::fs::write(&mirror_file, b"v1").unwrap();

        let mirror = MirrorDistributor::new(&mirror_file);
        let request = UpdateRequest::default();
        for _ in 0..3 {
            assert_eq!(mirror.fetch(&request).await.unwrap(), UpdateCheck::Updated(b"v1".to_vec()));
        }
        mirror.installed(&digest(b"v0"));
        assert_eq!(mirror.fetch(&request).await.unwrap(), UpdateCheck::Updated(b"v1".to_vec()));
    }

    #[test]
    fn test_from_url_requires_file_scheme() {
        assert!(MirrorDistributor::from_url("https://example.com/data").is_none());
        assert!(MirrorDistributor::from_url("file://").is_none());
    }

    #[test]
    fn test_install_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.ipi");
        assert!(install_data_file(&path, b"one").unwrap());
        assert!(!install_data_file(&path, b"one").unwrap());
        assert!(install_data_file(&path, b"two").unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }
}
