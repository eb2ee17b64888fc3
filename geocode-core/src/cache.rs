//! Flat on-disk response cache.
//!
//! One file per request URI, named after the SHA-256 of that URI. Entries
//! hold the response body byte for byte and never expire.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

use crate::model::{CacheKey, RawResponse};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: Option<PathBuf>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    /// A store that always misses and never writes.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn file_name(key: &CacheKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }

    /// Where `key` lives, creating the cache directory if needed.
    ///
    /// `None` when caching is disabled or the directory cannot be created.
    pub async fn path_for(&self, key: &CacheKey) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;

        if let Err(err) = fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %err, "cache directory unavailable");
            return None;
        }

        Some(dir.join(Self::file_name(key)))
    }

    /// Cached body for `path`. Any read failure is a miss.
    pub async fn lookup(&self, path: &Path) -> Option<RawResponse> {
        match fs::read(path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), "cache hit");
                Some(RawResponse::from(bytes))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache miss");
                None
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "unreadable cache entry, treating as miss");
                None
            }
        }
    }

    /// Best-effort write of `raw` to `path`. Failures are logged and dropped.
    pub async fn store(&self, path: &Path, raw: &RawResponse) {
        if let Err(err) = write_atomically(path, raw.as_bytes()).await {
            warn!(path = %path.display(), error = %err, "failed to write cache entry");
        } else {
            debug!(path = %path.display(), bytes = raw.as_bytes().len(), "cached response");
        }
    }

    /// Remove every cached entry. Returns how many files were deleted.
    pub async fn clear(&self) -> io::Result<usize> {
        let Some(dir) = &self.dir else {
            return Ok(0);
        };

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Write to a unique sibling, then rename over the target so readers never
/// see a partially written entry.
async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no file name"))?;

    let tmp = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(err) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }

    match fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp).await;
            Err(err)
        }
    }
}
