//! Content-addressed disk cache in front of the origin store.
//!
//! ```text
//! load(key)
//!    │
//!    ▼
//! <root>/<hh>/<md5(namespace + key)>
//!    │
//!    ├─ file holds "404" ──────► NotFound (origin not contacted)
//!    ├─ file holds bytes ──────► bytes (access time refreshed)
//!    └─ no file
//!         │
//!         ▼
//!      origin.get(key)
//!         ├─ bytes ────► write entry, return bytes
//!         ├─ NotFound ─► write "404" entry, return NotFound
//!         └─ error ────► propagate, nothing cached
//! ```
//!
//! Entries become visible only through a rename from a synced temp file in
//! the same directory, so a crash never exposes a partial entry. Concurrent
//! misses on one key may both fetch and both write; the last rename wins.
//! Nothing here evicts entries: access times are refreshed for external
//! reapers.

use std::fs::FileTimes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::IoError;
use crate::io::{BufferPool, OriginStore, SourceBuffer};

/// Payload of a negative entry: the origin confirmed the key is absent.
pub const NEGATIVE_SENTINEL: &[u8] = b"404";

/// Prefix of in-flight temp files inside shard directories.
const TEMP_PREFIX: &str = ".imgserv-";

/// Disk cache wrapping an [`OriginStore`].
pub struct CachedStore<O: OriginStore> {
    origin: O,
    root: PathBuf,
    pool: BufferPool,
}

impl<O: OriginStore> CachedStore<O> {
    /// Create a cache rooted at `root`, creating the directory if needed.
    pub fn new(origin: O, root: impl AsRef<Path>, pool: BufferPool) -> Result<Self, IoError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(IoError::Cache("empty cache path".to_string()));
        }

        std::fs::create_dir_all(root).map_err(|e| {
            IoError::Cache(format!(
                "failed to create cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = root.canonicalize().map_err(|e| {
            IoError::Cache(format!(
                "can't access cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { origin, root, pool })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// On-disk location of the entry for `key`.
    pub fn cache_path(&self, key: &str) -> PathBuf {
        let mut hasher = Md5::new();
        hasher.update(self.origin.namespace().as_bytes());
        hasher.update(key.as_bytes());
        let hashed = hex::encode(hasher.finalize());

        self.root.join(&hashed[..2]).join(hashed)
    }

    /// Load the bytes for `key`, from disk when possible.
    pub async fn load(&self, key: &str) -> Result<SourceBuffer, IoError> {
        let path = self.cache_path(key);
        let mut buf = self.pool.checkout();

        let hit = read_entry(&path, buf.as_mut_vec()).await.map_err(|e| {
            IoError::Cache(format!("failed to read {}: {}", path.display(), e))
        })?;

        if hit {
            if &buf[..] == NEGATIVE_SENTINEL {
                debug!(key = key, "Negative cache hit");
                return Err(IoError::NotFound(key.to_string()));
            }
            if buf.is_empty() {
                return Err(IoError::EmptyObject(key.to_string()));
            }
            debug!(key = key, size = buf.len(), "Cache hit");
            return Ok(buf);
        }

        debug!(key = key, "Cache miss, fetching from origin");
        match self.origin.get(key, buf.as_mut_vec()).await {
            Ok(()) => {}
            Err(IoError::NotFound(_)) => {
                self.write_best_effort(&path, NEGATIVE_SENTINEL).await;
                return Err(IoError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e),
        }

        if buf.is_empty() {
            return Err(IoError::EmptyObject(key.to_string()));
        }

        self.write_best_effort(&path, &buf).await;
        Ok(buf)
    }

    /// Store new bytes under `key` in the origin, then in the cache.
    ///
    /// A cache write failure is reported even though the origin copy exists.
    pub async fn store(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        self.origin.put(key, data.clone()).await?;

        let path = self.cache_path(key);
        write_atomic(&path, &data).await.map_err(|e| {
            IoError::Cache(format!("failed to write {}: {}", path.display(), e))
        })?;

        debug!(key = key, size = data.len(), "Stored object");
        Ok(())
    }

    /// Remove `key` from the origin and the cache.
    ///
    /// The local entry is removed even if the origin reports the key absent,
    /// so a stale entry cannot outlive its object.
    pub async fn delete(&self, key: &str) -> Result<(), IoError> {
        let origin_result = self.origin.delete(key).await;

        let path = self.cache_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(IoError::Cache(format!(
                    "failed to remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        origin_result.map_err(|e| match e {
            IoError::NotFound(_) => IoError::NotFound(key.to_string()),
            other => other,
        })
    }

    async fn write_best_effort(&self, path: &Path, data: &[u8]) {
        if let Err(e) = write_atomic(path, data).await {
            warn!(path = %path.display(), error = %e, "Failed to write cache entry");
        }
    }
}

/// Read a cache entry into `buf`. Returns `false` if there is no entry.
async fn read_entry(path: &Path, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    buf.clear();
    file.read_to_end(buf).await?;

    let file = file.into_std().await;
    let touched = tokio::task::spawn_blocking(move || {
        file.set_times(FileTimes::new().set_accessed(SystemTime::now()))
    })
    .await;
    match touched {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(path = %path.display(), error = %e, "Failed to refresh access time"),
        Err(e) => debug!(path = %path.display(), error = %e, "Access time update task failed"),
    }

    Ok(true)
}

/// Write `data` to `path` through a synced temp file and a rename.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "cache path has no parent"))?;
    tokio::fs::create_dir_all(dir).await?;

    // Same directory as the destination, so the rename never crosses devices
    let tmp = dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
