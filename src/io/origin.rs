use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Durable object storage holding the source images.
///
/// The origin is the source of truth behind the disk cache. Implementations
/// must be thread-safe; a single instance is shared by all requests.
#[async_trait]
pub trait OriginStore: Send + Sync + 'static {
    /// Read the whole object into `buf`, replacing its contents.
    ///
    /// Returns `IoError::NotFound` when the store confirms the key does not
    /// exist. Any other error means the answer is unknown.
    async fn get(&self, key: &str, buf: &mut Vec<u8>) -> Result<(), IoError>;

    /// Create or replace an object.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError>;

    /// Remove an object. Returns `IoError::NotFound` if it did not exist.
    async fn delete(&self, key: &str) -> Result<(), IoError>;

    /// Identity of the key space (bucket name for S3).
    ///
    /// Folded into cache hashes so two stores never collide on disk.
    fn namespace(&self) -> &str;
}
