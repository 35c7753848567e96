mod origin;
mod pool;
mod s3_store;

pub use origin::OriginStore;
pub use pool::{
    BufferPool, SourceBuffer, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_POOLED,
    DEFAULT_MAX_RETAINED_CAPACITY,
};
pub use s3_store::{create_s3_client, S3OriginStore};
