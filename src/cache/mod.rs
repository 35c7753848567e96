mod disk;

pub use disk::{CachedStore, NEGATIVE_SENTINEL};
