//! # imgserv
//!
//! An image transformation server for images stored in S3-compatible object
//! storage.
//!
//! Clients ask for a derived image (resized, cropped, watermarked,
//! re-encoded) by putting a compact operation string in the URL:
//!
//! ```text
//! /r300x200,q85,wlogo.png-se-50/photos/cat.jpg
//!  └────── operations ───────┘ └─── key ────┘
//! ```
//!
//! Source images are fetched once from the origin and kept in a
//! content-addressed disk cache, including negative entries for missing
//! keys. Two admission gates shield the origin and the CPU from overload.
//!
//! ## Architecture
//!
//! - [`params`] - Operation language parser and presets
//! - [`server`] - Axum HTTP layer and URL signatures
//! - [`admission`] - Accept and processing gates
//! - [`cache`] - Content-addressed disk cache in front of the origin
//! - [`io`] - Origin store trait, S3 origin and the buffer pool
//! - [`transform`] - Resize/crop planning, image engine and encoding
//! - [`stats`] - Process-wide counters
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgserv::{
//!     create_router, AdmissionController, BufferPool, CachedStore, ImageService,
//!     OperationParser, Presets, RouterConfig, S3OriginStore, SignatureVerifier, Stats,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = imgserv::create_s3_client(None, "us-east-1").await;
//!     let origin = S3OriginStore::new(client, "images");
//!     let cache = CachedStore::new(origin, "/var/cache/imgserv", BufferPool::new())?;
//!
//!     let service = ImageService::new(
//!         cache,
//!         OperationParser::new(Arc::new(Presets::empty())),
//!         SignatureVerifier::None,
//!         AdmissionController::new(100, 2, None, Arc::new(Stats::new())),
//!     );
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod params;
pub mod server;
pub mod stats;
pub mod transform;

// Re-export commonly used types
pub use admission::{AcceptGuard, AdmissionController};
pub use cache::CachedStore;
pub use config::{Cli, Command, OutputFormat, ServeConfig, SignConfig, SignatureMethod};
pub use error::{IoError, ParseError, PresetError, ServeError, TransformError};
pub use io::{create_s3_client, BufferPool, OriginStore, S3OriginStore, SourceBuffer};
pub use params::{OperationParser, Presets, TransformSpec, WatermarkSpec};
pub use server::{create_router, AppState, AuthError, RouterConfig, SignatureVerifier};
pub use stats::{Stats, StatsSnapshot};
pub use transform::{
    EncodingPolicy, ImageEngine, ImageService, RasterEngine, RenderedImage, UploadedInfo,
};
