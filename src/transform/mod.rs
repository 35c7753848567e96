//! Image transformation.
//!
//! - [`plan`] resolves a spec against the source size into concrete steps
//! - [`engine`] holds the primitive pixel operations
//! - [`pipeline`] runs a plan on an engine
//! - [`service`] wires admission, cache and rendering into request handling

pub mod encoder;
pub mod engine;
pub mod pipeline;
pub mod plan;
pub mod service;
pub mod watermark;

pub use encoder::{
    clamp_quality, Encoding, EncodingPolicy, ImageFormat, MAX_QUALITY, MIN_QUALITY,
    UPLOAD_JPEG_QUALITY,
};
pub use engine::{
    check_size, ImageEngine, RasterEngine, SizingPolicy, MAX_DIMENSION, MAX_PIXELS, WHITE,
};
pub use pipeline::{prepare_upload, render, PreparedUpload, WatermarkSource, MAX_UPLOAD_PIXELS};
pub use plan::{plan, FillStep, ThumbnailStep, TransformPlan};
pub use service::{random_name, ImageService, RenderedImage, UploadLimits, UploadedInfo};
pub use watermark::{apply_watermark, placement};
