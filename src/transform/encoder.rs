//! Output format negotiation and quality correction.
//!
//! The output format is fixed by configuration (`jpeg`, `webp`) or chosen per
//! request from the `Accept` header (`vary`). Each format carries a quality
//! correction that is added to the requested quality before clamping.

use crate::config::OutputFormat;

use super::engine::ImageEngine;
use crate::error::TransformError;

/// Minimum allowed encoder quality.
pub const MIN_QUALITY: u8 = 1;

/// Maximum allowed encoder quality.
pub const MAX_QUALITY: u8 = 100;

/// Quality used when re-encoding uploads.
pub const UPLOAD_JPEG_QUALITY: u8 = 95;

/// Concrete encoded format of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Format chosen for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub format: ImageFormat,
    /// Response depends on the `Accept` header
    pub vary: bool,
}

/// Format policy plus per-format quality corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingPolicy {
    pub output: OutputFormat,
    pub jpeg_correction: i32,
    pub webp_correction: i32,
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            output: OutputFormat::Vary,
            jpeg_correction: 0,
            webp_correction: -2,
        }
    }
}

impl EncodingPolicy {
    /// Pick the output format for a request with the given `Accept` header.
    pub fn negotiate(&self, accept: Option<&str>) -> Encoding {
        match self.output {
            OutputFormat::Jpeg => Encoding {
                format: ImageFormat::Jpeg,
                vary: false,
            },
            OutputFormat::Webp => Encoding {
                format: ImageFormat::Webp,
                vary: false,
            },
            OutputFormat::Vary => {
                let webp = accept.is_some_and(|a| a.contains("webp"));
                Encoding {
                    format: if webp {
                        ImageFormat::Webp
                    } else {
                        ImageFormat::Jpeg
                    },
                    vary: true,
                }
            }
        }
    }

    /// Requested quality with the format's correction applied.
    pub fn quality(&self, format: ImageFormat, requested: u8) -> u8 {
        let correction = match format {
            ImageFormat::Jpeg => self.jpeg_correction,
            ImageFormat::Webp => self.webp_correction,
        };
        clamp_quality(requested as i32 + correction)
    }
}

/// Clamp a quality value into the valid encoder range.
pub fn clamp_quality(quality: i32) -> u8 {
    quality.clamp(MIN_QUALITY as i32, MAX_QUALITY as i32) as u8
}

/// Encode `image` in `format` at an already-corrected quality.
pub fn export<E: ImageEngine>(
    image: &E,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    match format {
        ImageFormat::Jpeg => image.export_jpeg(quality),
        ImageFormat::Webp => image.export_webp(quality),
    }
}
