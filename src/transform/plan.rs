//! Resize/crop decision tree.
//!
//! [`plan`] resolves a [`TransformSpec`] against the real source dimensions
//! into the concrete primitive steps to run. It is pure: no pixels, no I/O.
//!
//! ```text
//! crop? ──► clamp to source ──► scale target by pixel ratio
//!                                      │
//!                            resize? ──┴── no ──► encode
//!                                      │
//!                          target beyond size limits ──► error
//!                                      │
//!                          mode crop: gravity defaults to center;
//!                          source smaller than target?
//!                             ratio > 1 or upscale ──► fit both ways
//!                             otherwise ──► demote to fill, clamp target
//!                                      │
//!                                 thumbnail
//!                                      │
//!                          fill? ──► flatten, center on white canvas
//!                                      │
//!                                 watermarks ──► encode
//! ```

use image::Rgb;

use super::engine::{check_size, SizingPolicy, WHITE};
use crate::error::TransformError;
use crate::params::{CropSpec, Gravity, Mode, TransformSpec};

/// Thumbnail call to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailStep {
    pub width: u32,
    pub height: u32,
    pub gravity: Gravity,
    pub policy: SizingPolicy,
}

/// Canvas to center the thumbnail on.
///
/// A dimension of 0 takes the thumbnail's own size on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillStep {
    pub width: u32,
    pub height: u32,
    pub background: Rgb<u8>,
}

/// Concrete steps for one request, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    /// Crop rectangle, already clamped to the source
    pub crop: Option<CropSpec>,
    pub thumbnail: Option<ThumbnailStep>,
    pub fill: Option<FillStep>,
    /// Mode after fallback resolution
    pub mode: Mode,
    /// Watermarks are composited only after a resize
    pub apply_watermarks: bool,
    pub pixel_ratio: f64,
}

/// Resolve `spec` against a `src_width` x `src_height` source.
pub fn plan(
    spec: &TransformSpec,
    src_width: u32,
    src_height: u32,
) -> Result<TransformPlan, TransformError> {
    let mut crop = None;
    let (mut width, mut height) = (src_width, src_height);

    if let Some(rect) = spec.crop {
        if rect.x >= src_width || rect.y >= src_height {
            return Err(TransformError::CropOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: src_width,
                height: src_height,
            });
        }
        let clamped = CropSpec {
            width: rect.width.min(src_width - rect.x),
            height: rect.height.min(src_height - rect.y),
            ..rect
        };
        width = clamped.width;
        height = clamped.height;
        crop = Some(clamped);
    }

    let ratio = spec.pixel_ratio;
    let (scaled_w, scaled_h) = if ratio > 1.0 {
        (
            (spec.width as f64 * ratio) as u64,
            (spec.height as f64 * ratio) as u64,
        )
    } else {
        (spec.width as u64, spec.height as u64)
    };

    if !spec.resize {
        return Ok(TransformPlan {
            crop,
            thumbnail: None,
            fill: None,
            mode: spec.mode,
            apply_watermarks: false,
            pixel_ratio: ratio,
        });
    }

    // Also bounds the fill canvas, which takes the scaled target size
    check_size(scaled_w, scaled_h)?;
    let (mut target_w, mut target_h) = (scaled_w as u32, scaled_h as u32);
    let (final_w, final_h) = (target_w, target_h);
    let mut mode = spec.mode;
    let mut gravity = spec.gravity;
    let mut policy = SizingPolicy::Down;

    if mode == Mode::Crop {
        if gravity.is_none() {
            gravity = Gravity::Center;
        }

        if width < target_w || height < target_h {
            if ratio > 1.0 || spec.upscale {
                policy = SizingPolicy::Both;
            } else {
                // Never upscale unless asked: pad instead
                mode = Mode::Fill;
                target_w = target_w.min(width);
                target_h = target_h.min(height);
            }
        }
    }

    let fill = (mode == Mode::Fill).then_some(FillStep {
        width: final_w,
        height: final_h,
        background: WHITE,
    });

    Ok(TransformPlan {
        crop,
        thumbnail: Some(ThumbnailStep {
            width: target_w,
            height: target_h,
            gravity,
            policy,
        }),
        fill,
        mode,
        apply_watermarks: true,
        pixel_ratio: ratio,
    })
}
