//! Plan execution against an [`ImageEngine`].
//!
//! Everything here is synchronous and CPU-bound; callers run it on a
//! blocking worker.

use super::encoder::{export, ImageFormat, UPLOAD_JPEG_QUALITY};
use super::engine::{ImageEngine, SizingPolicy, MAX_PIXELS};
use super::plan::{plan, FillStep};
use super::watermark::apply_watermark;
use crate::error::TransformError;
use crate::params::{Gravity, TransformSpec, WatermarkSpec};

/// Uploads with a larger pixel area are refused.
pub const MAX_UPLOAD_PIXELS: u64 = MAX_PIXELS;

/// A watermark spec together with the encoded watermark image.
#[derive(Debug, Clone, Copy)]
pub struct WatermarkSource<'a> {
    pub spec: &'a WatermarkSpec,
    pub data: &'a [u8],
}

/// Decode `source`, apply `spec`, and encode the result.
///
/// `watermarks` are composited in order when the plan applies them.
pub fn render<E: ImageEngine>(
    source: &[u8],
    spec: &TransformSpec,
    watermarks: &[WatermarkSource<'_>],
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let mut image = E::load(source)?;
    let plan = plan(spec, image.width(), image.height())?;

    if let Some(rect) = plan.crop {
        image.crop(rect.x, rect.y, rect.width, rect.height)?;
    }

    if let Some(step) = plan.thumbnail {
        image.thumbnail(step.width, step.height, step.gravity, step.policy)?;
    }

    if let Some(fill) = plan.fill {
        fill_canvas(&mut image, fill)?;
    }

    if plan.apply_watermarks {
        for wm in watermarks {
            composite_watermark(&mut image, wm, plan.pixel_ratio)?;
        }
    }

    image.strip();
    export(&image, format, quality)
}

fn fill_canvas<E: ImageEngine>(image: &mut E, fill: FillStep) -> Result<(), TransformError> {
    let (w, h) = (image.width(), image.height());
    let canvas_w = if fill.width == 0 { w } else { fill.width };
    let canvas_h = if fill.height == 0 { h } else { fill.height };

    image.flatten(fill.background);
    let x = (canvas_w as i64 - w as i64) / 2;
    let y = (canvas_h as i64 - h as i64) / 2;
    image.embed(x, y, canvas_w, canvas_h, fill.background)
}

fn composite_watermark<E: ImageEngine>(
    image: &mut E,
    wm: &WatermarkSource<'_>,
    pixel_ratio: f64,
) -> Result<(), TransformError> {
    let wrap = |e: TransformError| TransformError::Watermark {
        path: wm.spec.path.clone(),
        message: e.to_string(),
    };
    let overlay = E::load(wm.data).map_err(wrap)?;
    apply_watermark(image, overlay, wm.spec, pixel_ratio).map_err(wrap)
}

/// A normalized upload, ready to be stored.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode an upload, bound its size and re-encode it as JPEG.
///
/// When both `max_width` and `max_height` are non-zero the image is shrunk
/// to fit inside them.
pub fn prepare_upload<E: ImageEngine>(
    data: &[u8],
    max_width: u32,
    max_height: u32,
) -> Result<PreparedUpload, TransformError> {
    let mut image = E::load(data)?;
    let (width, height) = (image.width(), image.height());
    if width as u64 * height as u64 > MAX_UPLOAD_PIXELS {
        return Err(TransformError::TooLarge { width, height });
    }

    image.strip();

    if max_width > 0 && max_height > 0 && (width > max_width || height > max_height) {
        image.thumbnail(max_width, max_height, Gravity::None, SizingPolicy::Down)?;
    }

    Ok(PreparedUpload {
        data: image.export_jpeg(UPLOAD_JPEG_QUALITY)?,
        width: image.width(),
        height: image.height(),
    })
}
