//! Primitive pixel operations.
//!
//! The orchestration code in this crate never touches pixels directly; it
//! drives an [`ImageEngine`]. [`RasterEngine`] implements the engine on top
//! of the `image` crate, holding the working image as 8-bit RGBA.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageReader, Rgb, Rgba, RgbaImage};

use crate::error::TransformError;
use crate::params::Gravity;

/// Background used for fill padding and JPEG flattening.
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Largest width or height the engine allocates. WebP cannot go beyond it.
pub const MAX_DIMENSION: u64 = 16383;

/// Largest pixel area the engine allocates.
pub const MAX_PIXELS: u64 = 16000 * 16000;

/// Refuse a `width` x `height` raster beyond [`MAX_DIMENSION`] or [`MAX_PIXELS`].
pub fn check_size(width: u64, height: u64) -> Result<(), TransformError> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION || width * height > MAX_PIXELS {
        return Err(TransformError::SizeLimit { width, height });
    }
    Ok(())
}

/// `len * scale`, rounded, at least 1. Saturates instead of wrapping.
fn scaled(len: u32, scale: f64) -> u64 {
    ((len as f64 * scale).round() as u64).max(1)
}

/// Whether a thumbnail may enlarge the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingPolicy {
    /// Only ever shrink
    Down,
    /// Shrink or enlarge to reach the target
    Both,
}

/// Primitive image operations the transform pipeline is built from.
///
/// Every operation mutates the working image in place. Resources are
/// released on drop.
pub trait ImageEngine: Sized {
    /// Decode an image from encoded bytes.
    fn load(data: &[u8]) -> Result<Self, TransformError>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Cut out a rectangle. The rectangle must start inside the image.
    fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<(), TransformError>;

    /// Scale into a `width` x `height` box.
    ///
    /// A dimension of 0 leaves that axis unconstrained. With
    /// `Gravity::None` the image fits inside the box; otherwise it covers
    /// the box and the overflow is cut, keeping the part selected by the
    /// gravity.
    fn thumbnail(
        &mut self,
        width: u32,
        height: u32,
        gravity: Gravity,
        policy: SizingPolicy,
    ) -> Result<(), TransformError>;

    /// Blend away transparency against a solid background.
    fn flatten(&mut self, background: Rgb<u8>);

    /// Place the image at (`x`, `y`) on a new `width` x `height` canvas.
    fn embed(
        &mut self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        background: Rgb<u8>,
    ) -> Result<(), TransformError>;

    /// Alpha-blend `overlay` onto this image with its top-left at (`x`, `y`).
    fn composite(&mut self, overlay: &Self, x: i64, y: i64) -> Result<(), TransformError>;

    /// Scale both axes by `ratio`.
    fn resize_by_ratio(&mut self, ratio: f64) -> Result<(), TransformError>;

    /// Drop metadata (EXIF, ICC, XMP) before re-encoding.
    fn strip(&mut self);

    fn export_jpeg(&self, quality: u8) -> Result<Vec<u8>, TransformError>;

    fn export_webp(&self, quality: u8) -> Result<Vec<u8>, TransformError>;
}

// =============================================================================
// Raster Engine
// =============================================================================

/// [`ImageEngine`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct RasterEngine {
    image: RgbaImage,
}

impl RasterEngine {
    /// Wrap an already decoded image.
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    fn engine_error(op: &'static str, message: impl Into<String>) -> TransformError {
        TransformError::Engine {
            op,
            message: message.into(),
        }
    }

    fn resize_exact(&mut self, width: u32, height: u32) {
        if (width, height) != self.image.dimensions() {
            self.image = imageops::resize(&self.image, width, height, FilterType::Lanczos3);
        }
    }

    /// Offset of a `window`-long span along one axis, for cover crops.
    fn crop_offset(&self, gravity: Gravity, window: (u32, u32)) -> (u32, u32) {
        let (w, h) = self.image.dimensions();
        match gravity {
            Gravity::Smart => (
                best_window(&column_energy(&self.image), window.0),
                best_window(&row_energy(&self.image), window.1),
            ),
            _ => ((w - window.0) / 2, (h - window.1) / 2),
        }
    }
}

impl ImageEngine for RasterEngine {
    fn load(data: &[u8]) -> Result<Self, TransformError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(decode_error)?;
        let mut decoder = reader.into_decoder().map_err(decode_error)?;
        let orientation = decoder.orientation().map_err(decode_error)?;

        let mut image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
        image.apply_orientation(orientation);

        Ok(Self {
            image: image.into_rgba8(),
        })
    }

    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<(), TransformError> {
        if x >= self.width() || y >= self.height() || width == 0 || height == 0 {
            return Err(Self::engine_error(
                "crop",
                format!(
                    "rectangle {}x{}+{}+{} outside {}x{} image",
                    width,
                    height,
                    x,
                    y,
                    self.width(),
                    self.height()
                ),
            ));
        }
        self.image = imageops::crop_imm(&self.image, x, y, width, height).to_image();
        Ok(())
    }

    fn thumbnail(
        &mut self,
        width: u32,
        height: u32,
        gravity: Gravity,
        policy: SizingPolicy,
    ) -> Result<(), TransformError> {
        let (src_w, src_h) = self.image.dimensions();
        if width == 0 && height == 0 {
            return Ok(());
        }

        let scale_x = width as f64 / src_w as f64;
        let scale_y = height as f64 / src_h as f64;
        let cover = !gravity.is_none() && width > 0 && height > 0;

        let mut scale = match (width, height) {
            (0, _) => scale_y,
            (_, 0) => scale_x,
            _ if cover => scale_x.max(scale_y),
            _ => scale_x.min(scale_y),
        };
        if policy == SizingPolicy::Down {
            scale = scale.min(1.0);
        }

        let (new_w, new_h) = (scaled(src_w, scale), scaled(src_h, scale));
        check_size(new_w, new_h)?;
        let (new_w, new_h) = (new_w as u32, new_h as u32);
        self.resize_exact(new_w, new_h);

        if cover {
            let window = (width.min(new_w), height.min(new_h));
            if window != (new_w, new_h) {
                let (x, y) = self.crop_offset(gravity, window);
                self.image = imageops::crop_imm(&self.image, x, y, window.0, window.1).to_image();
            }
        }
        Ok(())
    }

    fn flatten(&mut self, background: Rgb<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = blend_over(*pixel, background);
        }
    }

    fn embed(
        &mut self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        background: Rgb<u8>,
    ) -> Result<(), TransformError> {
        if width == 0 || height == 0 {
            return Err(Self::engine_error(
                "embed",
                format!("empty canvas {}x{}", width, height),
            ));
        }
        check_size(width as u64, height as u64)?;
        let [r, g, b] = background.0;
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
        imageops::overlay(&mut canvas, &self.image, x, y);
        self.image = canvas;
        Ok(())
    }

    fn composite(&mut self, overlay: &Self, x: i64, y: i64) -> Result<(), TransformError> {
        imageops::overlay(&mut self.image, &overlay.image, x, y);
        Ok(())
    }

    fn resize_by_ratio(&mut self, ratio: f64) -> Result<(), TransformError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(Self::engine_error(
                "resize",
                format!("invalid ratio {}", ratio),
            ));
        }
        let (new_w, new_h) = (scaled(self.width(), ratio), scaled(self.height(), ratio));
        check_size(new_w, new_h)?;
        self.resize_exact(new_w as u32, new_h as u32);
        Ok(())
    }

    fn strip(&mut self) {
        // Decoded pixels carry no metadata and the encoders write none.
    }

    fn export_jpeg(&self, quality: u8) -> Result<Vec<u8>, TransformError> {
        let (w, h) = self.image.dimensions();
        let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
        for pixel in self.image.pixels() {
            let Rgba([r, g, b, _]) = blend_over(*pixel, WHITE);
            rgb.extend_from_slice(&[r, g, b]);
        }

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
        encoder
            .encode(&rgb, w, h, ExtendedColorType::Rgb8)
            .map_err(|e| TransformError::Encode {
                message: e.to_string(),
            })?;
        Ok(output)
    }

    fn export_webp(&self, quality: u8) -> Result<Vec<u8>, TransformError> {
        let (w, h) = self.image.dimensions();
        let encoded = webp::Encoder::from_rgba(self.image.as_raw(), w, h)
            .encode_simple(false, quality.clamp(1, 100) as f32)
            .map_err(|e| TransformError::Encode {
                message: format!("webp: {:?}", e),
            })?;
        Ok(encoded.to_vec())
    }
}

/// Alpha-blend a pixel over an opaque background.
fn blend_over(pixel: Rgba<u8>, background: Rgb<u8>) -> Rgba<u8> {
    let Rgba([r, g, b, a]) = pixel;
    if a == 255 {
        return pixel;
    }
    let alpha = a as u32;
    let mix = |fg: u8, back: u8| {
        ((fg as u32 * alpha + back as u32 * (255 - alpha) + 127) / 255) as u8
    };
    let [br, bg, bb] = background.0;
    Rgba([mix(r, br), mix(g, bg), mix(b, bb), 255])
}

fn decode_error(e: impl std::fmt::Display) -> TransformError {
    TransformError::Decode {
        message: e.to_string(),
    }
}

// =============================================================================
// Smart crop
// =============================================================================

fn luma(p: &Rgba<u8>) -> i32 {
    let Rgba([r, g, b, _]) = *p;
    (r as i32 * 299 + g as i32 * 587 + b as i32 * 114) / 1000
}

/// Sum of horizontal gradient magnitude per column.
fn column_energy(image: &RgbaImage) -> Vec<u64> {
    let (w, h) = image.dimensions();
    let mut energy = vec![0u64; w as usize];
    for y in 0..h {
        for x in 1..w {
            let d = luma(image.get_pixel(x, y)) - luma(image.get_pixel(x - 1, y));
            energy[x as usize] += d.unsigned_abs() as u64;
        }
    }
    energy
}

/// Sum of vertical gradient magnitude per row.
fn row_energy(image: &RgbaImage) -> Vec<u64> {
    let (w, h) = image.dimensions();
    let mut energy = vec![0u64; h as usize];
    for y in 1..h {
        for x in 0..w {
            let d = luma(image.get_pixel(x, y)) - luma(image.get_pixel(x, y - 1));
            energy[y as usize] += d.unsigned_abs() as u64;
        }
    }
    energy
}

/// Start of the `window`-long span with the most energy. Ties go to the
/// earliest span.
fn best_window(energy: &[u64], window: u32) -> u32 {
    let window = window as usize;
    if window >= energy.len() {
        return 0;
    }

    let mut sum: u64 = energy[..window].iter().sum();
    let mut best = (sum, 0usize);
    for start in 1..=energy.len() - window {
        sum = sum + energy[start + window - 1] - energy[start - 1];
        if sum > best.0 {
            best = (sum, start);
        }
    }
    best.1 as u32
}
