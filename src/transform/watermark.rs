use super::engine::{check_size, ImageEngine, SizingPolicy};
use crate::error::TransformError;
use crate::params::{Gravity, Position, WatermarkSpec};

/// Top-left corner of an `overlay`-sized watermark on a `base`-sized image.
///
/// `Coords` anchors to the bottom-right corner minus the offset, with the
/// offset scaled by the pixel ratio. Results may be negative when the
/// watermark is larger than the image; compositing clips.
pub fn placement(
    position: Position,
    base: (u32, u32),
    overlay: (u32, u32),
    offset: (i32, i32),
    pixel_ratio: f64,
) -> (i64, i64) {
    let (bw, bh) = (base.0 as i64, base.1 as i64);
    let (ow, oh) = (overlay.0 as i64, overlay.1 as i64);

    let center_x = bw / 2 - ow / 2;
    let center_y = bh / 2 - oh / 2;
    let right = bw - ow;
    let bottom = bh - oh;

    match position {
        Position::North => (center_x, 0),
        Position::NorthEast => (right, 0),
        Position::East => (right, center_y),
        Position::SouthEast => (right, bottom),
        Position::South => (center_x, bottom),
        Position::SouthWest => (0, bottom),
        Position::West => (0, center_y),
        Position::NorthWest => (0, 0),
        Position::Center => (center_x, center_y),
        Position::Coords => (
            right - (offset.0 as f64 * pixel_ratio) as i64,
            bottom - (offset.1 as f64 * pixel_ratio) as i64,
        ),
    }
}

/// Scale a decoded watermark and composite it onto `base`.
pub fn apply_watermark<E: ImageEngine>(
    base: &mut E,
    mut overlay: E,
    wm: &WatermarkSpec,
    pixel_ratio: f64,
) -> Result<(), TransformError> {
    if pixel_ratio > 1.0 {
        let width = (overlay.width() as f64 * pixel_ratio) as u64;
        let height = (overlay.height() as f64 * pixel_ratio) as u64;
        check_size(width, height)?;
        overlay.thumbnail(width as u32, height as u32, Gravity::None, SizingPolicy::Both)?;
    }

    if wm.size < 100 {
        overlay.resize_by_ratio(wm.size as f64 / 100.0)?;
    }

    let (x, y) = placement(
        wm.position,
        (base.width(), base.height()),
        (overlay.width(), overlay.height()),
        (wm.offset_x, wm.offset_y),
        pixel_ratio,
    );
    base.composite(&overlay, x, y)
}
