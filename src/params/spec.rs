use serde::{Deserialize, Serialize};

/// Default output quality when no `q` token is given.
pub const DEFAULT_QUALITY: u8 = 80;

/// Default watermark size, in percent of its natural size.
pub const DEFAULT_WATERMARK_SIZE: u8 = 100;

/// How the target box is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fit inside the target box, keeping aspect ratio
    #[default]
    #[serde(alias = "")]
    Contain,
    /// Fit inside, then pad to exactly the target box
    Fill,
    /// Cover the target box and cut the overflow
    Crop,
}

/// Which part of the image survives a cover-crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    #[default]
    #[serde(alias = "")]
    None,
    Center,
    Smart,
}

impl Gravity {
    pub fn is_none(&self) -> bool {
        matches!(self, Gravity::None)
    }
}

/// Watermark anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "n")]
    North,
    #[serde(rename = "ne")]
    NorthEast,
    #[serde(rename = "e")]
    East,
    #[default]
    #[serde(rename = "se")]
    SouthEast,
    #[serde(rename = "s")]
    South,
    #[serde(rename = "sw")]
    SouthWest,
    #[serde(rename = "w")]
    West,
    #[serde(rename = "nw")]
    NorthWest,
    #[serde(rename = "c", alias = "center")]
    Center,
    /// Bottom-right corner minus an explicit offset
    #[serde(rename = "coords")]
    Coords,
}

impl Position {
    /// Look up a compass code as used in the `w` token.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "n" => Some(Position::North),
            "ne" => Some(Position::NorthEast),
            "e" => Some(Position::East),
            "se" => Some(Position::SouthEast),
            "s" => Some(Position::South),
            "sw" => Some(Position::SouthWest),
            "w" => Some(Position::West),
            "nw" => Some(Position::NorthWest),
            "c" => Some(Position::Center),
            _ => None,
        }
    }
}

/// A watermark to composite after resizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    /// Origin key of the watermark image
    pub path: String,

    #[serde(default)]
    pub position: Position,

    /// Horizontal distance from the right edge, for `Position::Coords`
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset_x: i32,

    /// Vertical distance from the bottom edge, for `Position::Coords`
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset_y: i32,

    /// Percent of the natural size, 1-100
    #[serde(default = "default_watermark_size")]
    pub size: u8,
}

impl WatermarkSpec {
    /// Watermark anchored at `position` with natural size.
    pub fn new(path: impl Into<String>, position: Position) -> Self {
        Self {
            path: path.into(),
            position,
            offset_x: 0,
            offset_y: 0,
            size: DEFAULT_WATERMARK_SIZE,
        }
    }
}

/// Absolute pixel rectangle in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSpec {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Parsed and validated intent for one request.
///
/// Serializing this struct with `serde_json` yields its canonical JSON form:
/// fields holding their neutral value (no upscale, no crop, no gravity, a
/// pixel ratio of 1, no watermarks) are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    /// A size directive was present
    pub resize: bool,
    pub mode: Mode,
    /// Target width, 0 means unconstrained
    pub width: u32,
    /// Target height, 0 means unconstrained
    pub height: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub upscale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropSpec>,
    #[serde(skip_serializing_if = "Gravity::is_none")]
    pub gravity: Gravity,
    pub quality: u8,
    #[serde(skip_serializing_if = "is_unit_ratio")]
    pub pixel_ratio: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub watermarks: Vec<WatermarkSpec>,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            resize: false,
            mode: Mode::Contain,
            width: 0,
            height: 0,
            upscale: false,
            crop: None,
            gravity: Gravity::None,
            quality: DEFAULT_QUALITY,
            pixel_ratio: 1.0,
            watermarks: Vec::new(),
        }
    }
}

impl TransformSpec {
    /// Check value ranges the parser enforces on URL input.
    ///
    /// Presets are deserialized rather than parsed, so they go through this
    /// check once at load time.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.quality) {
            return Err(format!("quality must be 1-100, got {}", self.quality));
        }
        if !self.pixel_ratio.is_finite() || self.pixel_ratio <= 0.0 {
            return Err(format!(
                "pixel_ratio must be a positive number, got {}",
                self.pixel_ratio
            ));
        }
        if let Some(crop) = &self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err("crop width and height must be greater than 0".to_string());
            }
        }
        for wm in &self.watermarks {
            if wm.path.is_empty() {
                return Err("watermark path must not be empty".to_string());
            }
            if !(1..=100).contains(&wm.size) {
                return Err(format!("watermark size must be 1-100, got {}", wm.size));
            }
        }
        Ok(())
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_unit_ratio(v: &f64) -> bool {
    *v == 1.0
}

fn default_watermark_size() -> u8 {
    DEFAULT_WATERMARK_SIZE
}
