mod parser;
mod preset;
mod spec;

pub use parser::{query_unescape, OperationParser};
pub use preset::Presets;
pub use spec::{
    CropSpec, Gravity, Mode, Position, TransformSpec, WatermarkSpec, DEFAULT_QUALITY,
    DEFAULT_WATERMARK_SIZE,
};
