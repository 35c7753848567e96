use thiserror::Error;

use crate::server::auth::AuthError;

/// I/O errors from the origin store or the local disk cache
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found (confirmed by the origin or by a negative cache entry)
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Local cache directory or file could not be read or written
    #[error("Cache error: {0}")]
    Cache(String),

    /// Object exists but has no content
    #[error("Empty object: {0}")]
    EmptyObject(String),
}

impl IoError {
    /// Whether the origin confirmed the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::NotFound(_))
    }
}

/// Errors produced while parsing the operation language.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Query has no `/` separating operations from the origin key
    #[error("Incorrect input query: {0}")]
    MalformedQuery(String),

    /// Origin key or watermark path has a broken percent-escape
    #[error("Incorrect escaping of path: {0}")]
    InvalidEscape(String),

    /// Token is shorter than opcode + value
    #[error("Operation token too short: {0:?}")]
    TokenTooShort(String),

    /// Opcode is not part of the language
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(char),

    /// Opcode is known but the value does not follow its grammar
    #[error("Invalid value for '{op}': {value:?} ({reason})")]
    InvalidValue {
        op: char,
        value: String,
        reason: &'static str,
    },

    /// Sub-option reserved by the language but not implemented
    #[error("Unsupported option for '{op}': {value:?}")]
    Unsupported { op: char, value: String },

    /// `_name` references a preset that was not loaded
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Errors loading the preset table at startup.
#[derive(Debug, Error)]
pub enum PresetError {
    /// Preset file could not be read
    #[error("Failed to read presets from {path}: {message}")]
    Read { path: String, message: String },

    /// Preset file is not a JSON object of transform specs
    #[error("Can't parse presets: {0}")]
    Json(String),

    /// A preset holds out-of-range values
    #[error("Invalid preset {name:?}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Errors raised while planning or executing a transform.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Source bytes are not a decodable image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Output encoding failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// A primitive engine operation failed
    #[error("Image engine error in {op}: {message}")]
    Engine { op: &'static str, message: String },

    /// Crop origin lies outside the source image
    #[error("Crop origin ({x}, {y}) is outside the {width}x{height} source")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Uploaded image exceeds the accepted pixel area
    #[error("Input image is too big: {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    /// A raster the transform would allocate exceeds the engine limits
    #[error("Requested size {width}x{height} exceeds the image size limit")]
    SizeLimit { width: u64, height: u64 },

    /// Loading or compositing a watermark failed
    #[error("Watermark {path} failed: {message}")]
    Watermark { path: String, message: String },

    /// The blocking worker running the transform did not complete
    #[error("Transform worker failed: {0}")]
    Worker(String),
}

/// Request-level outcome of the serving pipeline.
///
/// Each variant maps to exactly one HTTP status (see `server::handlers`).
#[derive(Debug, Error)]
pub enum ServeError {
    /// Nothing to parse (400)
    #[error("No input query")]
    EmptyQuery,

    /// Required request argument is missing (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Signature verification failed (403)
    #[error("Signature verification failed: {0}")]
    Auth(#[from] AuthError),

    /// Operation string was rejected (500)
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Source image does not exist (404)
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Accept gate is exhausted (429)
    #[error("Too many requests")]
    Rejected,

    /// Client went away, or the queue deadline passed, before processing started (499)
    #[error("Request cancelled while waiting for a processing slot")]
    Canceled,

    /// Transform or encode failure (500)
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Storage failure (500)
    #[error(transparent)]
    Io(IoError),

    /// Local file given to `/upload_file` could not be read (500)
    #[error("Failed to open file {path}: {message}")]
    UploadFile { path: String, message: String },
}

impl From<IoError> for ServeError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(key) => ServeError::NotFound(key),
            other => ServeError::Io(other),
        }
    }
}
