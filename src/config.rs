//! Configuration management for imgserv.
//!
//! Configuration comes from command-line arguments, with environment
//! variables (`IMGSERV_` prefix) as fallback and defaults for everything
//! optional.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use imgserv::config::{Cli, Command};
//!
//! match Cli::parse().command {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Sign(config) => println!("Signing {}", config.path),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `IMGSERV_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMGSERV_PORT` - Server port (default: 8081)
//! - `IMGSERV_S3_BUCKET` - S3 bucket holding source images (required)
//! - `IMGSERV_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IMGSERV_S3_REGION` - AWS region (default: us-east-1)
//! - `IMGSERV_CACHE_PATH` - Local cache directory (required)
//! - `IMGSERV_MAX_CLIENTS` - Concurrently accepted requests (default: 100)
//! - `IMGSERV_CONCURRENCY` - Concurrent load+transform jobs (default: 2)
//! - `IMGSERV_QUEUE_TIMEOUT` - Seconds to wait for a processing slot, 0 = forever
//! - `IMGSERV_SIGNATURE_METHOD` - `none`, `st3` or `t3` (default: none)
//! - `IMGSERV_SIGNATURE_SECRET` - Secret for `t3` signatures
//! - `IMGSERV_PRESETS` - Path to a JSON file of named presets
//! - `IMGSERV_OUTPUT_FORMAT` - `jpeg`, `webp` or `vary` (default: vary)
//! - `IMGSERV_JPEG_QUALITY_CORRECTION` - Added to JPEG quality (default: 0)
//! - `IMGSERV_WEBP_QUALITY_CORRECTION` - Added to WebP quality (default: -2)
//! - `IMGSERV_UPLOAD_MAX_WIDTH` / `IMGSERV_UPLOAD_MAX_HEIGHT` - Upload downscale box
//! - `IMGSERV_POOL_MAX_BUFFER` - Largest buffer kept in the pool (default: 3 MiB)
//! - `IMGSERV_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `IMGSERV_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::io::DEFAULT_MAX_RETAINED_CAPACITY;
use crate::server::auth::SignatureVerifier;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default limit of concurrently accepted requests.
pub const DEFAULT_MAX_CLIENTS: usize = 100;

/// Default limit of concurrent load+transform jobs.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default correction added to the requested quality for WebP output.
pub const DEFAULT_WEBP_QUALITY_CORRECTION: i32 = -2;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Enumerated Options
// =============================================================================

/// URL signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SignatureMethod {
    /// No signature
    #[default]
    None,
    /// Legacy prefix verified by the fronting proxy
    St3,
    /// MD5-derived path signature
    T3,
}

/// Output image format policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Always JPEG
    Jpeg,
    /// Always WebP
    Webp,
    /// WebP when the client accepts it, JPEG otherwise
    #[default]
    Vary,
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// imgserv - An image transformation server.
///
/// Resizes, crops, watermarks and re-encodes images stored in S3, as
/// described by a compact operation string in the request URL.
#[derive(Parser, Debug, Clone)]
#[command(name = "imgserv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the image server
    Serve(ServeConfig),

    /// Print a `t3`-signed path
    Sign(SignConfig),
}

/// Configuration for `imgserv serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGSERV_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMGSERV_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// S3 bucket holding the source images.
    #[arg(long, env = "IMGSERV_S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "IMGSERV_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IMGSERV_S3_REGION")]
    pub s3_region: String,

    /// Directory for the local source-image cache.
    #[arg(long, env = "IMGSERV_CACHE_PATH")]
    pub cache_path: PathBuf,

    // =========================================================================
    // Admission Control
    // =========================================================================
    /// Maximum number of concurrently accepted requests; more get 429.
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS, env = "IMGSERV_MAX_CLIENTS")]
    pub max_clients: usize,

    /// Maximum number of concurrent load+transform jobs.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, env = "IMGSERV_CONCURRENCY")]
    pub concurrency: usize,

    /// Seconds a request may wait for a processing slot (0 = no limit).
    #[arg(long, default_value_t = 0, env = "IMGSERV_QUEUE_TIMEOUT")]
    pub queue_timeout: u64,

    // =========================================================================
    // Signatures and Presets
    // =========================================================================
    /// URL signature scheme.
    #[arg(long, value_enum, default_value_t = SignatureMethod::None, env = "IMGSERV_SIGNATURE_METHOD")]
    pub signature_method: SignatureMethod,

    /// Secret for `t3` signatures.
    #[arg(long, env = "IMGSERV_SIGNATURE_SECRET")]
    pub signature_secret: Option<String>,

    /// JSON file mapping preset names to transform specs.
    #[arg(long, env = "IMGSERV_PRESETS")]
    pub presets: Option<PathBuf>,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Output format policy.
    #[arg(long, value_enum, default_value_t = OutputFormat::Vary, env = "IMGSERV_OUTPUT_FORMAT")]
    pub output_format: OutputFormat,

    /// Added to the requested quality for JPEG output.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, env = "IMGSERV_JPEG_QUALITY_CORRECTION")]
    pub jpeg_quality_correction: i32,

    /// Added to the requested quality for WebP output.
    #[arg(long, default_value_t = DEFAULT_WEBP_QUALITY_CORRECTION, allow_hyphen_values = true, env = "IMGSERV_WEBP_QUALITY_CORRECTION")]
    pub webp_quality_correction: i32,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IMGSERV_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// Uploads wider than this are downscaled (0 = keep size).
    #[arg(long, default_value_t = 0, env = "IMGSERV_UPLOAD_MAX_WIDTH")]
    pub upload_max_width: u32,

    /// Uploads taller than this are downscaled (0 = keep size).
    #[arg(long, default_value_t = 0, env = "IMGSERV_UPLOAD_MAX_HEIGHT")]
    pub upload_max_height: u32,

    /// Largest buffer capacity, in bytes, returned to the buffer pool.
    #[arg(long, default_value_t = DEFAULT_MAX_RETAINED_CAPACITY, env = "IMGSERV_POOL_MAX_BUFFER")]
    pub pool_max_buffer: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMGSERV_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.is_empty() {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or IMGSERV_S3_BUCKET".to_string(),
            );
        }

        if self.cache_path.as_os_str().is_empty() {
            return Err(
                "Cache path is required. Set --cache-path or IMGSERV_CACHE_PATH".to_string(),
            );
        }

        if self.max_clients == 0 {
            return Err("max_clients must be greater than 0".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.max_clients < self.concurrency {
            return Err(format!(
                "max_clients ({}) must not be lower than concurrency ({})",
                self.max_clients, self.concurrency
            ));
        }

        if self.pool_max_buffer == 0 {
            return Err("pool_max_buffer must be greater than 0".to_string());
        }

        if self.signature_method == SignatureMethod::T3
            && self.signature_secret.as_deref().unwrap_or("").is_empty()
        {
            return Err(
                "Signature method t3 needs a secret. \
                 Set --signature-secret or IMGSERV_SIGNATURE_SECRET"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the configured signature verifier.
    pub fn signature_verifier(&self) -> SignatureVerifier {
        match self.signature_method {
            SignatureMethod::None => SignatureVerifier::None,
            SignatureMethod::St3 => SignatureVerifier::St3,
            SignatureMethod::T3 => {
                SignatureVerifier::t3(self.signature_secret.clone().unwrap_or_default())
            }
        }
    }
}

/// Configuration for `imgserv sign`.
#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Secret shared with the server.
    #[arg(long, env = "IMGSERV_SIGNATURE_SECRET")]
    pub secret: String,

    /// Path to sign, e.g. `r300x200,q85/photos/cat.jpg`.
    pub path: String,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if self.path.trim_matches('/').is_empty() {
            return Err("Path must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
