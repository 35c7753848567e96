//! URL signature verification.
//!
//! A signature scheme is chosen once at startup and runs on every transform
//! request before the operation parser sees the path, so forged operation
//! strings never get parsed.
//!
//! # Schemes
//!
//! - `none`: the path is passed through unchanged.
//! - `st3`: legacy. A fixed 25-character prefix was already verified by the
//!   fronting proxy and is simply dropped.
//! - `t3`: keyed. The first path segment is a short MD5-derived signature of
//!   the rest of the path:
//!
//! ```text
//! signature = base64url_nopad(md5(real_path + secret)[8..11])
//!
//! /Xk3a/r300x200,q85/photos/cat.jpg
//!  └┬─┘ └─────────────┬───────────┘
//!  sig            real_path
//! ```
//!
//! # Example
//!
//! ```rust
//! use imgserv::server::auth::SignatureVerifier;
//!
//! let verifier = SignatureVerifier::t3("my-secret");
//! let signed = verifier.sign("r100x100/cat.jpg");
//! assert_eq!(verifier.verify(&signed).unwrap(), "r100x100/cat.jpg");
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::{Digest, Md5};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;

/// Length of the pre-verified `st3` prefix.
pub const ST3_PREFIX_LEN: usize = 25;

/// Byte offset into the MD5 digest where the `t3` signature starts.
const T3_HASH_OFFSET: usize = 8;

/// Number of digest bytes in a `t3` signature.
const T3_HASH_SIZE: usize = 3;

// =============================================================================
// Types
// =============================================================================

/// Signature verification error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Path is shorter than the `st3` prefix
    TooShort {
        /// Length of the rejected path
        len: usize,
    },

    /// `t3` path has no `/` between signature and real path
    MissingSeparator,

    /// Signature does not match the path
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::TooShort { len } => write!(
                f,
                "Path too short for signature prefix ({} < {})",
                len, ST3_PREFIX_LEN
            ),
            AuthError::MissingSeparator => write!(f, "Missing signature segment"),
            AuthError::InvalidSignature => write!(f, "Invalid signature"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::FORBIDDEN;
        let error_type = match &self {
            AuthError::TooShort { .. } | AuthError::MissingSeparator => "malformed_signature",
            AuthError::InvalidSignature => "invalid_signature",
        };
        let message = self.to_string();

        // A wrong signature could be an attack; malformed paths are usually crawlers
        match &self {
            AuthError::InvalidSignature => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Signature verification failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Signature verification failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Signature Verifier
// =============================================================================

/// The configured signature scheme.
///
/// A closed set of schemes, selected once from configuration.
#[derive(Clone)]
pub enum SignatureVerifier {
    /// Accept every path unchanged
    None,

    /// Drop a prefix validated by an upstream proxy
    St3,

    /// Check an MD5-derived signature segment
    T3 {
        /// Shared secret appended to the path before hashing
        secret: String,
    },
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret
        f.write_str(self.name())
    }
}

impl SignatureVerifier {
    /// Create a keyed `t3` verifier.
    pub fn t3(secret: impl Into<String>) -> Self {
        SignatureVerifier::T3 {
            secret: secret.into(),
        }
    }

    /// Scheme name as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureVerifier::None => "none",
            SignatureVerifier::St3 => "st3",
            SignatureVerifier::T3 { .. } => "t3",
        }
    }

    /// Verify a raw request path and return the part to parse.
    pub fn verify<'a>(&self, query: &'a str) -> Result<&'a str, AuthError> {
        match self {
            SignatureVerifier::None => Ok(query),
            SignatureVerifier::St3 => query
                .get(ST3_PREFIX_LEN..)
                .ok_or(AuthError::TooShort { len: query.len() }),
            SignatureVerifier::T3 { secret } => {
                let (signature, real_path) = query
                    .trim_start_matches('/')
                    .split_once('/')
                    .ok_or(AuthError::MissingSeparator)?;

                let expected = short_hash(real_path, secret);
                if signature.as_bytes().ct_eq(expected.as_bytes()).into() {
                    Ok(real_path)
                } else {
                    Err(AuthError::InvalidSignature)
                }
            }
        }
    }

    /// Produce a path this verifier accepts.
    ///
    /// Only `t3` adds anything; other schemes return the path with a leading
    /// slash.
    pub fn sign(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match self {
            SignatureVerifier::T3 { secret } => {
                format!("/{}/{}", short_hash(path, secret), path)
            }
            _ => format!("/{}", path),
        }
    }
}

/// `base64url_nopad(md5(path + secret)[8..11])`
fn short_hash(path: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&digest[T3_HASH_OFFSET..T3_HASH_OFFSET + T3_HASH_SIZE])
}
