//! Parser for the URL operation language.
//!
//! A request path has the shape:
//!
//! ```text
//! /r300x200,q85,wlogo.png-nw-50/photos/cat.jpg
//!  └────────┬─────────────────┘ └─────┬──────┘
//!       operations              origin key (URL-escaped)
//! ```
//!
//! Operations are comma-separated tokens. The first character of a token is
//! its opcode, the rest is the value. Tokens apply strictly left to right,
//! so later tokens override earlier ones; a `_name` token replaces the whole
//! running spec with a copy of the named preset.

use std::sync::Arc;

use super::{CropSpec, Gravity, Mode, Position, Presets, TransformSpec, WatermarkSpec};
use crate::error::ParseError;

/// Turns raw request paths into `(origin_key, TransformSpec)` pairs.
///
/// Cheap to clone; the preset table is shared.
#[derive(Debug, Clone)]
pub struct OperationParser {
    presets: Arc<Presets>,
}

impl OperationParser {
    pub fn new(presets: Arc<Presets>) -> Self {
        Self { presets }
    }

    /// Parse a verified request path.
    ///
    /// Any malformed token rejects the whole request; nothing is partially
    /// applied.
    pub fn parse(&self, raw: &str) -> Result<(String, TransformSpec), ParseError> {
        let (operations, escaped_key) = raw
            .trim_matches('/')
            .split_once('/')
            .ok_or_else(|| ParseError::MalformedQuery(raw.to_string()))?;

        let key = query_unescape(escaped_key)?;

        let mut spec = TransformSpec::default();
        for token in operations.split(',') {
            self.apply_token(&mut spec, token)?;
        }

        Ok((key, spec))
    }

    fn apply_token(&self, spec: &mut TransformSpec, token: &str) -> Result<(), ParseError> {
        let mut chars = token.chars();
        let (op, value) = match chars.next() {
            Some(op) if !chars.as_str().is_empty() => (op, chars.as_str()),
            _ => return Err(ParseError::TokenTooShort(token.to_string())),
        };

        match op {
            'r' => parse_resize(spec, value),
            'c' => {
                spec.crop = Some(parse_crop(value)?);
                Ok(())
            }
            'q' => {
                spec.quality = parse_percent('q', value)?;
                Ok(())
            }
            'g' => {
                spec.gravity = parse_gravity(value)?;
                Ok(())
            }
            'w' => {
                spec.watermarks.push(parse_watermark(value)?);
                Ok(())
            }
            'p' => {
                spec.pixel_ratio = parse_pixel_ratio(value)?;
                Ok(())
            }
            '_' => {
                *spec = self
                    .presets
                    .get(value)
                    .cloned()
                    .ok_or_else(|| ParseError::UnknownPreset(value.to_string()))?;
                Ok(())
            }
            'n' => Ok(()),
            other => Err(ParseError::UnsupportedOperation(other)),
        }
    }
}

// =============================================================================
// Token grammars
// =============================================================================

/// `r[f|c]WIDTH[xHEIGHT]`
///
/// A width-only value leaves the current height alone. An empty side
/// (`rx200`) means unconstrained on that axis.
fn parse_resize(spec: &mut TransformSpec, value: &str) -> Result<(), ParseError> {
    let (mode, sizes) = if let Some(rest) = value.strip_prefix('f') {
        (Some(Mode::Fill), rest)
    } else if let Some(rest) = value.strip_prefix('c') {
        (Some(Mode::Crop), rest)
    } else {
        (None, value)
    };

    let parts: Vec<&str> = sizes.split('x').collect();
    let (width, height) = match parts.as_slice() {
        [w] if !w.is_empty() => (parse_dimension(value, w)?, None),
        [w, h] if !(w.is_empty() && h.is_empty()) => (
            parse_dimension(value, w)?,
            Some(parse_dimension(value, h)?),
        ),
        _ => {
            return Err(ParseError::InvalidValue {
                op: 'r',
                value: value.to_string(),
                reason: "expected WIDTH or WIDTHxHEIGHT",
            })
        }
    };

    if let Some(mode) = mode {
        spec.mode = mode;
    }
    spec.resize = true;
    spec.width = width;
    if let Some(height) = height {
        spec.height = height;
    }
    Ok(())
}

fn parse_dimension(value: &str, part: &str) -> Result<u32, ParseError> {
    if part.is_empty() {
        return Ok(0);
    }
    part.parse().map_err(|_| ParseError::InvalidValue {
        op: 'r',
        value: value.to_string(),
        reason: "size is not a non-negative integer",
    })
}

/// `cXxYxWIDTHxHEIGHT`
fn parse_crop(value: &str) -> Result<CropSpec, ParseError> {
    let invalid = |reason| ParseError::InvalidValue {
        op: 'c',
        value: value.to_string(),
        reason,
    };

    let numbers = value
        .split('x')
        .map(|n| n.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid("crop values must be non-negative integers"))?;

    let &[x, y, width, height] = numbers.as_slice() else {
        return Err(invalid("expected exactly 4 crop values"));
    };

    if width == 0 || height == 0 {
        return Err(invalid("crop width and height must be greater than 0"));
    }

    Ok(CropSpec {
        x,
        y,
        width,
        height,
    })
}

/// Integer in 1-100, used for quality and watermark size.
fn parse_percent(op: char, value: &str) -> Result<u8, ParseError> {
    match value.parse::<u8>() {
        Ok(v) if (1..=100).contains(&v) => Ok(v),
        _ => Err(ParseError::InvalidValue {
            op,
            value: value.to_string(),
            reason: "expected an integer between 1 and 100",
        }),
    }
}

fn parse_gravity(value: &str) -> Result<Gravity, ParseError> {
    match value {
        "s" => Ok(Gravity::Smart),
        // `gf...` (focal point) is reserved but not implemented
        _ => Err(ParseError::Unsupported {
            op: 'g',
            value: value.to_string(),
        }),
    }
}

/// `PATH[-POSITION][-SIZE]`, or the legacy `--h`.
fn parse_watermark(value: &str) -> Result<WatermarkSpec, ParseError> {
    if value == "--h" {
        return Ok(WatermarkSpec::new("h", Position::SouthEast));
    }

    let invalid = |reason| ParseError::InvalidValue {
        op: 'w',
        value: value.to_string(),
        reason,
    };

    let opts: Vec<&str> = value.split('-').collect();
    if opts.len() > 3 {
        return Err(invalid("expected PATH[-POSITION][-SIZE]"));
    }

    let path = query_unescape(opts[0])?;
    if path.is_empty() {
        return Err(invalid("watermark path is empty"));
    }
    let mut wm = WatermarkSpec::new(path, Position::SouthEast);

    if let Some(position) = opts.get(1).filter(|p| !p.is_empty()) {
        if position.len() > 2 {
            let (x, y) = position
                .split_once('x')
                .ok_or_else(|| invalid("expected coordinates as XxY"))?;
            wm.position = Position::Coords;
            wm.offset_x = x.parse().map_err(|_| invalid("wrong watermark coordinate"))?;
            wm.offset_y = y.parse().map_err(|_| invalid("wrong watermark coordinate"))?;
        } else {
            wm.position =
                Position::from_code(position).ok_or_else(|| invalid("unknown position code"))?;
        }
    }

    if let Some(size) = opts.get(2) {
        wm.size = parse_percent('w', size)?;
    }

    Ok(wm)
}

fn parse_pixel_ratio(value: &str) -> Result<f64, ParseError> {
    match value.parse::<f64>() {
        Ok(ratio) if ratio.is_finite() && ratio > 0.0 => Ok(ratio),
        _ => Err(ParseError::InvalidValue {
            op: 'p',
            value: value.to_string(),
            reason: "expected a positive number",
        }),
    }
}

// =============================================================================
// Unescaping
// =============================================================================

/// Decode a query-escaped string: `+` is a space, `%XX` a byte.
///
/// A `%` not followed by two hex digits, or bytes that don't form UTF-8,
/// are errors.
pub fn query_unescape(s: &str) -> Result<String, ParseError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(ParseError::InvalidEscape(s.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ParseError::InvalidEscape(s.to_string()))
}
