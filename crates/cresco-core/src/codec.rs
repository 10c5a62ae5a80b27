//! Parameter codec for compressed blobs such as `configparams`.
//!
//! Encoding is gzip followed by standard base64.

use crate::error::{CrescoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Gzip `text` and base64-encode the result.
pub fn compress_param(text: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Reverse [`compress_param`].
pub fn decompress_param(encoded: &str) -> Result<String> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CrescoError::Decode {
            message: format!("Invalid base64: {}", e),
        })?;

    let mut text = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| CrescoError::Decode {
            message: format!("Invalid gzip payload: {}", e),
        })?;
    Ok(text)
}
