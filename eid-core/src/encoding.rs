//! Encoding utilities: base64url and hex.
//!
//! Keys and tokens travel as URL-safe base64 without padding. Hex is used
//! by the golden vectors and the CLI.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::errors::EncodingError;

/// Encode bytes to URL-safe base64 without padding (RFC 4648 §5).
pub fn to_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe base64 without padding.
///
/// # Errors
/// Returns `EncodingError` on invalid input, including padded input.
pub fn from_base64url(encoded: &str) -> Result<Vec<u8>, EncodingError> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| EncodingError(format!("invalid base64url: {e}")))
}

/// Decode URL-safe base64 into a fixed-size array.
///
/// # Errors
/// Returns `EncodingError` on invalid input or a length mismatch.
pub fn from_base64url_array<const N: usize>(encoded: &str) -> Result<[u8; N], EncodingError> {
    let bytes = from_base64url(encoded)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| EncodingError(format!("expected {N} bytes, got {len}")))
}

/// Encode bytes to lowercase hex string.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode hex string to bytes.
///
/// # Errors
/// Returns `EncodingError` on invalid hex input.
pub fn from_hex(encoded: &str) -> Result<Vec<u8>, EncodingError> {
    if encoded.len() % 2 != 0 {
        return Err(EncodingError("odd-length hex string".into()));
    }
    (0..encoded.len())
        .step_by(2)
        .map(|i| {
            encoded
                .get(i..i + 2)
                .ok_or_else(|| EncodingError("non-ascii hex string".into()))
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16)
                        .map_err(|e| EncodingError(format!("invalid hex: {e}")))
                })
        })
        .collect()
}

/// Decode a hex string into a fixed-size array.
///
/// # Errors
/// Returns `EncodingError` on invalid hex or a length mismatch.
pub fn from_hex_array<const N: usize>(encoded: &str) -> Result<[u8; N], EncodingError> {
    let bytes = from_hex(encoded)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| EncodingError(format!("expected {N} bytes, got {len}")))
}
