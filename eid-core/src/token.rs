//! Token rotation: the public identifier a beacon broadcasts.
//!
//! ## Algorithm
//! ```text
//! period  = 2^rotation_exponent seconds
//! counter = (now - epoch) / period                (now >= epoch)
//! token   = HMAC-SHA256(identity_key, counter as u64 big-endian)[0..10]
//! encoded = base64url(token)[0..13]               (78 of 80 bits)
//! ```
//! Anyone holding the identity key and the epoch reproduces the same token
//! for the same period index; the resolving server relies on this.
//! Without the key, tokens are indistinguishable from random.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::{ENCODED_TOKEN_LENGTH, TOKEN_LENGTH};
use crate::encoding::to_base64url;
use crate::errors::TokenError;
use crate::identity::IdentityKey;

type HmacSha256 = Hmac<Sha256>;

/// Raw 10-byte token.
pub type Token = [u8; TOKEN_LENGTH];

/// Rotation period in seconds, or `None` when `2^rotation_exponent` does
/// not fit in a `u64` (exponent 64 and up).
pub fn rotation_period(rotation_exponent: u8) -> Option<u64> {
    1u64.checked_shl(u32::from(rotation_exponent))
}

fn elapsed(epoch: u64, now_seconds: u64) -> Result<u64, TokenError> {
    now_seconds
        .checked_sub(epoch)
        .ok_or(TokenError::ClockBeforeEpoch {
            now: now_seconds,
            epoch,
        })
}

/// Period index of `now_seconds` relative to `epoch`.
///
/// Every exponent is accepted. From 64 up the period outlasts any `u64`
/// elapsed time, so the counter stays at 0.
///
/// # Errors
/// Returns `TokenError::ClockBeforeEpoch` when `now_seconds < epoch`.
pub fn rotation_counter(
    rotation_exponent: u8,
    epoch: u64,
    now_seconds: u64,
) -> Result<u64, TokenError> {
    let elapsed = elapsed(epoch, now_seconds)?;
    Ok(elapsed.checked_shr(u32::from(rotation_exponent)).unwrap_or(0))
}

/// Keyed scrambling of a single counter value.
pub fn token_for_counter(identity_key: &IdentityKey, counter: u64) -> Token {
    let mut mac = match HmacSha256::new_from_slice(identity_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let mut token = [0u8; TOKEN_LENGTH];
    token.copy_from_slice(&digest[..TOKEN_LENGTH]);
    token
}

/// Token for the rotation period containing `now_seconds`.
///
/// # Errors
/// See [`rotation_counter`].
pub fn compute_token(
    identity_key: &IdentityKey,
    rotation_exponent: u8,
    epoch: u64,
    now_seconds: u64,
) -> Result<Token, TokenError> {
    let counter = rotation_counter(rotation_exponent, epoch, now_seconds)?;
    Ok(token_for_counter(identity_key, counter))
}

/// Encode a token as exactly 13 URL-safe base64 characters.
pub fn encode_token(token: &Token) -> String {
    let mut encoded = to_base64url(token);
    encoded.truncate(ENCODED_TOKEN_LENGTH);
    encoded
}

/// Returns `true` if `candidate` has the shape of an encoded token.
pub fn is_valid_encoded_token(candidate: &str) -> bool {
    candidate.len() == ENCODED_TOKEN_LENGTH
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Seconds until the next rotation boundary, in `1..=period`. Saturates at
/// `u64::MAX` when the boundary lies further out than that.
///
/// # Errors
/// See [`rotation_counter`].
pub fn time_until_next_rotation(
    epoch: u64,
    rotation_exponent: u8,
    now_seconds: u64,
) -> Result<u64, TokenError> {
    let elapsed = u128::from(elapsed(epoch, now_seconds)?);
    let remaining = match 1u128.checked_shl(u32::from(rotation_exponent)) {
        Some(period) => period - elapsed % period,
        None => u128::MAX,
    };
    Ok(u64::try_from(remaining).unwrap_or(u64::MAX))
}
