//! Identity keys: derived once per beacon from an X25519 agreement.
//!
//! ## Algorithm
//! ```text
//! PRK          = HMAC-SHA256(key = server_pk || beacon_pk, msg = shared_secret)
//! identity_key = HMAC-SHA256(key = PRK, msg = 0x01)
//! ```
//! This is HKDF-SHA256 (RFC 5869) with an empty `info` and a 32-byte
//! output, i.e. extract followed by exactly one expand block. The server
//! performs the same derivation to verify tokens, so the construction is
//! fixed.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{IDENTITY_KEY_LENGTH, PUBLIC_KEY_LENGTH};
use crate::crypto::{establish, KeyExchange, SharedSecret};
use crate::errors::CryptoError;

/// Long-lived per-beacon secret. Never transmitted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct IdentityKey([u8; IDENTITY_KEY_LENGTH]);

impl IdentityKey {
    pub fn from_bytes(bytes: [u8; IDENTITY_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build from a stored slice.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; IDENTITY_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "identity key must be {IDENTITY_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_KEY_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityKey(..)")
    }
}

/// Derive the identity key from an agreed secret and both public keys.
///
/// Pure and deterministic: identical inputs always give the same key.
///
/// # Errors
/// Returns `CryptoError::Unavailable` if the HKDF expand step rejects the
/// requested output length.
pub fn derive_identity_key(
    shared_secret: &SharedSecret,
    server_public_key: &[u8; PUBLIC_KEY_LENGTH],
    beacon_public_key: &[u8; PUBLIC_KEY_LENGTH],
) -> Result<IdentityKey, CryptoError> {
    let mut salt = [0u8; PUBLIC_KEY_LENGTH * 2];
    salt[..PUBLIC_KEY_LENGTH].copy_from_slice(server_public_key);
    salt[PUBLIC_KEY_LENGTH..].copy_from_slice(beacon_public_key);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret.as_bytes());
    let mut okm = [0u8; IDENTITY_KEY_LENGTH];
    hkdf.expand(&[], &mut okm)
        .map_err(|e| CryptoError::Unavailable(format!("hkdf expand: {e}")))?;

    let key = IdentityKey(okm);
    okm.zeroize();
    Ok(key)
}

/// Output of a successful key agreement: the beacon's public key (sent to
/// the server) and the derived identity key (kept on device).
#[derive(Debug)]
pub struct ProvisionedIdentity {
    pub beacon_public_key: [u8; PUBLIC_KEY_LENGTH],
    pub identity_key: IdentityKey,
}

/// Run the registration-time agreement loop and derive the identity key.
///
/// The private key is dropped (and zeroized) before this returns.
///
/// # Errors
/// Returns `CryptoError::InvalidKey` for a malformed or degenerate server
/// key and `CryptoError::Unavailable` if derivation fails.
pub fn establish_identity<E: KeyExchange + ?Sized>(
    exchange: &mut E,
    server_public_key: &[u8; PUBLIC_KEY_LENGTH],
) -> Result<ProvisionedIdentity, CryptoError> {
    let agreement = establish(exchange, server_public_key)?;
    let public_key = agreement.keypair.public_key;
    let identity_key =
        derive_identity_key(&agreement.shared_secret, server_public_key, &public_key)?;
    Ok(ProvisionedIdentity {
        beacon_public_key: public_key,
        identity_key,
    })
}
