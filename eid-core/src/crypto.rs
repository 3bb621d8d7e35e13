//! Key agreement: X25519 key pairs and shared secrets.
//!
//! A beacon generates a fresh key pair per registration attempt and agrees
//! on a shared secret with the server's per-call public key. The private
//! key never leaves the device.
//!
//! ## Degenerate secrets
//! X25519 maps small-order peer points to the all-zero secret. An all-zero
//! secret is never used: [`establish`] regenerates the key pair and agrees
//! again. With an honest server key this loop exits on the first pass.

use rand_core::{OsRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    MAX_AGREEMENT_ATTEMPTS, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH, SHARED_SECRET_LENGTH,
};
use crate::errors::CryptoError;

/// X25519 key pair.
///
/// 32-byte public key and 32-byte private key. Both are zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    /// Curve25519 public key (32 bytes).
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
    /// Curve25519 private key (32 bytes).
    pub private_key: [u8; PRIVATE_KEY_LENGTH],
}

impl KeyPair {
    /// Rebuild a key pair from a stored private key.
    pub fn from_private_key(private_key: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        let secret = StaticSecret::from(private_key);
        let public = PublicKey::from(&secret);
        Self {
            public_key: *public.as_bytes(),
            private_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &crate::encoding::to_hex(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Transient X25519 agreement output. Never persisted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LENGTH]);

impl SharedSecret {
    /// Wrap raw agreement bytes.
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LENGTH] {
        &self.0
    }

    /// True for the degenerate all-zero secret.
    pub fn is_zero(&self) -> bool {
        self.0.iter().fold(0u8, |acc, b| acc | b) == 0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Generate a fresh X25519 key pair from the OS CSPRNG.
pub fn generate_keypair() -> KeyPair {
    let mut private_key = [0u8; PRIVATE_KEY_LENGTH];
    OsRng.fill_bytes(&mut private_key);
    let pair = KeyPair::from_private_key(private_key);
    private_key.zeroize();
    pair
}

/// Compute the X25519 shared secret between the server's public key and a
/// local private key.
///
/// Every 32-byte string is a valid X25519 u-coordinate (RFC 7748 §5), so
/// the only malformed input is a wrong length. The result may be all-zero
/// for small-order server points; callers check [`SharedSecret::is_zero`].
///
/// # Errors
/// Returns `CryptoError::InvalidKey` if either key is not exactly 32 bytes.
pub fn agree(server_public_key: &[u8], private_key: &[u8]) -> Result<SharedSecret, CryptoError> {
    let server: [u8; PUBLIC_KEY_LENGTH] = server_public_key.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "server public key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
            server_public_key.len()
        ))
    })?;
    let mut private: [u8; PRIVATE_KEY_LENGTH] = private_key.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "private key must be {PRIVATE_KEY_LENGTH} bytes, got {}",
            private_key.len()
        ))
    })?;

    let secret = StaticSecret::from(private);
    private.zeroize();
    let shared = secret.diffie_hellman(&PublicKey::from(server));
    Ok(SharedSecret(*shared.as_bytes()))
}

/// Source of key pairs and agreements used during registration.
///
/// [`X25519`] is the production implementation. The seam exists so the
/// degenerate-secret retry can be driven deterministically.
pub trait KeyExchange {
    /// Produce a fresh key pair.
    fn generate_keypair(&mut self) -> KeyPair;

    /// Agree on a shared secret with the server key.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` for malformed keys.
    fn agree(&self, server_public_key: &[u8], private_key: &[u8])
        -> Result<SharedSecret, CryptoError>;
}

/// X25519 over the OS CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519;

impl KeyExchange for X25519 {
    fn generate_keypair(&mut self) -> KeyPair {
        generate_keypair()
    }

    fn agree(
        &self,
        server_public_key: &[u8],
        private_key: &[u8],
    ) -> Result<SharedSecret, CryptoError> {
        agree(server_public_key, private_key)
    }
}

/// Key pair plus the non-zero secret it agreed on.
#[derive(Debug)]
pub struct Agreement {
    pub keypair: KeyPair,
    pub shared_secret: SharedSecret,
}

/// Generate key pairs until one agrees on a non-zero secret with the
/// server key.
///
/// The retry is internal and never surfaced. A server key that keeps
/// producing the zero secret after [`MAX_AGREEMENT_ATTEMPTS`] fresh pairs is
/// a small-order point and is rejected.
///
/// # Errors
/// Returns `CryptoError::InvalidKey` for a malformed or degenerate server key.
pub fn establish<E: KeyExchange + ?Sized>(
    exchange: &mut E,
    server_public_key: &[u8],
) -> Result<Agreement, CryptoError> {
    for _ in 0..MAX_AGREEMENT_ATTEMPTS {
        let keypair = exchange.generate_keypair();
        let shared_secret = exchange.agree(server_public_key, &keypair.private_key)?;
        if !shared_secret.is_zero() {
            return Ok(Agreement {
                keypair,
                shared_secret,
            });
        }
    }
    Err(CryptoError::InvalidKey(
        "server public key only yields the all-zero shared secret".into(),
    ))
}
