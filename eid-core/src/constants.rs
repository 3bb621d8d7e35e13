//! Protocol constants: canonical values shared with the resolving server.
//!
//! Every constant here is part of the wire contract. Changing one breaks
//! token verification for every beacon already in the field.

/// X25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// X25519 private key length in bytes.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// X25519 shared secret length in bytes.
pub const SHARED_SECRET_LENGTH: usize = 32;

/// Identity key length in bytes (one HMAC-SHA256 block).
pub const IDENTITY_KEY_LENGTH: usize = 32;

/// Raw token length in bytes.
pub const TOKEN_LENGTH: usize = 10;

/// Encoded token length in characters (78 of the 80 token bits).
pub const ENCODED_TOKEN_LENGTH: usize = 13;

/// URL-safe base64 alphabet the encoded token is drawn from.
pub const TOKEN_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// HKDF expand counter byte. Exactly one block is expanded.
pub const HKDF_EXPAND_BLOCK: u8 = 0x01;

/// Upper bound on key pairs tried before a degenerate server key is rejected.
pub const MAX_AGREEMENT_ATTEMPTS: usize = 16;

/// Server epochs are reported in microseconds.
pub const MICROS_PER_SECOND: u64 = 1_000_000;
