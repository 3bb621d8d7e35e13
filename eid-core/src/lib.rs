//! EID Core: protocol primitives for rotating beacon identifiers.
//!
//! This crate is the canonical source of truth for the cryptography a
//! rotating beacon shares with the server that resolves its tokens. The
//! server reproduces every value computed here, so outputs MUST be
//! bit-exact and are pinned by the golden vectors in `tests/vectors/`.
//!
//! # Module Map
//!
//! | Module | Role | Status |
//! |--------|------|--------|
//! | [`constants`] | Key sizes, token sizes, alphabets | Complete |
//! | [`errors`] | Crypto / token / encoding errors | Complete |
//! | [`encoding`] | base64url and hex | Complete |
//! | [`crypto`] | X25519 key pairs and agreement | Complete |
//! | [`identity`] | HKDF identity key derivation | Complete |
//! | [`token`] | Rotation counter and token encoding | Complete |
//!
//! Nothing in this crate performs IO, reads a clock or holds global
//! state. Time is always an explicit argument.

/// Protocol constants: values shared with the resolving server.
pub mod constants;

/// Error types for eid-core operations.
pub mod errors;

/// Encoding utilities: base64url and hex.
pub mod encoding;

/// Key agreement: X25519 key pairs and shared secrets.
pub mod crypto;

/// Identity keys: HKDF derivation from an agreed secret.
pub mod identity;

/// Token rotation: counter, keyed scrambling and 13-char encoding.
pub mod token;

pub use crypto::{agree, establish, generate_keypair, KeyExchange, KeyPair, SharedSecret, X25519};
pub use errors::{CryptoError, EncodingError, TokenError};
pub use identity::{derive_identity_key, establish_identity, IdentityKey, ProvisionedIdentity};
pub use token::{compute_token, encode_token, time_until_next_rotation, Token};
