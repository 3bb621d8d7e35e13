//! Conformance Harness: Cross-Implementation Determinism
//!
//! Enforces the invariants the resolving server depends on, using the
//! golden vectors in `tests/vectors/`:
//! - Identity key derivation (X25519 + HKDF extract/single expand)
//! - Rotation counter and token determinism
//! - Encoded token format (13 chars, URL-safe alphabet)
