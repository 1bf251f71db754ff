//! Field encryption primitives: key derivation and the ciphertext codec.
//!
//! This module is intentionally free of storage and configuration
//! dependencies. Every operation takes its key explicitly.
//!
//! # Ciphertext format
//!
//! ```text
//! v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! The `v1` prefix enables future algorithm or key-version migration without
//! breaking existing ciphertext.

pub mod cipher;
pub mod kdf;

pub use cipher::{decrypt, decrypt_str, encrypt, CiphertextToken, TokenVersion, KEY_LEN};
pub use kdf::{derive, KeyMaterial, SecretMaterial, MIN_ITERATIONS};
