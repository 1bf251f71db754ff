//! AES-256-GCM-SIV encryption and decryption of individual string fields.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! A fresh random nonce is still drawn for every call, so two encryptions of
//! the same plaintext under the same key produce different tokens.
//!
//! Tokens are `v1.<nonce>.<ciphertext||tag>`, both parts base64url without
//! padding. The version prefix is checked before anything is decoded.

use std::fmt;
use std::str::FromStr;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::{DecryptionError, EncryptionError};

use super::kdf::KeyMaterial;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to every payload.
pub const TAG_LEN: usize = 16;

/// Algorithm generation a token was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenVersion {
    /// AES-256-GCM-SIV, 96-bit nonce, base64url-no-pad parts.
    V1,
}

impl TokenVersion {
    /// Version used for all new encryptions.
    pub const CURRENT: TokenVersion = TokenVersion::V1;

    /// Prefix written at the start of the token string.
    pub fn prefix(self) -> &'static str {
        match self {
            TokenVersion::V1 => "v1",
        }
    }

    /// Map a token prefix back to a version this build understands.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "v1" => Some(TokenVersion::V1),
            _ => None,
        }
    }
}

impl fmt::Display for TokenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A parsed, encrypted field value.
///
/// The string representation is `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextToken {
    version: TokenVersion,
    nonce: [u8; NONCE_LEN],
    /// Ciphertext followed by the [`TAG_LEN`]-byte authentication tag.
    payload: Vec<u8>,
}

impl CiphertextToken {
    pub fn version(&self) -> TokenVersion {
        self.version
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// The authentication tag (the trailing [`TAG_LEN`] bytes of the payload).
    pub fn tag(&self) -> &[u8] {
        &self.payload[self.payload.len() - TAG_LEN..]
    }

    /// The encrypted bytes without the tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.payload[..self.payload.len() - TAG_LEN]
    }

    /// Encode this token to its canonical string representation.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version.prefix(),
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.payload),
        )
    }

    /// Parse a token string.
    ///
    /// # Errors
    ///
    /// - [`DecryptionError::UnsupportedVersion`] for an unknown `v<n>` prefix.
    /// - [`DecryptionError::Malformed`] for anything else that does not match
    ///   `v1.<nonce>.<payload>`.
    pub fn parse(s: &str) -> Result<Self, DecryptionError> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 {
            return Err(DecryptionError::Malformed);
        }
        let version = match TokenVersion::from_prefix(parts[0]) {
            Some(v) => v,
            None if looks_like_version(parts[0]) => {
                return Err(DecryptionError::UnsupportedVersion(parts[0].to_owned()))
            }
            None => return Err(DecryptionError::Malformed),
        };

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| DecryptionError::Malformed)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| DecryptionError::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| DecryptionError::Malformed)?;
        if payload.len() < TAG_LEN {
            return Err(DecryptionError::Malformed);
        }

        Ok(Self {
            version,
            nonce,
            payload,
        })
    }
}

impl fmt::Display for CiphertextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_repr())
    }
}

impl FromStr for CiphertextToken {
    type Err = DecryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `v` followed by at least one digit.
fn looks_like_version(prefix: &str) -> bool {
    prefix
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Encrypt a plaintext string field using AES-256-GCM-SIV.
///
/// Returns `Ok(None)` for an empty string without touching the cipher; the
/// caller stores a null column in that case.
///
/// # Errors
///
/// Returns [`EncryptionError::Aead`] on an internal AEAD error (should be
/// unreachable with a valid key and nonce).
pub fn encrypt(plaintext: &str, key: &KeyMaterial) -> Result<Option<CiphertextToken>, EncryptionError> {
    if plaintext.is_empty() {
        return Ok(None);
    }

    let cipher = build_cipher(key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| EncryptionError::Aead)?;

    Ok(Some(CiphertextToken {
        version: TokenVersion::CURRENT,
        nonce: nonce_bytes,
        payload,
    }))
}

/// Decrypt a [`CiphertextToken`] back to its plaintext string.
///
/// # Errors
///
/// Returns [`DecryptionError::Authentication`] if the tag does not verify
/// (wrong key or tampered data) and [`DecryptionError::InvalidUtf8`] if the
/// authenticated bytes are not a string. No plaintext escapes on failure.
pub fn decrypt(token: &CiphertextToken, key: &KeyMaterial) -> Result<String, DecryptionError> {
    match token.version {
        TokenVersion::V1 => {
            let cipher = build_cipher(key);
            let nonce = Nonce::from_slice(&token.nonce);
            let bytes = cipher
                .decrypt(nonce, token.payload.as_ref())
                .map_err(|_| DecryptionError::Authentication)?;
            String::from_utf8(bytes).map_err(|_| DecryptionError::InvalidUtf8)
        }
    }
}

/// Parse and decrypt a stored token string in one step.
///
/// # Errors
///
/// Any error from [`CiphertextToken::parse`] or [`decrypt`].
pub fn decrypt_str(token: &str, key: &KeyMaterial) -> Result<String, DecryptionError> {
    decrypt(&CiphertextToken::parse(token)?, key)
}

fn build_cipher(key: &KeyMaterial) -> Aes256GcmSiv {
    Aes256GcmSiv::new(key.as_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> KeyMaterial {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        KeyMaterial::from_bytes(key)
    }

    fn seal(plaintext: &str, key: &KeyMaterial) -> CiphertextToken {
        encrypt(plaintext, key).unwrap().unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = random_key();
        let long = "x".repeat(64 * 1024);
        for plaintext in ["+44 20 7946 0958", "Zoë Ñúñez 山田太郎 🍜", long.as_str()] {
            let token = seal(plaintext, &key);
            assert_eq!(decrypt(&token, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn empty_plaintext_yields_no_token() {
        let key = random_key();
        assert_eq!(encrypt("", &key).unwrap(), None);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let token = seal("secret", &random_key());
        assert_eq!(
            decrypt(&token, &random_key()).unwrap_err(),
            DecryptionError::Authentication
        );
    }

    #[test]
    fn same_plaintext_gives_distinct_tokens() {
        let key = random_key();
        let a = seal("jane@example.com", &key);
        let b = seal("jane@example.com", &key);
        assert_ne!(a.to_string_repr(), b.to_string_repr());
        assert_eq!(decrypt(&a, &key).unwrap(), "jane@example.com");
        assert_eq!(decrypt(&b, &key).unwrap(), "jane@example.com");
    }

    #[test]
    fn string_repr_round_trip() {
        let key = random_key();
        let token = seal("hello", &key);
        let s = token.to_string_repr();
        assert!(s.starts_with("v1."));
        let parsed: CiphertextToken = s.parse().unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.tag().len(), TAG_LEN);
        assert_eq!(parsed.ciphertext().len(), "hello".len());
    }

    #[test]
    fn parse_rejects_unknown_version() {
        assert_eq!(
            CiphertextToken::parse("v2.abc.def").unwrap_err(),
            DecryptionError::UnsupportedVersion("v2".into())
        );
    }

    #[test]
    fn parse_rejects_garbage_prefix_as_malformed() {
        assert_eq!(
            CiphertextToken::parse("plain.text.value").unwrap_err(),
            DecryptionError::Malformed
        );
    }

    #[test]
    fn parse_rejects_too_few_parts() {
        assert_eq!(CiphertextToken::parse("v1.abc").unwrap_err(), DecryptionError::Malformed);
    }

    #[test]
    fn parse_rejects_bad_base64() {
        assert_eq!(
            CiphertextToken::parse("v1.!!!.abc").unwrap_err(),
            DecryptionError::Malformed
        );
    }

    #[test]
    fn parse_rejects_short_nonce() {
        let s = format!("v1.{}.{}", URL_SAFE_NO_PAD.encode([0u8; 4]), URL_SAFE_NO_PAD.encode([0u8; 32]));
        assert_eq!(CiphertextToken::parse(&s).unwrap_err(), DecryptionError::Malformed);
    }

    #[test]
    fn parse_rejects_payload_shorter_than_tag() {
        let s = format!(
            "v1.{}.{}",
            URL_SAFE_NO_PAD.encode([0u8; NONCE_LEN]),
            URL_SAFE_NO_PAD.encode([0u8; TAG_LEN - 1])
        );
        assert_eq!(CiphertextToken::parse(&s).unwrap_err(), DecryptionError::Malformed);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = random_key();
        let mut token = seal("tamper me", &key);
        // Flip a byte in the ciphertext to simulate tampering.
        token.payload[0] ^= 0xFF;
        assert_eq!(decrypt(&token, &key).unwrap_err(), DecryptionError::Authentication);
    }

    #[test]
    fn tampered_nonce_fails_auth() {
        let key = random_key();
        let mut token = seal("tamper me", &key);
        token.nonce[0] ^= 0x01;
        assert!(decrypt(&token, &key).is_err());
    }

    #[test]
    fn decrypt_str_parses_then_decrypts() {
        let key = random_key();
        let s = seal("221B Baker Street", &key).to_string_repr();
        assert_eq!(decrypt_str(&s, &key).unwrap(), "221B Baker Street");
        assert_eq!(decrypt_str("not a token", &key).unwrap_err(), DecryptionError::Malformed);
    }
}
