//! PBKDF2-HMAC-SHA256 derivation of field-encryption keys from the root secret.

use common::ConfigurationError;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::cipher::KEY_LEN;

/// Hard floor on PBKDF2 iterations. Requests below it are rejected, never raised.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Fixed-size symmetric key used by the field codec.
///
/// The buffer is zeroed on drop and never printed, not even by `Debug`.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Wrap a slice that must be exactly [`KEY_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] on any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigurationError> {
        let bytes: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| ConfigurationError::Invalid {
                    name: "key",
                    reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
                })?;
        Ok(Self { bytes })
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Short, non-reversible identifier of this key, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::new()
            .chain_update(b"pii-vault/key-fingerprint/v1")
            .chain_update(self.bytes)
            .finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Derive [`KeyMaterial`] from an operator secret and salt.
///
/// Pure and deterministic: the same `(secret, salt, iterations)` always yields
/// the same key bytes.
///
/// # Errors
///
/// - [`ConfigurationError::MissingSecret`] if `secret` is blank.
/// - [`ConfigurationError::MissingSalt`] if `salt` is blank.
/// - [`ConfigurationError::IterationsTooLow`] if `iterations < MIN_ITERATIONS`.
pub fn derive(secret: &str, salt: &str, iterations: u32) -> Result<KeyMaterial, ConfigurationError> {
    if secret.trim().is_empty() {
        return Err(ConfigurationError::MissingSecret);
    }
    if salt.trim().is_empty() {
        return Err(ConfigurationError::MissingSalt);
    }
    if iterations < MIN_ITERATIONS {
        return Err(ConfigurationError::IterationsTooLow {
            requested: iterations,
            minimum: MIN_ITERATIONS,
        });
    }

    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), iterations, &mut bytes);
    let key = KeyMaterial::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Derived key together with the parameters that produced it.
///
/// Built once at process start. A second instance exists only while an
/// operator rotates from one secret to another.
#[derive(Clone)]
pub struct SecretMaterial {
    salt: String,
    iterations: u32,
    key: KeyMaterial,
}

impl SecretMaterial {
    /// Validate the inputs and derive the key. The root secret is not retained.
    ///
    /// # Errors
    ///
    /// See [`derive`].
    pub fn derive(secret: &str, salt: &str, iterations: u32) -> Result<Self, ConfigurationError> {
        let key = derive(secret, salt, iterations)?;
        Ok(Self {
            salt: salt.to_owned(),
            iterations,
            key,
        })
    }

    /// The derived key.
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("salt", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive("correct horse", "pepper", MIN_ITERATIONS).unwrap();
        let b = derive("correct horse", "pepper", MIN_ITERATIONS).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn salt_changes_output() {
        let a = derive("correct horse", "pepper", MIN_ITERATIONS).unwrap();
        let b = derive("correct horse", "paprika", MIN_ITERATIONS).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn matches_pbkdf2_sha256_reference() {
        let key = derive("password", "salt", MIN_ITERATIONS).unwrap();
        let mut expected = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"password", b"salt", MIN_ITERATIONS, &mut expected);
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn empty_secret_rejected() {
        assert_eq!(
            derive("", "salt", MIN_ITERATIONS).unwrap_err(),
            ConfigurationError::MissingSecret
        );
        assert_eq!(
            derive("   ", "salt", MIN_ITERATIONS).unwrap_err(),
            ConfigurationError::MissingSecret
        );
    }

    #[test]
    fn empty_salt_rejected() {
        assert_eq!(
            derive("secret", "", MIN_ITERATIONS).unwrap_err(),
            ConfigurationError::MissingSalt
        );
    }

    #[test]
    fn low_iterations_rejected() {
        assert!(matches!(
            derive("secret", "salt", MIN_ITERATIONS - 1),
            Err(ConfigurationError::IterationsTooLow { requested: 99_999, .. })
        ));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(KeyMaterial::from_slice(&[0u8; 16]).is_err());
        assert!(KeyMaterial::from_slice(&[0u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn fingerprint_is_stable_and_key_specific() {
        let a = KeyMaterial::from_bytes([1u8; KEY_LEN]);
        let b = KeyMaterial::from_bytes([2u8; KEY_LEN]);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn key_redacted_in_debug() {
        let key = KeyMaterial::from_bytes([0xFF; KEY_LEN]);
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("255"));
    }

    #[test]
    fn secret_material_keeps_parameters() {
        let m = SecretMaterial::derive("secret", "salt", MIN_ITERATIONS).unwrap();
        assert_eq!(m.salt(), "salt");
        assert_eq!(m.iterations(), MIN_ITERATIONS);
        assert_eq!(m.key().as_bytes(), derive("secret", "salt", MIN_ITERATIONS).unwrap().as_bytes());
    }

    #[test]
    fn secret_material_debug_redacts_salt() {
        let m = SecretMaterial::derive("hunter2", "pepper-salt", MIN_ITERATIONS).unwrap();
        let out = format!("{m:?}");
        assert!(!out.contains("pepper-salt"));
        assert!(!out.contains("hunter2"));
        assert!(out.contains("REDACTED"));
        assert!(out.contains("100000"));
    }
}
