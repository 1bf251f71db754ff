//! Configuration loading and validation for field encryption.
//!
//! All values are read from environment variables at startup. A missing or
//! blank secret or salt is fatal: the process must not start without them.

use anyhow::{Context, Result};
use common::ConfigurationError;
use serde::Deserialize;

use crate::crypto::{SecretMaterial, MIN_ITERATIONS};

/// Validated field-encryption configuration.
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    /// Root secret the field key is derived from. **Required.**
    pub field_secret: String,

    /// Salt for key derivation. **Required.**
    pub field_salt: String,

    /// PBKDF2 iteration count. Never below [`MIN_ITERATIONS`].
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

pub(crate) fn default_kdf_iterations() -> u32 {
    MIN_ITERATIONS
}

impl VaultConfig {
    /// Load and validate configuration from environment variables
    /// (`FIELD_SECRET`, `FIELD_SALT`, `KDF_ITERATIONS`).
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or invalid.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: VaultConfig = cfg
            .try_deserialize()
            .context("failed to deserialise field encryption configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigurationError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.field_secret.trim().is_empty() {
            return Err(ConfigurationError::MissingSecret);
        }
        if self.field_salt.trim().is_empty() {
            return Err(ConfigurationError::MissingSalt);
        }
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(ConfigurationError::IterationsTooLow {
                requested: self.kdf_iterations,
                minimum: MIN_ITERATIONS,
            });
        }
        Ok(())
    }

    /// Derive the key material this configuration describes.
    ///
    /// # Errors
    ///
    /// See [`SecretMaterial::derive`].
    pub fn secret_material(&self) -> Result<SecretMaterial, ConfigurationError> {
        SecretMaterial::derive(&self.field_secret, &self.field_salt, self.kdf_iterations)
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("field_secret", &"[REDACTED]")
            .field("field_salt", &"[REDACTED]")
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}
