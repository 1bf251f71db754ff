//! Configuration loading and validation for the rotation CLI.
//!
//! The new key is described by the same variables the application uses
//! (`FIELD_SECRET`, `FIELD_SALT`, `KDF_ITERATIONS`). The old key uses the
//! `OLD_` variants, falling back to the new salt and iteration count.

use anyhow::{Context, Result};
use common::ConfigurationError;
use serde::Deserialize;
use vault::crypto::MIN_ITERATIONS;
use vault::{KeyMaterial, VaultConfig};

/// Validated rotate-keys configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Root secret of the new key. **Required.**
    pub field_secret: String,

    /// Salt of the new key. **Required.**
    pub field_salt: String,

    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Root secret of the old key. Its absence is reported when the run
    /// starts, not at load time.
    #[serde(default)]
    pub old_field_secret: Option<String>,

    /// Salt of the old key. Defaults to `FIELD_SALT`.
    #[serde(default)]
    pub old_field_salt: Option<String>,

    /// Iterations of the old key. Defaults to `KDF_ITERATIONS`.
    #[serde(default)]
    pub old_kdf_iterations: Option<u32>,

    /// SQLite database holding the records. **Required.**
    pub database_path: String,

    /// Print progress every this many records per type.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_kdf_iterations() -> u32 {
    MIN_ITERATIONS
}
fn default_progress_every() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build rotate-keys configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise rotate-keys configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        self.new_key_config().validate()?;
        if let Some(old) = self.old_key_config() {
            old.validate()?;
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigurationError::Invalid {
                name: "DATABASE_PATH",
                reason: "required and must not be empty".into(),
            });
        }
        if self.progress_every == 0 {
            return Err(ConfigurationError::Invalid {
                name: "PROGRESS_EVERY",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    fn new_key_config(&self) -> VaultConfig {
        VaultConfig {
            field_secret: self.field_secret.clone(),
            field_salt: self.field_salt.clone(),
            kdf_iterations: self.kdf_iterations,
        }
    }

    /// `None` when no old secret is configured.
    fn old_key_config(&self) -> Option<VaultConfig> {
        let secret = self
            .old_field_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some(VaultConfig {
            field_secret: secret.to_owned(),
            field_salt: self
                .old_field_salt
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.field_salt.clone()),
            kdf_iterations: self.old_kdf_iterations.unwrap_or(self.kdf_iterations),
        })
    }

    /// Derive the key rotation writes with.
    pub fn new_key(&self) -> Result<KeyMaterial, ConfigurationError> {
        Ok(self.new_key_config().secret_material()?.key().clone())
    }

    /// Derive the key rotation reads with, if one is configured.
    pub fn old_key(&self) -> Result<Option<KeyMaterial>, ConfigurationError> {
        self.old_key_config()
            .map(|c| c.secret_material().map(|m| m.key().clone()))
            .transpose()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("field_secret", &"[REDACTED]")
            .field("field_salt", &"[REDACTED]")
            .field("kdf_iterations", &self.kdf_iterations)
            .field(
                "old_field_secret",
                &self.old_field_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("old_field_salt", &self.old_field_salt.as_ref().map(|_| "[REDACTED]"))
            .field("old_kdf_iterations", &self.old_kdf_iterations)
            .field("database_path", &self.database_path)
            .field("progress_every", &self.progress_every)
            .field("log_level", &self.log_level)
            .finish()
    }
}
