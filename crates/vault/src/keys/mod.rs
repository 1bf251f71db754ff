//! Active key lifecycle.
//!
//! # Lifecycle
//!
//! 1. At startup, [`load_active`] derives
//!    [`SecretMaterial`](crate::crypto::SecretMaterial) from
//!    [`VaultConfig`] and installs it into a [`KeyStore`].
//! 2. Field accessors borrow the active key via [`KeyStore::current`].
//! 3. The material stays installed until an explicit
//!    [`KeyStore::teardown`] or a new [`KeyStore::install`] during rotation.
//!
//! # Security invariants
//!
//! - Key bytes are never written to disk, logged, or included in errors. Only
//!   [`KeyMaterial::fingerprint`](crate::crypto::KeyMaterial::fingerprint) is
//!   logged.
//! - Changing `FIELD_SECRET` or `FIELD_SALT` without a completed rotation
//!   from the old values makes every encrypted field permanently unreadable.

pub mod store;

pub use store::KeyStore;

use common::ConfigurationError;
use tracing::info;

use crate::config::VaultConfig;

/// Derive the active key from `cfg` and install it into `store`.
///
/// # Errors
///
/// Returns the [`ConfigurationError`] from derivation; the store is left
/// untouched in that case.
pub fn load_active(cfg: &VaultConfig, store: &KeyStore) -> Result<(), ConfigurationError> {
    let material = cfg.secret_material()?;
    info!(
        key_fingerprint = %material.key().fingerprint(),
        iterations = material.iterations(),
        "field encryption key derived"
    );
    store.install(material);
    Ok(())
}
