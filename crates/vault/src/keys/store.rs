//! [`KeyStore`]: process-wide holder of the active key material.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use common::{ConfigurationError, KeyRole};

use crate::crypto::{KeyMaterial, SecretMaterial};

/// Thread-safe holder for the active [`SecretMaterial`].
///
/// Backed by [`ArcSwapOption`] so that:
/// - Readers (every field read and write) never block.
/// - Installing or tearing down the material is an explicit, atomic swap.
///
/// The store never changes on its own; only [`KeyStore::install`] and
/// [`KeyStore::teardown`] mutate it.
#[derive(Clone, Debug, Default)]
pub struct KeyStore {
    inner: Arc<ArcSwapOption<SecretMaterial>>,
}

impl KeyStore {
    /// Create a new, empty [`KeyStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `material`.
    pub fn with_material(material: SecretMaterial) -> Self {
        let store = Self::new();
        store.install(material);
        store
    }

    /// Returns `true` if key material is installed.
    pub fn is_ready(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Install (or replace) the active material.
    pub fn install(&self, material: SecretMaterial) {
        self.inner.store(Some(Arc::new(material)));
    }

    /// Drop the active material. Subsequent reads fail with
    /// [`ConfigurationError::KeyUnavailable`].
    pub fn teardown(&self) {
        self.inner.store(None);
    }

    /// Borrow the active material.
    ///
    /// The returned `Arc` pins the material for the caller even if the store is
    /// swapped concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::KeyUnavailable`] if nothing is installed.
    pub fn current(&self) -> Result<Arc<SecretMaterial>, ConfigurationError> {
        self.inner
            .load_full()
            .ok_or(ConfigurationError::KeyUnavailable(KeyRole::Active))
    }

    /// Convenience: a clone of the active key.
    ///
    /// # Errors
    ///
    /// See [`KeyStore::current`].
    pub fn active_key(&self) -> Result<KeyMaterial, ConfigurationError> {
        Ok(self.current()?.key().clone())
    }
}
