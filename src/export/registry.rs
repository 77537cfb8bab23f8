//! Registry of export sources addressed by key

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{RegistryError, Result};

use super::pipeline::Exportable;

type SourceFactory = Arc<dyn Fn() -> Arc<dyn Exportable> + Send + Sync>;

/// Maps keys to factories that build a fresh source per lookup
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `key`
    ///
    /// # Arguments
    /// * `key` - Lookup key, e.g. `"users"`
    /// * `factory` - Builds a new source on every `resolve`
    ///
    /// # Returns
    /// * `Result<()>` - Error if the key is taken
    pub fn register<F, S>(&mut self, key: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Exportable + 'static,
    {
        let key = key.into();
        if self.factories.contains_key(&key) {
            return Err(RegistryError::Duplicate(key).into());
        }

        self.factories
            .insert(key, Arc::new(move || Arc::new(factory()) as Arc<dyn Exportable>));
        Ok(())
    }

    /// Build the source registered under `key`
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Exportable>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
