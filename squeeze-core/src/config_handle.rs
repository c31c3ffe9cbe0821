//! Shared, hot-swappable configuration snapshot.
//!
//! Readers call `snapshot()` and get an `Arc<EngineConfig>` that stays valid
//! and unchanged for as long as they hold it. Reload builds a complete new
//! `EngineConfig` first and only then swaps the pointer, so a reader sees
//! either the old snapshot or the new one, never a mix.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cb::CbWarningCalculator;
use crate::config::{ConfigError, EngineConfig};
use crate::squeeze::SqueezeEngine;

#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<EngineConfig>>,
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(EngineConfig::defaults())
    }
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.read().clone()
    }

    /// Publish a finalized config. Returns the snapshot it replaced.
    pub fn publish(&self, config: EngineConfig) -> Arc<EngineConfig> {
        self.swap(Arc::new(config))
    }

    fn swap(&self, next: Arc<EngineConfig>) -> Arc<EngineConfig> {
        let fingerprint = next.fingerprint();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!(%fingerprint, "published engine config snapshot");
        previous
    }

    /// Rebuild from the key/value store and publish.
    ///
    /// On error the current snapshot stays in place.
    pub fn reload_from_key_values(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<Arc<EngineConfig>, ConfigError> {
        match EngineConfig::from_key_values(values) {
            Ok(config) => {
                let published = Arc::new(config);
                self.swap(Arc::clone(&published));
                Ok(published)
            }
            Err(e) => {
                warn!(error = %e, "config reload rejected; keeping current snapshot");
                Err(e)
            }
        }
    }

    /// Squeeze engine bound to the current snapshot.
    pub fn squeeze_engine(&self) -> SqueezeEngine {
        SqueezeEngine::new(self.snapshot().scoring)
    }

    /// CB warning calculator bound to the current snapshot.
    pub fn cb_calculator(&self) -> CbWarningCalculator {
        CbWarningCalculator::new(self.snapshot().cb)
    }
}
