//! Named on/off settings of the blog application.
//!
//! Mirrors the enable/disable switches a host application carries. Middleware
//! built with `when_enabled` consults these on every request, so toggling a
//! setting takes effect without rebuilding the chain.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Shared set of enabled setting names.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    enabled: Arc<RwLock<HashSet<String>>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, name: &str) {
        self.write().insert(name.to_string());
        tracing::debug!(setting = %name, "Setting enabled");
    }

    pub fn disable(&self, name: &str) {
        self.write().remove(name);
        tracing::debug!(setting = %name, "Setting disabled");
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.read().contains(name)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        // A poisoned set is still a valid set of names
        self.enabled.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.enabled.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
