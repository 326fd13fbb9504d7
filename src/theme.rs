//! Active theme tracking.
//!
//! The active theme can be switched while the server is running, so its root
//! directory is resolved on every request rather than captured at startup.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::config::ThemeConfig;

/// Handle to the currently active theme, cheap to clone.
#[derive(Clone, Debug)]
pub struct ActiveTheme {
    themes_dir: PathBuf,
    name: Arc<RwLock<String>>,
}

impl ActiveTheme {
    pub fn new(themes_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            themes_dir: themes_dir.into(),
            name: Arc::new(RwLock::new(name.into())),
        }
    }

    pub fn from_config(theme: &ThemeConfig) -> Self {
        Self::new(&theme.themes_dir, theme.active.clone())
    }

    pub fn name(&self) -> String {
        self.name
            .read()
            .map(|name| name.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Switch to another installed theme.
    pub fn activate(&self, name: &str) {
        let mut current = self.name.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(from = %current, to = %name, "Switching active theme");
        *current = name.to_string();
    }

    /// Root directory of the theme active right now
    pub fn root(&self) -> PathBuf {
        self.themes_dir.join(self.name())
    }
}
