//! Configuration gate.
//!
//! `init` validates the configuration synchronously, so a broken deployment
//! fails before any handler exists, and returns the asynchronous part of
//! startup as an [`InitFuture`]. The future resolves exactly once with the
//! configuration every later component reads.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::config::{AppConfig, ConfigError, Mode};

/// Asynchronous remainder of startup.
pub type InitFuture = BoxFuture<'static, Result<Arc<AppConfig>, InitError>>;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Themes directory '{}' is not accessible: {source}", .path.display())]
    ThemesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Active theme '{name}' is not installed in '{}'", .dir.display())]
    ThemeMissing { name: String, dir: PathBuf },

    #[error("Cannot prepare database directory '{}': {source}", .path.display())]
    DatabaseDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Middleware setup failed: {0}")]
    Setup(#[from] crate::chain::SetupError),
}

/// Validate `config` for `mode` and start the asynchronous initialization.
///
/// Entering middleware mode drops any `[server]` section, keeping exactly one
/// mode active.
pub fn init(mut config: AppConfig, mode: Mode) -> Result<InitFuture, ConfigError> {
    config.mode = mode;
    if mode == Mode::Middleware {
        config.server = None;
    }
    if config.canonical_url.is_none() {
        config.canonical_url = config.url.clone();
    }

    config.validate()?;
    tracing::debug!(?mode, url = ?config.url, "Configuration validated");

    Ok(prepare(config).boxed())
}

/// Check the filesystem state the blog depends on.
async fn prepare(config: AppConfig) -> Result<Arc<AppConfig>, InitError> {
    let themes_dir = PathBuf::from(&config.theme.themes_dir);
    let metadata = tokio::fs::metadata(&themes_dir)
        .await
        .map_err(|source| InitError::ThemesDir {
            path: themes_dir.clone(),
            source,
        })?;
    if !metadata.is_dir() {
        return Err(InitError::ThemesDir {
            path: themes_dir,
            source: std::io::Error::other("not a directory"),
        });
    }

    let active = config.theme.theme_path(&config.theme.active);
    if !tokio::fs::try_exists(&active).await.unwrap_or(false) {
        return Err(InitError::ThemeMissing {
            name: config.theme.active.clone(),
            dir: themes_dir,
        });
    }

    let sqlite_file = config
        .database
        .as_ref()
        .and_then(|database| database.connection.filename.as_ref())
        .map(PathBuf::from);
    if let Some(parent) = sqlite_file.as_ref().and_then(|file| file.parent()) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| InitError::DatabaseDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }

    tracing::info!(
        theme = %config.theme.active,
        themes_dir = %config.theme.themes_dir,
        "Configuration initialized"
    );
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &std::path::Path) -> AppConfig {
        AppConfig::from_toml(&format!(
            r#"
            url = "http://localhost:2368"
            [database]
            client = "sqlite3"
            [database.connection]
            filename = "{db}"
            [theme]
            themes_dir = "{themes}"
            "#,
            db = dir.join("data/ghost.db").display(),
            themes = dir.join("themes").display(),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_resolves_prepared_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("themes/casper")).unwrap();

        let future = init(config_for(dir.path()), Mode::Middleware).unwrap();
        let config = future.await.unwrap();

        assert_eq!(config.mode, Mode::Middleware);
        assert!(config.server.is_none());
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_invalid_database_fails_synchronously() {
        let config = AppConfig::from_toml("url = \"http://localhost:2368\"").unwrap();
        let err = init(config, Mode::Middleware).err().unwrap();
        assert_eq!(err.to_string(), "invalid database configuration");
    }

    #[tokio::test]
    async fn test_missing_theme_rejects_later() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("themes")).unwrap();

        let future = init(config_for(dir.path()), Mode::Middleware).unwrap();
        assert!(matches!(future.await, Err(InitError::ThemeMissing { .. })));
    }

    #[tokio::test]
    async fn test_themes_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("themes"), "").unwrap();

        let future = init(config_for(dir.path()), Mode::Middleware).unwrap();
        match future.await {
            Err(InitError::ThemesDir { source, .. }) => assert_eq!(source.to_string(), "not a directory"),
            other => panic!("expected ThemesDir error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_missing_themes_dir_rejects_later() {
        let dir = tempfile::tempdir().unwrap();
        let future = init(config_for(dir.path()), Mode::Middleware).unwrap();
        assert!(matches!(future.await, Err(InitError::ThemesDir { .. })));
    }
}
