//! Configuration loading and constants.
//!
//! Loads the blog configuration from TOML files and defines constants for
//! Cache-Control profiles, default paths and logging. `AppConfig` is the root
//! configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// HTTP Response Cache Control
// =============================================================================
// Ghost never lets caches keep pages fresh on their own: public responses are
// revalidated on every hit, private (admin/API) responses are never stored.

/// Maximum age for the public profile, in seconds
pub const HTTP_CACHE_PUBLIC_MAX_AGE: u32 = 0;

pub const CACHE_CONTROL_PUBLIC: &str = formatcp!("public, max-age={}", HTTP_CACHE_PUBLIC_MAX_AGE);

pub const CACHE_CONTROL_PRIVATE: &str =
    "no-cache, private, no-store, must-revalidate, max-stale=0, post-check=0, pre-check=0";

// =============================================================================
// Mount Points and Settings
// =============================================================================

/// Path at which the administrative app is mounted inside the blog app
pub const ADMIN_MOUNT_PATH: &str = "/ghost";

/// Setting that toggles serving static files from the active theme
pub const SETTING_STATIC_THEME: &str = "static-theme";

/// File extensions in a theme directory that must never be served raw
pub const BLOCKED_THEME_EXTENSIONS: &[&str] = &["hbs", "md", "json"];

// =============================================================================
// Database
// =============================================================================

/// Database clients the data layer knows how to drive
pub const SUPPORTED_DATABASE_CLIENTS: &[&str] = &["sqlite3", "mysql", "pg"];

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default directory holding installed themes
pub const DEFAULT_THEMES_DIR: &str = "content/themes";

/// Theme activated when none is configured
pub const DEFAULT_THEME: &str = "casper";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "ghost_server=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Seconds the standalone server waits for open connections on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

/// How the server is being run. Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The server binds and listens on its own port
    #[default]
    Standalone,
    /// The server is handed to a host application as a nested service
    Middleware,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Public URL of the blog
    pub url: Option<String>,
    /// Alternate URL used for HTTPS redirects
    pub url_ssl: Option<String>,
    /// Admin SSL policy: `true`/`false` or `{ redirect = bool }`
    #[serde(default)]
    pub force_admin_ssl: ForceAdminSsl,
    /// Install the 404 handler (absent means installed)
    pub generate_404s: Option<bool>,
    /// Install the 500 handler (absent means installed)
    pub generate_500s: Option<bool>,
    pub database: Option<DatabaseConfig>,
    /// Listener settings; only meaningful in standalone mode
    pub server: Option<HttpServerConfig>,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Populated by the config gate, never read from disk
    #[serde(skip)]
    pub mode: Mode,
    /// Snapshot of the URL as other subsystems see it; kept in sync with `url`
    #[serde(skip)]
    pub canonical_url: Option<String>,
}

/// Forced SSL for the admin area.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ForceAdminSsl {
    Flag(bool),
    Options { redirect: bool },
}

impl Default for ForceAdminSsl {
    fn default() -> Self {
        ForceAdminSsl::Flag(false)
    }
}

impl ForceAdminSsl {
    /// Whether admin requests must arrive over SSL at all
    pub fn is_enabled(&self) -> bool {
        match self {
            ForceAdminSsl::Flag(enabled) => *enabled,
            ForceAdminSsl::Options { .. } => true,
        }
    }

    /// Whether insecure requests get redirected (otherwise they are refused)
    pub fn redirects(&self) -> bool {
        match self {
            ForceAdminSsl::Flag(_) => true,
            ForceAdminSsl::Options { redirect } => *redirect,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// One of `SUPPORTED_DATABASE_CLIENTS`
    pub client: Option<String>,
    #[serde(default)]
    pub connection: DatabaseConnection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConnection {
    /// SQLite database file
    pub filename: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl DatabaseConfig {
    /// Check that the client is supported and its connection settings are usable.
    fn validate(&self) -> Result<(), ConfigError> {
        let client = self.client.as_deref().ok_or(ConfigError::InvalidDatabase)?;
        if !SUPPORTED_DATABASE_CLIENTS.contains(&client) {
            return Err(ConfigError::InvalidDatabase);
        }

        let connection = &self.connection;
        let complete = match client {
            "sqlite3" => connection.filename.is_some(),
            _ => connection.host.is_some() && connection.database.is_some(),
        };
        if !complete {
            return Err(ConfigError::InvalidDatabase);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeConfig {
    /// Public URL of the theme; rewritten per request in middleware mode
    #[serde(default)]
    pub url: String,
    #[serde(default = "ThemeConfig::default_themes_dir")]
    pub themes_dir: String,
    #[serde(default = "ThemeConfig::default_active")]
    pub active: String,
    /// Serve static assets straight out of the active theme
    #[serde(default = "ThemeConfig::default_serve_static")]
    pub serve_static: bool,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            themes_dir: Self::default_themes_dir(),
            active: Self::default_active(),
            serve_static: Self::default_serve_static(),
        }
    }
}

impl ThemeConfig {
    fn default_themes_dir() -> String {
        DEFAULT_THEMES_DIR.to_string()
    }

    fn default_active() -> String {
        DEFAULT_THEME.to_string()
    }

    fn default_serve_static() -> bool {
        true
    }

    /// Root directory of the named theme
    pub fn theme_path(&self, name: &str) -> PathBuf {
        Path::new(&self.themes_dir).join(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// URL prefix the blog lives under ("" when at the root)
    #[serde(default)]
    pub subdir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartupConfig {
    /// Give up on requests buffered during startup after this many seconds
    pub buffer_timeout_seconds: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.canonical_url = config.url.clone();
        Ok(config)
    }

    /// Whether the 404 handler should be installed
    pub fn generates_404s(&self) -> bool {
        self.generate_404s != Some(false)
    }

    /// Whether the 500 handler should be installed
    pub fn generates_500s(&self) -> bool {
        self.generate_500s != Some(false)
    }

    /// Validate the settings that must be right before anything starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database
            .as_ref()
            .ok_or(ConfigError::InvalidDatabase)?
            .validate()?;

        if self.mode == Mode::Standalone && self.server.is_none() {
            return Err(ConfigError::Validation(
                "Standalone mode requires a [server] section with host and port".to_string(),
            ));
        }

        if let Some(url) = &self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid database configuration")]
    InvalidDatabase,
    #[error("Configuration error: {0}")]
    Validation(String),
}
