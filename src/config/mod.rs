//! Configuration module for the migration tool
//!
//! Settings are built once at start-up and handed to the record source,
//! exporter and mirror by reference.

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub export: ExportSettings,
    pub mirror: MirrorSettings,
}

/// Connection settings for the legacy store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Full connection URL; takes precedence over the discrete fields when set
    pub url: Option<String>,
    /// Pool size, which also caps concurrently outstanding queries
    pub max_connections: usize,
}

/// Document export settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    /// Platform tag written into every export envelope
    pub platform: String,
    /// Root records assembled in parallel
    pub concurrency: usize,
}

/// Image mirror settings
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorSettings {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Disable TLS certificate validation toward image hosts
    pub insecure: bool,
    pub user_agent: String,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Legacy variables (DB_HOST, DB_PORT, DB_USER, DB_PASS, DB_NAME)
    /// 2. Environment variables (prefixed with MIGRATE_)
    /// 3. config/local.toml (gitignored)
    /// 4. config/default.toml
    /// 5. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let defaults = Settings::default();

        let builder = Config::builder()
            .set_default("database.host", defaults.database.host)?
            .set_default("database.port", defaults.database.port as i64)?
            .set_default("database.user", defaults.database.user)?
            .set_default("database.password", defaults.database.password)?
            .set_default("database.database", defaults.database.database)?
            .set_default("database.max_connections", defaults.database.max_connections as i64)?
            .set_default("export.platform", defaults.export.platform)?
            .set_default("export.concurrency", defaults.export.concurrency as i64)?
            .set_default("mirror.concurrency", defaults.mirror.concurrency as i64)?
            .set_default("mirror.timeout_secs", defaults.mirror.timeout_secs as i64)?
            .set_default("mirror.max_redirects", defaults.mirror.max_redirects as i64)?
            .set_default("mirror.insecure", defaults.mirror.insecure)?
            .set_default("mirror.user_agent", defaults.mirror.user_agent)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // MIGRATE_MIRROR__CONCURRENCY, MIGRATE_DATABASE__URL, etc.
            .add_source(
                Environment::with_prefix("MIGRATE")
                    .separator("__")
                    .try_parsing(true)
            )
            .set_override_option("database.host", env_non_empty("DB_HOST"))?
            .set_override_option("database.port", env_non_empty("DB_PORT"))?
            .set_override_option("database.user", env_non_empty("DB_USER"))?
            .set_override_option("database.password", env_non_empty("DB_PASS"))?
            .set_override_option("database.database", env_non_empty("DB_NAME"))?;

        builder.build()?.try_deserialize()
    }
}

/// Legacy deployments treat an empty variable the same as an unset one
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: DatabaseSettings {
                host: "localhost".to_string(),
                port: 5432,
                user: "root".to_string(),
                password: String::new(),
                database: "chylers_db".to_string(),
                url: None,
                max_connections: 10,
            },
            export: ExportSettings {
                platform: "chylers_legacy".to_string(),
                concurrency: 8,
            },
            mirror: MirrorSettings {
                concurrency: MirrorSettings::default_concurrency(),
                timeout_secs: 30,
                max_redirects: 10,
                insecure: false,
                user_agent: format!("catalog-migrate/{} image-mirror", env!("CARGO_PKG_VERSION")),
            },
        }
    }
}

impl MirrorSettings {
    /// Two fetches per CPU, kept within 8..=32
    pub fn default_concurrency() -> usize {
        (num_cpus::get() * 2).clamp(8, 32)
    }
}
