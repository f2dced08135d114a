//! Database connection pool management

use deadpool_postgres::{Config, Pool, Runtime, ManagerConfig, PoolConfig, RecyclingMethod};
use tokio_postgres::NoTls;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseSettings;

/// Failures talking to the legacy store
///
/// Fatal when raised by a root query; scoped to one document when raised by
/// a relation fetch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::CreatePoolError),
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("Pool get error: {0}")]
    PoolGet(#[from] deadpool_postgres::PoolError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Cannot decode column `{column}` of type {pg_type}: {message}")]
    Decode {
        column: String,
        pg_type: String,
        message: String,
    },
    #[error("Parameter {index} cannot be bound as {pg_type}: {message}")]
    Bind {
        index: usize,
        pg_type: String,
        message: String,
    },
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    /// Create a pool from explicit settings
    ///
    /// `settings.url`, when present, replaces host/port/user/password/database.
    pub fn new(settings: &DatabaseSettings) -> Result<Self, SourceError> {
        let mut cfg = match settings.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => config_from_url(url)?,
            None => {
                let mut cfg = Config::new();
                cfg.host = Some(settings.host.clone());
                cfg.port = Some(settings.port);
                cfg.user = Some(settings.user.clone());
                cfg.password = Some(settings.password.clone());
                cfg.dbname = Some(settings.database.clone());
                cfg
            }
        };

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(settings.max_connections.max(1)));

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;

        info!(
            host = ?cfg.host,
            port = ?cfg.port,
            dbname = ?cfg.dbname,
            max_connections = settings.max_connections,
            "Database pool created"
        );

        Ok(DbPool { pool })
    }

    /// Get a connection from the pool
    pub async fn get(&self) -> Result<deadpool_postgres::Object, SourceError> {
        Ok(self.pool.get().await?)
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<(), SourceError> {
        let client = self.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        info!("Database connection test successful");
        Ok(())
    }
}

fn config_from_url(database_url: &str) -> Result<Config, SourceError> {
    let url = url::Url::parse(database_url)
        .map_err(|e| SourceError::Config(format!("Invalid database URL: {}", e)))?;

    let host = url.host_str()
        .ok_or_else(|| SourceError::Config("Missing host in database URL".to_string()))?;

    let mut cfg = Config::new();
    cfg.host = Some(host.to_string());
    cfg.port = Some(url.port().unwrap_or(5432));
    cfg.user = Some(url.username().to_string());
    cfg.password = Some(url.password().unwrap_or("").to_string());
    cfg.dbname = Some(url.path().trim_start_matches('/').to_string());
    Ok(cfg)
}
