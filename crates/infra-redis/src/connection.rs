// Redis Connection Setup

use redis::aio::MultiplexedConnection;
use redis::Client;
use relay_core::error::{AppError, Result};
use tracing::info;

/// Default Redis host
pub const DEFAULT_REDIS_HOST: &str = "localhost";

/// Default Redis port
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Password for AUTH; omitted from the connection URL when `None`
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: None,
        }
    }
}

impl RedisConfig {
    pub fn new(host: impl Into<String>, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password,
        }
    }

    /// Build the redis:// connection URL
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", password, self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

/// Open a multiplexed async connection.
///
/// The connection is cheap to clone; every clone shares the underlying
/// socket, so one connection serves all workers.
pub async fn connect(config: &RedisConfig) -> Result<MultiplexedConnection> {
    let client = Client::open(config.url())
        .map_err(|e| AppError::Config(format!("Invalid Redis URL: {}", e)))?;
    let conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| AppError::Storage(format!("Redis connection failed: {}", e)))?;

    info!(host = %config.host, port = %config.port, "Connected to Redis");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_password() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://localhost:6379");
    }

    #[test]
    fn url_with_password() {
        let config = RedisConfig::new("cache.internal", 6380, Some("s3cret".to_string()));
        assert_eq!(config.url(), "redis://:s3cret@cache.internal:6380");
    }
}
